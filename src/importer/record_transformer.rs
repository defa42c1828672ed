// ==========================================
// CRM 线索导入 - 记录转换器
// ==========================================
// 职责: RawRecord + ValidatedMapping → LeadCandidate（或跳过）
// 红线: 行级问题只跳过/告警，不中断整个作业
// ==========================================

use crate::domain::lead::{InternalField, LeadCandidate, RawRecord};
use crate::domain::types::{LeadPriority, LeadSource, LeadStatus};
use crate::importer::data_cleaner::DataCleaner as DataCleanerImpl;
use crate::importer::error::ImportError;
use crate::importer::label_tables::LabeledEnum;
use crate::importer::lead_importer_trait::DataCleaner;
use crate::importer::mapping_validator::ValidatedMapping;
use serde::Serialize;

/// 评分上限
pub const MAX_QUALIFICATION_SCORE: f64 = 100.0;

// ==========================================
// TransformedRow - 单行转换结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    Valid(LeadCandidate),
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformedRow {
    pub row_number: usize,
    pub outcome: RowOutcome,
    /// 非阻断告警（无效邮箱、未识别标签、越界数值等）
    pub warnings: Vec<String>,
}

impl TransformedRow {
    pub fn candidate(&self) -> Option<&LeadCandidate> {
        match &self.outcome {
            RowOutcome::Valid(lead) => Some(lead),
            RowOutcome::Skipped { .. } => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match &self.outcome {
            RowOutcome::Valid(_) => None,
            RowOutcome::Skipped { reason } => Some(reason),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.candidate().is_some()
    }
}

// ==========================================
// RecordTransformer
// ==========================================
pub struct RecordTransformer<C: DataCleaner = DataCleanerImpl> {
    cleaner: C,
}

impl Default for RecordTransformer<DataCleanerImpl> {
    fn default() -> Self {
        Self::new(DataCleanerImpl)
    }
}

/// 单行转换上下文（累计告警）
struct RowContext<'a> {
    record: &'a RawRecord,
    mapping: &'a ValidatedMapping,
    warnings: Vec<String>,
}

impl<'a> RowContext<'a> {
    fn raw(&self, field: InternalField) -> Option<&'a str> {
        self.mapping
            .column_for(field)
            .and_then(|column| self.record.get(column))
    }

    fn warn(&mut self, message: String) {
        self.warnings
            .push(format!("第 {} 行: {}", self.record.row_number, message));
    }
}

impl<C: DataCleaner> RecordTransformer<C> {
    pub fn new(cleaner: C) -> Self {
        Self { cleaner }
    }

    /// 转换全部记录（保持原始顺序）
    pub fn transform_all(
        &self,
        records: &[RawRecord],
        mapping: &ValidatedMapping,
    ) -> Vec<TransformedRow> {
        records
            .iter()
            .map(|record| self.transform(record, mapping))
            .collect()
    }

    /// 转换单行
    pub fn transform(&self, record: &RawRecord, mapping: &ValidatedMapping) -> TransformedRow {
        let mut ctx = RowContext {
            record,
            mapping,
            warnings: Vec::new(),
        };

        // ===== 必填字段 =====
        let name = self
            .text(&ctx, InternalField::Name)
            .map(|v| self.cleaner.clean_text(&v, true));
        let phone = self.text(&ctx, InternalField::Phone);

        let (name, phone) = match (name, phone) {
            (Some(name), Some(phone)) => (name, phone),
            (name, phone) => {
                let missing: Vec<&str> = [(InternalField::Name, &name), (InternalField::Phone, &phone)]
                    .iter()
                    .filter(|(_, value)| value.is_none())
                    .map(|(field, _)| field.key())
                    .collect();
                let reason = ImportError::RowValidation {
                    row: record.row_number,
                    reason: format!("缺少必填字段 {}", missing.join(", ")),
                }
                .to_string();
                return TransformedRow {
                    row_number: record.row_number,
                    outcome: RowOutcome::Skipped { reason },
                    warnings: Vec::new(),
                };
            }
        };

        // ===== 邮箱 =====
        let email = match self.text(&ctx, InternalField::Email) {
            Some(raw) if raw.contains('@') => Some(raw.to_lowercase()),
            Some(raw) => {
                ctx.warn(format!("邮箱 '{}' 格式无效，已忽略", raw));
                None
            }
            None => None,
        };

        // ===== 枚举字段 =====
        let status = self.label::<LeadStatus>(&mut ctx, InternalField::Status);
        let priority = self.label::<LeadPriority>(&mut ctx, InternalField::Priority);
        let source = self.label::<LeadSource>(&mut ctx, InternalField::Source);

        // ===== 数值字段 =====
        let qualification_score =
            self.number(&mut ctx, InternalField::QualificationScore, 0.0, MAX_QUALIFICATION_SCORE);
        let expected_value = self.number(&mut ctx, InternalField::ExpectedValue, 0.0, f64::MAX);

        // ===== 日期 =====
        let next_follow_up = match self.text(&ctx, InternalField::NextFollowUp) {
            Some(raw) => {
                let parsed = self.cleaner.parse_date(&raw);
                if parsed.is_none() {
                    ctx.warn(format!("无法识别的日期 '{}'，已忽略", raw));
                }
                parsed
            }
            None => None,
        };

        let lead = LeadCandidate {
            row_number: record.row_number,
            name,
            phone,
            email,
            company: self.text(&ctx, InternalField::Company),
            position: self.text(&ctx, InternalField::Position),
            status,
            priority,
            source,
            qualification_score,
            expected_value,
            city: self.text(&ctx, InternalField::City),
            industry: self.text(&ctx, InternalField::Industry),
            website: self.text(&ctx, InternalField::Website),
            next_follow_up,
            notes: self.text(&ctx, InternalField::Notes),
        };

        TransformedRow {
            row_number: record.row_number,
            outcome: RowOutcome::Valid(lead),
            warnings: ctx.warnings,
        }
    }

    /// 映射值（去空白；空 → None；未映射 → None）
    fn text(&self, ctx: &RowContext<'_>, field: InternalField) -> Option<String> {
        self.cleaner.normalize_null(ctx.raw(field))
    }

    /// 标签 → 枚举；未识别的非空文本使用默认值并告警
    fn label<T: LabeledEnum>(&self, ctx: &mut RowContext<'_>, field: InternalField) -> T {
        match self.text(ctx, field) {
            Some(raw) => T::resolve(&raw).unwrap_or_else(|| {
                let fallback = T::default();
                ctx.warn(format!(
                    "{} 值 '{}' 无法识别，使用默认值 {}",
                    field,
                    raw,
                    fallback.code()
                ));
                fallback
            }),
            None => T::default(),
        }
    }

    /// 区域数值解析 + 范围校验
    fn number(
        &self,
        ctx: &mut RowContext<'_>,
        field: InternalField,
        min: f64,
        max: f64,
    ) -> Option<f64> {
        let raw = self.text(ctx, field)?;
        let Some(value) = self.cleaner.parse_decimal(&raw) else {
            ctx.warn(format!("{} 值 '{}' 不是有效数字，已忽略", field, raw));
            return None;
        };
        let checked = self.cleaner.validate_range(value, min, max);
        if checked.is_none() {
            ctx.warn(format!("{} 值 {} 超出允许范围，已忽略", field, value));
        }
        checked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lead::{ColumnDescriptor, FieldMapping};
    use crate::importer::mapping_validator;
    use chrono::NaiveDate;

    fn transformer() -> RecordTransformer {
        RecordTransformer::default()
    }

    fn record(row: usize, cells: &[(&str, &str)]) -> RawRecord {
        let mut record = RawRecord::new(row);
        for (k, v) in cells {
            record.push(*k, *v);
        }
        record
    }

    fn validated(pairs: &[(InternalField, &str)]) -> ValidatedMapping {
        let mapping: FieldMapping = pairs.iter().map(|(f, c)| (*f, *c)).collect();
        let columns: Vec<ColumnDescriptor> = pairs
            .iter()
            .enumerate()
            .map(|(index, (_, c))| ColumnDescriptor {
                name: c.to_string(),
                index,
                sample: None,
            })
            .collect();
        mapping_validator::validate(&mapping, &columns).unwrap()
    }

    #[test]
    fn test_valid_row_normalization() {
        let mapping = validated(&[
            (InternalField::Name, "Nombre"),
            (InternalField::Phone, "Tel"),
            (InternalField::Email, "Email"),
            (InternalField::Status, "Estado"),
            (InternalField::ExpectedValue, "Valor"),
            (InternalField::NextFollowUp, "Fecha"),
        ]);
        let row = record(
            1,
            &[
                ("Nombre", "  Juan    Perez "),
                ("Tel", " 555-0100 "),
                ("Email", "Juan@X.com"),
                ("Estado", "Ganado / Cerrado"),
                ("Valor", "1.234,56"),
                ("Fecha", "15/03/2024"),
            ],
        );

        let result = transformer().transform(&row, &mapping);
        let lead = result.candidate().unwrap();
        assert_eq!(lead.name, "Juan Perez");
        assert_eq!(lead.phone, "555-0100");
        assert_eq!(lead.email.as_deref(), Some("juan@x.com"));
        assert_eq!(lead.status, LeadStatus::Won);
        assert_eq!(lead.priority, LeadPriority::Medium);
        assert_eq!(lead.source, LeadSource::Other);
        assert_eq!(lead.expected_value, Some(1234.56));
        assert_eq!(lead.next_follow_up, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_missing_required_is_skipped_with_reason() {
        let mapping = validated(&[(InternalField::Name, "N"), (InternalField::Phone, "P")]);
        let result =
            transformer().transform(&record(2, &[("N", " "), ("P", "")]), &mapping);

        assert!(!result.is_valid());
        let reason = result.skip_reason().unwrap();
        assert!(reason.contains("第 2 行"));
        assert!(reason.contains("name, phone"));
    }

    #[test]
    fn test_invalid_values_warn_and_default() {
        let mapping = validated(&[
            (InternalField::Name, "N"),
            (InternalField::Phone, "P"),
            (InternalField::Email, "E"),
            (InternalField::Priority, "Pr"),
            (InternalField::QualificationScore, "S"),
            (InternalField::NextFollowUp, "F"),
        ]);
        let row = record(
            3,
            &[
                ("N", "Ana"),
                ("P", "1"),
                ("E", "no-es-correo"),
                ("Pr", "altísima"),
                ("S", "150"),
                ("F", "pronto"),
            ],
        );

        let result = transformer().transform(&row, &mapping);
        let lead = result.candidate().unwrap();
        assert_eq!(lead.email, None);
        assert_eq!(lead.priority, LeadPriority::Medium);
        assert_eq!(lead.qualification_score, None);
        assert_eq!(lead.next_follow_up, None);
        assert_eq!(result.warnings.len(), 4);
        assert!(result.warnings.iter().all(|w| w.starts_with("第 3 行")));
    }

    #[test]
    fn test_negative_expected_value_rejected() {
        let mapping = validated(&[
            (InternalField::Name, "N"),
            (InternalField::Phone, "P"),
            (InternalField::ExpectedValue, "V"),
        ]);
        let row = record(1, &[("N", "Ana"), ("P", "1"), ("V", "-5")]);
        let result = transformer().transform(&row, &mapping);
        assert_eq!(result.candidate().unwrap().expected_value, None);
        assert_eq!(result.warnings.len(), 1);
    }
}
