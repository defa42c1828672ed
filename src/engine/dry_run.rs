// ==========================================
// CRM 线索导入 - 预览引擎（Dry-Run）
// ==========================================
// 职责: 汇总转换结果（计数 / 分布 / 样例 / 跳过原因 / 告警）
// 红线: 纯计算，不访问存储；相同输入必须得到相同输出
// ==========================================

use crate::domain::import_job::ErrorLog;
use crate::domain::lead::LeadCandidate;
use crate::domain::types::{LeadPriority, LeadSource, LeadStatus};
use crate::importer::record_transformer::TransformedRow;
use serde::Serialize;
use std::collections::BTreeMap;

// ==========================================
// PreviewStats - 预览统计
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStats {
    pub total_rows: usize,
    pub valid_leads: usize,
    pub skipped_rows: usize,

    // ===== 分布 =====
    pub status_distribution: BTreeMap<LeadStatus, usize>,
    pub priority_distribution: BTreeMap<LeadPriority, usize>,
    pub source_distribution: BTreeMap<LeadSource, usize>,

    // ===== 样例 =====
    pub sample: Vec<LeadCandidate>,
    pub skip_reasons: Vec<String>,

    // ===== 告警（有界）=====
    pub warnings: Vec<String>,
    pub warnings_overflow: usize,
}

// ==========================================
// DryRunEngine
// ==========================================
pub struct DryRunEngine {
    sample_size: usize,
    warning_cap: usize,
}

impl DryRunEngine {
    pub fn new(sample_size: usize, warning_cap: usize) -> Self {
        Self {
            sample_size,
            warning_cap,
        }
    }

    /// 计算预览统计
    pub fn preview(&self, rows: &[TransformedRow]) -> PreviewStats {
        let mut stats = PreviewStats {
            total_rows: rows.len(),
            ..PreviewStats::default()
        };
        let mut warnings = ErrorLog::new(self.warning_cap);

        for row in rows {
            for warning in &row.warnings {
                warnings.record(warning.as_str());
            }

            match row.candidate() {
                Some(lead) => {
                    stats.valid_leads += 1;
                    *stats.status_distribution.entry(lead.status).or_insert(0) += 1;
                    *stats.priority_distribution.entry(lead.priority).or_insert(0) += 1;
                    *stats.source_distribution.entry(lead.source).or_insert(0) += 1;
                    if stats.sample.len() < self.sample_size {
                        stats.sample.push(lead.clone());
                    }
                }
                None => {
                    stats.skipped_rows += 1;
                    if let Some(reason) = row.skip_reason() {
                        if stats.skip_reasons.len() < self.sample_size {
                            stats.skip_reasons.push(reason.to_string());
                        }
                    }
                }
            }
        }

        stats.warnings = warnings.messages();
        stats.warnings_overflow = warnings.overflow();
        stats
    }
}

/// 取出可落库的线索（保持行顺序）
pub fn accepted_candidates(rows: &[TransformedRow]) -> Vec<LeadCandidate> {
    rows.iter().filter_map(|r| r.candidate().cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::record_transformer::RowOutcome;

    fn lead(row: usize, status: LeadStatus) -> LeadCandidate {
        LeadCandidate {
            row_number: row,
            name: format!("Lead {}", row),
            phone: format!("555{}", row),
            email: None,
            company: None,
            position: None,
            status,
            priority: LeadPriority::default(),
            source: LeadSource::default(),
            qualification_score: None,
            expected_value: None,
            city: None,
            industry: None,
            website: None,
            next_follow_up: None,
            notes: None,
        }
    }

    fn valid(row: usize, status: LeadStatus, warnings: Vec<String>) -> TransformedRow {
        TransformedRow {
            row_number: row,
            outcome: RowOutcome::Valid(lead(row, status)),
            warnings,
        }
    }

    fn skipped(row: usize) -> TransformedRow {
        TransformedRow {
            row_number: row,
            outcome: RowOutcome::Skipped {
                reason: format!("第 {} 行已跳过", row),
            },
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_counts_and_distributions() {
        let rows = vec![
            valid(1, LeadStatus::New, vec![]),
            skipped(2),
            valid(3, LeadStatus::Won, vec!["w1".to_string()]),
            valid(4, LeadStatus::New, vec![]),
        ];
        let stats = DryRunEngine::new(10, 50).preview(&rows);

        assert_eq!(stats.total_rows, 4);
        assert_eq!(stats.valid_leads, 3);
        assert_eq!(stats.skipped_rows, 1);
        assert_eq!(stats.valid_leads + stats.skipped_rows, stats.total_rows);
        assert_eq!(stats.status_distribution[&LeadStatus::New], 2);
        assert_eq!(stats.status_distribution[&LeadStatus::Won], 1);
        assert_eq!(stats.source_distribution[&LeadSource::Other], 3);
        assert_eq!(stats.skip_reasons, vec!["第 2 行已跳过".to_string()]);
        assert_eq!(stats.warnings, vec!["w1".to_string()]);
    }

    #[test]
    fn test_sample_and_warning_caps() {
        let rows: Vec<TransformedRow> = (1..=20)
            .map(|i| valid(i, LeadStatus::New, vec![format!("w{}", i)]))
            .collect();
        let stats = DryRunEngine::new(3, 5).preview(&rows);

        assert_eq!(stats.sample.len(), 3);
        assert_eq!(stats.sample[0].row_number, 1);
        assert_eq!(stats.warnings.len(), 5);
        assert_eq!(stats.warnings_overflow, 15);
    }

    #[test]
    fn test_preview_is_deterministic() {
        let rows = vec![valid(1, LeadStatus::Lost, vec![]), skipped(2)];
        let engine = DryRunEngine::new(10, 50);
        assert_eq!(engine.preview(&rows), engine.preview(&rows));
        assert_eq!(
            serde_json::to_string(&engine.preview(&rows)).unwrap(),
            serde_json::to_string(&engine.preview(&rows)).unwrap()
        );
    }

    #[test]
    fn test_accepted_candidates_keep_order() {
        let rows = vec![valid(1, LeadStatus::New, vec![]), skipped(2), valid(3, LeadStatus::New, vec![])];
        let leads = accepted_candidates(&rows);
        let order: Vec<usize> = leads.iter().map(|l| l.row_number).collect();
        assert_eq!(order, vec![1, 3]);
    }
}
