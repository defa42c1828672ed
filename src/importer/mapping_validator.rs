// ==========================================
// CRM 线索导入 - 字段映射校验器
// ==========================================
// 职责: 完整性（必填字段）+ 唯一性（一列只对应一个字段）+ 存在性
// 红线: ValidatedMapping 只能由本模块构造；转换器只接受 ValidatedMapping
// ==========================================

use crate::domain::lead::{ColumnDescriptor, FieldMapping, InternalField};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// MappingIssue - 映射问题
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum MappingIssue {
    /// 必填字段未映射
    MissingRequired(InternalField),
    /// 同一列被多个字段映射
    DuplicateColumn {
        column: String,
        fields: Vec<InternalField>,
    },
    /// 映射的列在文件中不存在
    UnknownColumn { field: InternalField, column: String },
}

impl fmt::Display for MappingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingIssue::MissingRequired(field) => {
                write!(f, "必填字段 {} 未映射", field)
            }
            MappingIssue::DuplicateColumn { column, fields } => {
                let names: Vec<&str> = fields.iter().map(|f| f.key()).collect();
                write!(f, "列 '{}' 被多个字段映射: {}", column, names.join(", "))
            }
            MappingIssue::UnknownColumn { field, column } => {
                write!(f, "字段 {} 映射的列 '{}' 不存在", field, column)
            }
        }
    }
}

// ==========================================
// ValidatedMapping - 已通过校验的映射
// ==========================================
// 构造函数私有：持有该类型即意味着 name/phone 已映射且无冲突
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidatedMapping(FieldMapping);

impl ValidatedMapping {
    pub fn mapping(&self) -> &FieldMapping {
        &self.0
    }

    pub fn column_for(&self, field: InternalField) -> Option<&str> {
        self.0.get(field)
    }

    pub fn into_inner(self) -> FieldMapping {
        self.0
    }
}

/// 校验映射，返回有序问题列表（必填 → 重复 → 不存在）
pub fn check(mapping: &FieldMapping, columns: &[ColumnDescriptor]) -> Vec<MappingIssue> {
    let mut issues = Vec::new();

    // 1. 必填字段
    for field in InternalField::REQUIRED {
        if !mapping.contains(field) {
            issues.push(MappingIssue::MissingRequired(field));
        }
    }

    // 2. 重复列（按列名有序输出）
    let mut by_column: BTreeMap<&str, Vec<InternalField>> = BTreeMap::new();
    for (field, column) in mapping.iter() {
        by_column.entry(column).or_default().push(field);
    }
    for (column, fields) in by_column {
        if fields.len() > 1 {
            issues.push(MappingIssue::DuplicateColumn {
                column: column.to_string(),
                fields,
            });
        }
    }

    // 3. 不存在的列
    for (field, column) in mapping.iter() {
        if !columns.iter().any(|c| c.name == column) {
            issues.push(MappingIssue::UnknownColumn {
                field,
                column: column.to_string(),
            });
        }
    }

    issues
}

/// 校验映射；零问题时返回 ValidatedMapping
pub fn validate(
    mapping: &FieldMapping,
    columns: &[ColumnDescriptor],
) -> Result<ValidatedMapping, Vec<MappingIssue>> {
    let issues = check(mapping, columns);
    if issues.is_empty() {
        Ok(ValidatedMapping(mapping.clone()))
    } else {
        Err(issues)
    }
}
