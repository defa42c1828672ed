// ==========================================
// CRM 线索导入 - 线索领域模型
// ==========================================
// 职责: 内部字段定义 / 原始行记录 / 列描述 / 字段映射 / 线索候选
// 红线: RawRecord 必须保留列顺序（自动映射与校验依赖它）
// ==========================================

use crate::domain::types::{LeadPriority, LeadSource, LeadStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ==========================================
// InternalField - 内部线索字段
// ==========================================
// 声明顺序即自动映射的优先级顺序（Ord 依赖此顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalField {
    Name,
    Phone,
    Email,
    Company,
    Position,
    Status,
    Priority,
    Source,
    QualificationScore,
    ExpectedValue,
    City,
    Industry,
    Website,
    NextFollowUp,
    Notes,
}

impl InternalField {
    /// 全部字段（优先级顺序）
    pub const ALL: [InternalField; 15] = [
        InternalField::Name,
        InternalField::Phone,
        InternalField::Email,
        InternalField::Company,
        InternalField::Position,
        InternalField::Status,
        InternalField::Priority,
        InternalField::Source,
        InternalField::QualificationScore,
        InternalField::ExpectedValue,
        InternalField::City,
        InternalField::Industry,
        InternalField::Website,
        InternalField::NextFollowUp,
        InternalField::Notes,
    ];

    /// 必填字段
    pub const REQUIRED: [InternalField; 2] = [InternalField::Name, InternalField::Phone];

    pub fn key(&self) -> &'static str {
        match self {
            InternalField::Name => "name",
            InternalField::Phone => "phone",
            InternalField::Email => "email",
            InternalField::Company => "company",
            InternalField::Position => "position",
            InternalField::Status => "status",
            InternalField::Priority => "priority",
            InternalField::Source => "source",
            InternalField::QualificationScore => "qualification_score",
            InternalField::ExpectedValue => "expected_value",
            InternalField::City => "city",
            InternalField::Industry => "industry",
            InternalField::Website => "website",
            InternalField::NextFollowUp => "next_follow_up",
            InternalField::Notes => "notes",
        }
    }

    /// 模板表头（导入模板使用）
    pub fn template_header(&self) -> &'static str {
        match self {
            InternalField::Name => "Nombre",
            InternalField::Phone => "Telefono",
            InternalField::Email => "Email",
            InternalField::Company => "Empresa",
            InternalField::Position => "Cargo",
            InternalField::Status => "Estado",
            InternalField::Priority => "Prioridad",
            InternalField::Source => "Fuente",
            InternalField::QualificationScore => "Puntuacion",
            InternalField::ExpectedValue => "Valor Esperado",
            InternalField::City => "Ciudad",
            InternalField::Industry => "Industria",
            InternalField::Website => "Sitio Web",
            InternalField::NextFollowUp => "Proximo Seguimiento",
            InternalField::Notes => "Notas",
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}

impl fmt::Display for InternalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for InternalField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        InternalField::ALL
            .iter()
            .copied()
            .find(|f| f.key() == key)
            .ok_or_else(|| format!("未知的内部字段: {}", key))
    }
}

// ==========================================
// RawRecord - 原始行记录
// ==========================================
// 有序 (列名, 值) 序列；row_number 为数据行序号（从 1 开始，不含表头）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub row_number: usize,
    cells: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            cells: Vec::new(),
        }
    }

    pub fn with_capacity(row_number: usize, capacity: usize) -> Self {
        Self {
            row_number,
            cells: Vec::with_capacity(capacity),
        }
    }

    /// 追加单元格（保持插入顺序）
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.cells.push((column.into(), value.into()));
    }

    /// 按列名取值
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// 所有单元格均为空白
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.trim().is_empty())
    }
}

// ==========================================
// ColumnDescriptor - 列描述
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub index: usize,
    pub sample: Option<String>,
}

/// 样例值取前几行数据
pub const SAMPLE_SCAN_ROWS: usize = 5;

impl ColumnDescriptor {
    /// 根据列顺序与记录生成列描述（样例取前 SAMPLE_SCAN_ROWS 行的首个非空值）
    pub fn describe(names: &[String], records: &[RawRecord]) -> Vec<ColumnDescriptor> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let sample = records
                    .iter()
                    .take(SAMPLE_SCAN_ROWS)
                    .filter_map(|r| r.get(name))
                    .map(str::trim)
                    .find(|v| !v.is_empty())
                    .map(str::to_string);
                ColumnDescriptor {
                    name: name.clone(),
                    index,
                    sample,
                }
            })
            .collect()
    }
}

// ==========================================
// FieldMapping - 字段映射
// ==========================================
// 内部字段 → 源列名（按字段优先级有序）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping {
    entries: BTreeMap<InternalField, String>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置映射；列名为空白时视为取消映射
    pub fn set(&mut self, field: InternalField, column: impl Into<String>) {
        let column = column.into();
        let trimmed = column.trim();
        if trimmed.is_empty() {
            self.entries.remove(&field);
        } else {
            self.entries.insert(field, trimmed.to_string());
        }
    }

    pub fn remove(&mut self, field: InternalField) -> Option<String> {
        self.entries.remove(&field)
    }

    pub fn get(&self, field: InternalField) -> Option<&str> {
        self.entries.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: InternalField) -> bool {
        self.entries.contains_key(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (InternalField, &str)> {
        self.entries.iter().map(|(f, c)| (*f, c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(InternalField, S)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (InternalField, S)>>(iter: I) -> Self {
        let mut mapping = FieldMapping::new();
        for (field, column) in iter {
            mapping.set(field, column);
        }
        mapping
    }
}

// ==========================================
// LeadCandidate - 待落库线索
// ==========================================
// 必填字段已填充，可选字段有则有、无则 None，枚举字段已解析
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadCandidate {
    pub row_number: usize,

    // ===== 必填 =====
    pub name: String,
    pub phone: String,

    // ===== 联系信息 =====
    pub email: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,

    // ===== 枚举字段 =====
    pub status: LeadStatus,
    pub priority: LeadPriority,
    pub source: LeadSource,

    // ===== 数值字段 =====
    pub qualification_score: Option<f64>,
    pub expected_value: Option<f64>,

    // ===== 其他 =====
    pub city: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub next_follow_up: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl LeadCandidate {
    /// 业务自然键: 电话号码中的数字；无数字时退化为去空白后的原文
    pub fn natural_key(&self) -> String {
        let digits: String = self.phone.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            self.phone.trim().to_string()
        } else {
            digits
        }
    }
}

// ==========================================
// TenantContext - 租户上下文
// ==========================================
// 由调用方提供且已校验
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
    pub organization_id: String,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            organization_id: organization_id.into(),
        }
    }
}
