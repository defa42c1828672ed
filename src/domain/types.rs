// ==========================================
// CRM 线索导入 - 领域类型定义
// ==========================================
// 红线: 状态/优先级/来源为封闭枚举，不接受任意字符串
// 序列化格式: snake_case（与前端及数据库一致）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 线索状态 (Lead Status)
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,         // 新线索
    Contacted,   // 已联系
    Qualified,   // 已确认意向
    Proposal,    // 已报价
    Negotiation, // 谈判中
    Won,         // 赢单
    Lost,        // 丢单
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 7] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::Proposal,
        LeadStatus::Negotiation,
        LeadStatus::Won,
        LeadStatus::Lost,
    ];

    /// 内部编码
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Proposal => "proposal",
            LeadStatus::Negotiation => "negotiation",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }

    /// CRM 界面展示标签（与导入模板一致）
    pub fn label(&self) -> &'static str {
        match self {
            LeadStatus::New => "Nuevo",
            LeadStatus::Contacted => "Contactado",
            LeadStatus::Qualified => "Calificado",
            LeadStatus::Proposal => "Propuesta",
            LeadStatus::Negotiation => "Negociación",
            LeadStatus::Won => "Ganado / Cerrado",
            LeadStatus::Lost => "Perdido",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 线索优先级 (Lead Priority)
// ==========================================
// 顺序: Low < Medium < High < Urgent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl LeadPriority {
    pub const ALL: [LeadPriority; 4] = [
        LeadPriority::Low,
        LeadPriority::Medium,
        LeadPriority::High,
        LeadPriority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadPriority::Low => "low",
            LeadPriority::Medium => "medium",
            LeadPriority::High => "high",
            LeadPriority::Urgent => "urgent",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LeadPriority::Low => "Baja",
            LeadPriority::Medium => "Media",
            LeadPriority::High => "Alta",
            LeadPriority::Urgent => "Urgente",
        }
    }
}

impl fmt::Display for LeadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 线索来源 (Lead Source)
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,     // 官网/落地页
    Referral,    // 转介绍
    SocialMedia, // 社交媒体
    Email,       // 邮件营销
    ColdCall,    // 电话陌拜
    Event,       // 展会/活动
    Advertising, // 广告投放
    #[default]
    Other,       // 其他
}

impl LeadSource {
    pub const ALL: [LeadSource; 8] = [
        LeadSource::Website,
        LeadSource::Referral,
        LeadSource::SocialMedia,
        LeadSource::Email,
        LeadSource::ColdCall,
        LeadSource::Event,
        LeadSource::Advertising,
        LeadSource::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::Website => "website",
            LeadSource::Referral => "referral",
            LeadSource::SocialMedia => "social_media",
            LeadSource::Email => "email",
            LeadSource::ColdCall => "cold_call",
            LeadSource::Event => "event",
            LeadSource::Advertising => "advertising",
            LeadSource::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LeadSource::Website => "Sitio web",
            LeadSource::Referral => "Referido",
            LeadSource::SocialMedia => "Redes sociales",
            LeadSource::Email => "Correo electrónico",
            LeadSource::ColdCall => "Llamada en frío",
            LeadSource::Event => "Evento",
            LeadSource::Advertising => "Publicidad",
            LeadSource::Other => "Otro",
        }
    }
}

impl fmt::Display for LeadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 导入文件格式 (File Format)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Csv,
    Xlsx,
    Json,
    Xml,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Xlsx => "xlsx",
            FileFormat::Json => "json",
            FileFormat::Xml => "xml",
        }
    }

    /// 按扩展名识别（大小写不敏感），未知扩展名返回 None
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "xlsx" => Some(FileFormat::Xlsx),
            "json" => Some(FileFormat::Json),
            "xml" => Some(FileFormat::Xml),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 导入作业阶段 (Import Phase)
// ==========================================
// 顺序: uploading → parsing → mapping_validating → preview_ready
//       → importing_batches → finalizing → {completed | failed | canceled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Uploading,
    Parsing,
    MappingValidating,
    PreviewReady,
    ImportingBatches,
    Finalizing,
    Completed,
    Failed,
    Canceled,
}

impl ImportPhase {
    /// 非终态阶段（按流程顺序）
    pub const PIPELINE: [ImportPhase; 6] = [
        ImportPhase::Uploading,
        ImportPhase::Parsing,
        ImportPhase::MappingValidating,
        ImportPhase::PreviewReady,
        ImportPhase::ImportingBatches,
        ImportPhase::Finalizing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportPhase::Uploading => "uploading",
            ImportPhase::Parsing => "parsing",
            ImportPhase::MappingValidating => "mapping_validating",
            ImportPhase::PreviewReady => "preview_ready",
            ImportPhase::ImportingBatches => "importing_batches",
            ImportPhase::Finalizing => "finalizing",
            ImportPhase::Completed => "completed",
            ImportPhase::Failed => "failed",
            ImportPhase::Canceled => "canceled",
        }
    }

    /// 进度权重（总和 100）
    pub fn weight(&self) -> f64 {
        match self {
            ImportPhase::Uploading => 5.0,
            ImportPhase::Parsing => 15.0,
            ImportPhase::MappingValidating => 10.0,
            ImportPhase::PreviewReady => 0.0,
            ImportPhase::ImportingBatches => 60.0,
            ImportPhase::Finalizing => 10.0,
            ImportPhase::Completed | ImportPhase::Failed | ImportPhase::Canceled => 0.0,
        }
    }

    /// 流程序号（终态返回 None）
    pub fn ordinal(&self) -> Option<usize> {
        Self::PIPELINE.iter().position(|p| p == self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportPhase::Completed | ImportPhase::Failed | ImportPhase::Canceled
        )
    }

    /// 状态机合法转换
    ///
    /// - 正向: 每个阶段只能进入下一阶段
    /// - parsing / finalizing 可直接失败
    /// - 任何非终态可被取消，或因超时/不可恢复错误失败
    /// - 终态不可再转换
    pub fn can_transition_to(&self, next: ImportPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            ImportPhase::Canceled | ImportPhase::Failed => true,
            ImportPhase::Completed => *self == ImportPhase::Finalizing,
            _ => match (self.ordinal(), next.ordinal()) {
                (Some(from), Some(to)) => to == from + 1,
                _ => false,
            },
        }
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
