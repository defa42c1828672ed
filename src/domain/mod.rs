// ==========================================
// CRM 线索导入 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、作业状态
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod import_job;
pub mod lead;
pub mod types;

// 重导出核心类型
pub use import_job::{
    ErrorEntry, ErrorLog, ImportJob, ImportResult, JobCounts, ProgressMessage, ProgressMetrics,
};
pub use lead::{
    ColumnDescriptor, FieldMapping, InternalField, LeadCandidate, RawRecord, TenantContext,
};
pub use types::{FileFormat, ImportPhase, LeadPriority, LeadSource, LeadStatus};
