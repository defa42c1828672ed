// ==========================================
// CRM 线索导入 - API 层
// ==========================================
// 职责: 提供导入作业的业务 API 接口
// ==========================================

pub mod error;
pub mod import_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use import_api::{ImportApi, MappingState, TemplateFile};
