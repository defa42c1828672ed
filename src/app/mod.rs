// ==========================================
// CRM 线索导入 - 应用层
// ==========================================
// 职责: 组装应用级共享状态
// ==========================================

pub mod state;

// 重导出
pub use crate::db::get_default_db_path;
pub use state::AppState;
