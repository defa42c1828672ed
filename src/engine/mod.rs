// ==========================================
// CRM 线索导入 - 引擎层
// ==========================================
// 职责: 预览汇总、分批落库、作业状态机与进度推送
// 红线: Engine 不拼 SQL, 只通过 LeadStore 访问存储
// ==========================================

pub mod batch_commit;
pub mod dry_run;
pub mod events;
pub mod progress;

// 重导出核心引擎
pub use batch_commit::{BatchCommitEngine, CommitSummary};
pub use dry_run::{accepted_candidates, DryRunEngine, PreviewStats};
pub use events::{JobSubscription, ProgressPublisher};
pub use progress::{weighted_total, ProgressTracker};
