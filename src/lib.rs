// ==========================================
// CRM 线索导入 - 核心库
// ==========================================
// 技术栈: Rust + tokio + SQLite
// 系统定位: 线索批量导入管道（识别 / 映射 / 预演 / 分批落库 / 进度）
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 预览 / 落库 / 进度
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 导入参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 共享状态组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{FileFormat, ImportPhase, LeadPriority, LeadSource, LeadStatus};

// 领域实体
pub use domain::{
    ColumnDescriptor, FieldMapping, ImportJob, ImportResult, InternalField, LeadCandidate,
    ProgressMessage, RawRecord, TenantContext,
};

// 引擎
pub use engine::{BatchCommitEngine, DryRunEngine, JobSubscription, PreviewStats, ProgressTracker};

// 仓储
pub use repository::{LeadStore, SqliteLeadStore, UpsertOutcome};

// API
pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "CRM 线索导入";
