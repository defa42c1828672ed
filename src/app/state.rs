// ==========================================
// CRM 线索导入 - 应用状态
// ==========================================
// 职责: 组装共享连接、配置、存储与导入 API
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::ImportApi;
use crate::config::{ConfigManager, ImportSettings};
use crate::db::{init_schema, open_sqlite_connection};
use crate::repository::{SqliteImportJobArchive, SqliteLeadStore};

/// 应用状态
///
/// 包含导入API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 生效的导入参数
    pub settings: ImportSettings,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 线索存储
    pub lead_store: Arc<SqliteLeadStore>,

    /// 线索导入API
    pub import_api: Arc<ImportApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 初始化成功
    /// - Err(String): 初始化错误
    pub async fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        // 创建数据库连接（共享连接）
        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("无法初始化表结构: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // 配置
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let settings = ImportSettings::load(config_manager.as_ref())
            .await
            .map_err(|e| format!("无法加载导入参数: {}", e))?;
        crate::i18n::set_locale(&settings.locale);

        // 存储
        let lead_store = Arc::new(SqliteLeadStore::from_connection(conn.clone()));
        let archive = Arc::new(SqliteImportJobArchive::from_connection(conn));

        let import_api = Arc::new(
            ImportApi::new(lead_store.clone(), settings.clone()).with_archive(archive),
        );

        tracing::info!(
            batch_size = settings.batch_size,
            worker_count = settings.worker_count,
            locale = %settings.locale,
            "AppState初始化成功"
        );

        Ok(Self {
            db_path,
            settings,
            config_manager,
            lead_store,
            import_api,
        })
    }
}
