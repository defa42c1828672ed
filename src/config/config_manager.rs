// ==========================================
// CRM 线索导入 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::{ConfigResult, ImportConfigReader};
use crate::config::import_settings::{
    DEFAULT_BATCH_SIZE, DEFAULT_ERROR_CAP, DEFAULT_MAX_FILE_BYTES, DEFAULT_MAX_JOB_DURATION_SECS,
    DEFAULT_PREVIEW_SAMPLE_SIZE, DEFAULT_TOP_ERRORS, DEFAULT_WORKER_COUNT,
};
use crate::db::open_sqlite_connection;
use crate::i18n;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 参数
    /// - key: 配置键
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![GLOBAL_SCOPE, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 读取并解析数值配置；缺失或格式错误时回退默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 写入 global scope 配置（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 获取所有 global 配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 作业归档时记录当时生效的配置
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&config_map)?)
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_batch_size(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::BATCH_SIZE, DEFAULT_BATCH_SIZE)
    }

    async fn get_worker_count(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::WORKER_COUNT, DEFAULT_WORKER_COUNT)
    }

    async fn get_max_file_bytes(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::MAX_FILE_BYTES, DEFAULT_MAX_FILE_BYTES)
    }

    async fn get_max_job_duration_secs(&self) -> ConfigResult<u64> {
        self.get_parsed_or_default(
            config_keys::MAX_JOB_DURATION_SECS,
            DEFAULT_MAX_JOB_DURATION_SECS,
        )
    }

    async fn get_error_cap(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::ERROR_CAP, DEFAULT_ERROR_CAP)
    }

    async fn get_preview_sample_size(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::PREVIEW_SAMPLE_SIZE, DEFAULT_PREVIEW_SAMPLE_SIZE)
    }

    async fn get_top_errors(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::TOP_ERRORS, DEFAULT_TOP_ERRORS)
    }

    async fn get_locale(&self) -> ConfigResult<String> {
        let value = self
            .get_config_value(config_keys::LOCALE)?
            .unwrap_or_else(|| i18n::DEFAULT_LOCALE.to_string());
        Ok(i18n::normalize_locale(&value).to_string())
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 分批落库
    pub const BATCH_SIZE: &str = "import.batch_size";
    pub const WORKER_COUNT: &str = "import.worker_count";

    // 上限
    pub const MAX_FILE_BYTES: &str = "import.max_file_bytes";
    pub const MAX_JOB_DURATION_SECS: &str = "import.max_job_duration_secs";
    pub const ERROR_CAP: &str = "import.error_cap";

    // 展示
    pub const PREVIEW_SAMPLE_SIZE: &str = "import.preview_sample_size";
    pub const TOP_ERRORS: &str = "import.top_errors";
    pub const LOCALE: &str = "ui.locale";
}
