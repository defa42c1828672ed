// ==========================================
// CRM 线索导入 - 导入参数
// ==========================================
// 职责: 汇总配置读取结果，统一默认值与取值范围
// ==========================================

use crate::config::import_config_trait::{ConfigResult, ImportConfigReader};
use crate::i18n;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const MAX_BATCH_SIZE: usize = 1000;
pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const MAX_WORKER_COUNT: usize = 32;
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_JOB_DURATION_SECS: u64 = 1800;
pub const DEFAULT_ERROR_CAP: usize = 50;
pub const DEFAULT_PREVIEW_SAMPLE_SIZE: usize = 10;
pub const DEFAULT_TOP_ERRORS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSettings {
    pub batch_size: usize,
    pub worker_count: usize,
    pub max_file_bytes: usize,
    pub max_job_duration_secs: u64,
    pub error_cap: usize,
    pub preview_sample_size: usize,
    pub top_errors: usize,
    pub locale: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_job_duration_secs: DEFAULT_MAX_JOB_DURATION_SECS,
            error_cap: DEFAULT_ERROR_CAP,
            preview_sample_size: DEFAULT_PREVIEW_SAMPLE_SIZE,
            top_errors: DEFAULT_TOP_ERRORS,
            locale: i18n::DEFAULT_LOCALE.to_string(),
        }
    }
}

impl ImportSettings {
    /// 从配置读取器加载并规整
    pub async fn load<C: ImportConfigReader + ?Sized>(reader: &C) -> ConfigResult<Self> {
        let settings = Self {
            batch_size: reader.get_batch_size().await?,
            worker_count: reader.get_worker_count().await?,
            max_file_bytes: reader.get_max_file_bytes().await?,
            max_job_duration_secs: reader.get_max_job_duration_secs().await?,
            error_cap: reader.get_error_cap().await?,
            preview_sample_size: reader.get_preview_sample_size().await?,
            top_errors: reader.get_top_errors().await?,
            locale: reader.get_locale().await?,
        };
        Ok(settings.clamped())
    }

    /// 取值范围规整
    ///
    /// - batch_size: 1..=1000
    /// - worker_count: 1..=32
    /// - 其余上限至少为 1
    pub fn clamped(mut self) -> Self {
        self.batch_size = self.batch_size.clamp(1, MAX_BATCH_SIZE);
        self.worker_count = self.worker_count.clamp(1, MAX_WORKER_COUNT);
        self.max_file_bytes = self.max_file_bytes.max(1);
        self.max_job_duration_secs = self.max_job_duration_secs.max(1);
        self.error_cap = self.error_cap.max(1);
        self.locale = i18n::normalize_locale(&self.locale).to_string();
        self
    }
}
