// ==========================================
// CRM 线索导入 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入管道所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 分批落库 =====

    /// 每批线索数
    ///
    /// # 默认值
    /// - 100（有效范围 1..=1000）
    async fn get_batch_size(&self) -> ConfigResult<usize>;

    /// 并发写入批次数
    ///
    /// # 默认值
    /// - 4
    async fn get_worker_count(&self) -> ConfigResult<usize>;

    // ===== 上限 =====

    /// 上传文件大小上限（字节）
    ///
    /// # 默认值
    /// - 10 MiB
    async fn get_max_file_bytes(&self) -> ConfigResult<usize>;

    /// 单个作业最长运行时间（秒）
    ///
    /// # 默认值
    /// - 1800
    async fn get_max_job_duration_secs(&self) -> ConfigResult<u64>;

    /// 错误/告警日志保留的不同消息数
    ///
    /// # 默认值
    /// - 50
    async fn get_error_cap(&self) -> ConfigResult<usize>;

    // ===== 展示 =====

    /// 预览样例条数
    ///
    /// # 默认值
    /// - 10
    async fn get_preview_sample_size(&self) -> ConfigResult<usize>;

    /// 进度消息携带的高频错误条数
    ///
    /// # 默认值
    /// - 5
    async fn get_top_errors(&self) -> ConfigResult<usize>;

    /// 进度消息语言
    ///
    /// # 默认值
    /// - zh-CN
    async fn get_locale(&self) -> ConfigResult<String>;
}
