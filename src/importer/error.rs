// ==========================================
// CRM 线索导入 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 格式 / 映射 / 行校验 / 持久化 / 超时 / 取消
// ==========================================

use crate::domain::types::{FileFormat, ImportPhase};
use crate::importer::mapping_validator::MappingIssue;
use thiserror::Error;

/// 文件格式错误（映射前，致命；换文件即可重试）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("文件为空: {0}")]
    EmptyFile(String),

    #[error("文件过大: {size} 字节，超过上限 {limit} 字节")]
    TooLarge { size: usize, limit: usize },

    #[error("文件格式不支持: {0}（仅支持 .csv/.xlsx/.json/.xml）")]
    Unsupported(String),

    #[error("{0} 文件数据不足: 至少需要表头和 1 行数据")]
    InsufficientRows(FileFormat),

    #[error("{format} 解析失败: {message}")]
    Corrupt { format: FileFormat, message: String },
}

impl FormatError {
    pub fn corrupt(format: FileFormat, message: impl Into<String>) -> Self {
        FormatError::Corrupt {
            format,
            message: message.into(),
        }
    }
}

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error(transparent)]
    Format(#[from] FormatError),

    // ===== 字段映射错误（可修正后重试）=====
    #[error("字段映射校验失败: {}", join_issues(.0))]
    Mapping(Vec<MappingIssue>),

    // ===== 行级错误（不中断作业）=====
    #[error("第 {row} 行已跳过: {reason}")]
    RowValidation { row: usize, reason: String },

    // ===== 批次写入错误（不中断作业）=====
    #[error("批次 {batch} 写入失败（{affected} 条）: {message}")]
    Persistence {
        batch: usize,
        affected: usize,
        message: String,
    },

    // ===== 作业级错误 =====
    #[error("导入作业超时: 超过 {secs} 秒")]
    Timeout { secs: u64 },

    #[error("导入作业已取消")]
    Canceled,

    #[error("非法的阶段转换: {from} → {to}")]
    InvalidTransition { from: ImportPhase, to: ImportPhase },

    // ===== 模板 =====
    #[error("模板生成失败: {0}")]
    Template(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn join_issues(issues: &[MappingIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// 实现 From<csv::Error>
impl From<csv::Error> for FormatError {
    fn from(err: csv::Error) -> Self {
        FormatError::corrupt(FileFormat::Csv, err.to_string())
    }
}

// 实现 From<calamine::XlsxError>
impl From<calamine::XlsxError> for FormatError {
    fn from(err: calamine::XlsxError) -> Self {
        FormatError::corrupt(FileFormat::Xlsx, err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for FormatError {
    fn from(err: serde_json::Error) -> Self {
        FormatError::corrupt(FileFormat::Json, err.to_string())
    }
}

// 实现 From<quick_xml::Error>
impl From<quick_xml::Error> for FormatError {
    fn from(err: quick_xml::Error) -> Self {
        FormatError::corrupt(FileFormat::Xml, err.to_string())
    }
}

/// Result 类型别名
pub type PipelineResult<T> = Result<T, ImportError>;
