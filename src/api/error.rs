// ==========================================
// CRM 线索导入 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换导入/仓储错误为调用方可读的错误消息
// ==========================================

use crate::domain::types::ImportPhase;
use crate::importer::error::{FormatError, ImportError};
use crate::importer::mapping_validator::MappingIssue;
use crate::repository::error::RepositoryError;
use serde::Serialize;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 作业寻址与状态
    // ==========================================
    #[error("导入作业不存在: {0}")]
    JobNotFound(String),

    #[error("当前阶段 {phase} 不允许{action}")]
    InvalidState { phase: ImportPhase, action: String },

    // ==========================================
    // 字段映射（可修正后重试）
    // ==========================================
    #[error("字段映射校验失败: {}", join_issues(.0))]
    Mapping(Vec<MappingIssue>),

    // ==========================================
    // 导入 / 数据访问
    // ==========================================
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),
}

fn join_issues(issues: &[MappingIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// 实现 From<FormatError>
impl From<FormatError> for ApiError {
    fn from(err: FormatError) -> Self {
        ApiError::Import(ImportError::Format(err))
    }
}

impl ApiError {
    pub fn invalid_state(phase: ImportPhase, action: impl Into<String>) -> Self {
        ApiError::InvalidState {
            phase,
            action: action.into(),
        }
    }

    /// 错误代码（供调用方分支处理）
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::JobNotFound(_) => "JOB_NOT_FOUND",
            ApiError::InvalidState { .. } => "INVALID_STATE",
            ApiError::Mapping(_) => "MAPPING_INVALID",
            ApiError::Import(ImportError::Format(_)) => "FORMAT_ERROR",
            ApiError::Import(_) => "IMPORT_ERROR",
            ApiError::Repository(_) => "REPOSITORY_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let details = match self {
            ApiError::Mapping(issues) => serde_json::to_value(issues).ok(),
            _ => None,
        };
        ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            details,
        }
    }
}

/// 错误响应（序列化给调用方）
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
