// ==========================================
// CRM 线索导入 - 线索存储 Trait
// ==========================================
// 职责: 定义线索持久化接口（不包含业务逻辑）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::lead::{LeadCandidate, TenantContext};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 单条线索的写入结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Rejected(String),
}

impl UpsertOutcome {
    pub fn is_persisted(&self) -> bool {
        !matches!(self, UpsertOutcome::Rejected(_))
    }
}

// ==========================================
// LeadStore Trait
// ==========================================
// 用途: 批量写入线索（按 租户 + 组织 + 自然键 幂等）
// 实现者: SqliteLeadStore（使用 rusqlite）
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// 批量写入线索
    ///
    /// # 参数
    /// - tenant: 租户上下文
    /// - leads: 本批次线索
    ///
    /// # 返回
    /// - Ok(Vec<UpsertOutcome>): 与 leads 一一对应的写入结果
    /// - Err: 整批被拒绝
    async fn upsert(
        &self,
        tenant: &TenantContext,
        leads: &[LeadCandidate],
    ) -> RepositoryResult<Vec<UpsertOutcome>>;
}
