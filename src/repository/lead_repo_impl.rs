// ==========================================
// CRM 线索导入 - 线索存储 SQLite 实现
// ==========================================
// 职责: 实现线索批量写入（使用 rusqlite）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::lead::{LeadCandidate, TenantContext};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::lead_repo::{LeadStore, UpsertOutcome};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// 已落库线索（查询视图）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredLead {
    pub lead_id: String,
    pub natural_key: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub company: Option<String>,
    pub status: String,
    pub priority: String,
    pub source: String,
    pub expected_value: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

// ==========================================
// SqliteLeadStore
// ==========================================
pub struct SqliteLeadStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLeadStore {
    /// 创建新的 Store 实例（建表幂等）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（调用方负责建表）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在事务中逐条 UPSERT；单条失败只记录为 Rejected
    fn upsert_tx(
        tx: &Transaction,
        tenant: &TenantContext,
        leads: &[LeadCandidate],
    ) -> RepositoryResult<Vec<UpsertOutcome>> {
        let mut exists_stmt = tx.prepare(
            "SELECT 1 FROM lead WHERE tenant_id = ?1 AND organization_id = ?2 AND natural_key = ?3",
        )?;
        let mut upsert_stmt = tx.prepare(
            r#"
            INSERT INTO lead (
                lead_id, tenant_id, organization_id, natural_key,
                name, phone, email, company, position,
                status, priority, source, qualification_score, expected_value,
                city, industry, website, next_follow_up, notes,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21
            )
            ON CONFLICT(tenant_id, organization_id, natural_key) DO UPDATE SET
                name = excluded.name,
                phone = excluded.phone,
                email = excluded.email,
                company = excluded.company,
                position = excluded.position,
                status = excluded.status,
                priority = excluded.priority,
                source = excluded.source,
                qualification_score = excluded.qualification_score,
                expected_value = excluded.expected_value,
                city = excluded.city,
                industry = excluded.industry,
                website = excluded.website,
                next_follow_up = excluded.next_follow_up,
                notes = excluded.notes,
                updated_at = excluded.updated_at
            "#,
        )?;

        let now = Utc::now().to_rfc3339();
        let mut outcomes = Vec::with_capacity(leads.len());

        for lead in leads {
            let natural_key = lead.natural_key();
            let existed = exists_stmt
                .query_row(
                    params![tenant.tenant_id, tenant.organization_id, natural_key],
                    |_row| Ok(()),
                )
                .optional()?
                .is_some();

            let result = upsert_stmt.execute(params![
                Uuid::new_v4().to_string(),
                tenant.tenant_id,
                tenant.organization_id,
                natural_key,
                lead.name,
                lead.phone,
                lead.email,
                lead.company,
                lead.position,
                lead.status.as_str(),
                lead.priority.as_str(),
                lead.source.as_str(),
                lead.qualification_score,
                lead.expected_value,
                lead.city,
                lead.industry,
                lead.website,
                lead.next_follow_up.map(|d| d.to_string()),
                lead.notes,
                now,
                now,
            ]);

            let outcome = match result {
                Ok(_) if existed => UpsertOutcome::Updated,
                Ok(_) => UpsertOutcome::Inserted,
                Err(e) => {
                    tracing::warn!(
                        row = lead.row_number,
                        natural_key = %natural_key,
                        error = %e,
                        "线索写入被拒绝"
                    );
                    UpsertOutcome::Rejected(format!("第 {} 行写入被拒绝: {}", lead.row_number, e))
                }
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// 统计租户下的线索数
    pub fn count_leads(&self, tenant: &TenantContext) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM lead WHERE tenant_id = ?1 AND organization_id = ?2",
            params![tenant.tenant_id, tenant.organization_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// 按自然键查询
    pub fn find_by_natural_key(
        &self,
        tenant: &TenantContext,
        natural_key: &str,
    ) -> RepositoryResult<Option<StoredLead>> {
        let conn = self.lock()?;
        let lead = conn
            .query_row(
                r#"
                SELECT lead_id, natural_key, name, phone, email, company,
                       status, priority, source, expected_value, created_at, updated_at
                FROM lead
                WHERE tenant_id = ?1 AND organization_id = ?2 AND natural_key = ?3
                "#,
                params![tenant.tenant_id, tenant.organization_id, natural_key],
                |row| {
                    Ok(StoredLead {
                        lead_id: row.get(0)?,
                        natural_key: row.get(1)?,
                        name: row.get(2)?,
                        phone: row.get(3)?,
                        email: row.get(4)?,
                        company: row.get(5)?,
                        status: row.get(6)?,
                        priority: row.get(7)?,
                        source: row.get(8)?,
                        expected_value: row.get(9)?,
                        created_at: row.get(10)?,
                        updated_at: row.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(lead)
    }
}

#[async_trait]
impl LeadStore for SqliteLeadStore {
    async fn upsert(
        &self,
        tenant: &TenantContext,
        leads: &[LeadCandidate],
    ) -> RepositoryResult<Vec<UpsertOutcome>> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let outcomes = Self::upsert_tx(&tx, tenant, leads)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(outcomes)
    }
}
