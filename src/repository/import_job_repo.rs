// ==========================================
// CRM 线索导入 - 导入作业归档
// ==========================================
// 职责: 终态作业摘要落库与查询
// 红线: 只接受终态作业
// ==========================================

use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::import_job::ImportJob;
use crate::domain::lead::TenantContext;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// 归档作业摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedJob {
    pub job_id: String,
    pub file_name: String,
    pub format: Option<String>,
    pub phase: String,
    pub total_rows: usize,
    pub imported_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
    pub created_at: String,
    pub finished_at: Option<String>,
}

// ==========================================
// ImportJobArchive Trait
// ==========================================
#[async_trait]
pub trait ImportJobArchive: Send + Sync {
    /// 归档终态作业（同 job_id 重复归档覆盖）
    async fn archive(&self, job: &ImportJob) -> RepositoryResult<()>;

    /// 查询租户最近的作业（按创建时间倒序）
    async fn list_recent(
        &self,
        tenant: &TenantContext,
        limit: usize,
    ) -> RepositoryResult<Vec<ArchivedJob>>;
}

// ==========================================
// SqliteImportJobArchive
// ==========================================
pub struct SqliteImportJobArchive {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteImportJobArchive {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ImportJobArchive for SqliteImportJobArchive {
    async fn archive(&self, job: &ImportJob) -> RepositoryResult<()> {
        if !job.is_terminal() {
            return Err(RepositoryError::FieldValueError {
                field: "phase".to_string(),
                message: format!("作业 {} 尚未结束（{}）", job.job_id, job.phase),
            });
        }

        let errors_json = serde_json::to_string(&job.to_result().errors)?;
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO import_job (
                job_id, tenant_id, organization_id, file_name, format, phase,
                total_rows, imported_count, skipped_count, failed_count,
                errors_json, created_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                job.job_id,
                job.tenant.tenant_id,
                job.tenant.organization_id,
                job.file_name,
                job.format.map(|f| f.as_str()),
                job.phase.as_str(),
                job.counts.total_rows as i64,
                job.counts.imported as i64,
                job.counts.skipped_rows as i64,
                job.counts.failed as i64,
                errors_json,
                job.created_at.to_rfc3339(),
                job.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        tracing::debug!(job_id = %job.job_id, phase = %job.phase, "作业已归档");
        Ok(())
    }

    async fn list_recent(
        &self,
        tenant: &TenantContext,
        limit: usize,
    ) -> RepositoryResult<Vec<ArchivedJob>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT job_id, file_name, format, phase, total_rows, imported_count,
                   skipped_count, failed_count, errors_json, created_at, finished_at
            FROM import_job
            WHERE tenant_id = ?1 AND organization_id = ?2
            ORDER BY created_at DESC
            LIMIT ?3
            "#,
        )?;

        let rows = stmt.query_map(
            params![tenant.tenant_id, tenant.organization_id, limit as i64],
            |row| {
                Ok((
                    ArchivedJob {
                        job_id: row.get(0)?,
                        file_name: row.get(1)?,
                        format: row.get(2)?,
                        phase: row.get(3)?,
                        total_rows: row.get::<_, i64>(4)? as usize,
                        imported_count: row.get::<_, i64>(5)? as usize,
                        skipped_count: row.get::<_, i64>(6)? as usize,
                        failed_count: row.get::<_, i64>(7)? as usize,
                        errors: Vec::new(),
                        created_at: row.get(9)?,
                        finished_at: row.get(10)?,
                    },
                    row.get::<_, String>(8)?,
                ))
            },
        )?;

        let mut jobs = Vec::new();
        for row in rows {
            let (mut job, errors_json) = row?;
            job.errors = serde_json::from_str(&errors_json)?;
            jobs.push(job);
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ImportPhase;
    use chrono::Utc;

    fn archive() -> SqliteImportJobArchive {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        SqliteImportJobArchive::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[tokio::test]
    async fn test_archive_terminal_job() {
        let archive = archive();
        let tenant = TenantContext::new("t1", "o1");
        let mut job = ImportJob::new("job-1".to_string(), tenant.clone(), "leads.csv", 10);
        job.phase = ImportPhase::Completed;
        job.counts.total_rows = 3;
        job.counts.imported = 2;
        job.counts.skipped_rows = 1;
        job.skip_reasons.record("第 3 行已跳过: 缺少必填字段 phone");
        job.finished_at = Some(Utc::now());

        archive.archive(&job).await.unwrap();
        archive.archive(&job).await.unwrap();

        let jobs = archive.list_recent(&tenant, 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].phase, "completed");
        assert_eq!(jobs[0].imported_count, 2);
        assert_eq!(jobs[0].errors.len(), 1);
    }

    #[tokio::test]
    async fn test_archive_rejects_running_job() {
        let archive = archive();
        let job = ImportJob::new(
            "job-2".to_string(),
            TenantContext::new("t1", "o1"),
            "leads.csv",
            10,
        );
        assert!(archive.archive(&job).await.is_err());
    }
}
