// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、内存存储、样例文件与作业等待等功能
// ==========================================
#![allow(dead_code)]

use async_trait::async_trait;
use crm_lead_import::api::ImportApi;
use crm_lead_import::config::ImportSettings;
use crm_lead_import::db::{init_schema, open_sqlite_connection};
use crm_lead_import::domain::types::ImportPhase;
use crm_lead_import::domain::{LeadCandidate, ProgressMessage, TenantContext};
use crm_lead_import::repository::{LeadStore, RepositoryError, RepositoryResult, UpsertOutcome};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

pub fn test_tenant() -> TenantContext {
    TenantContext::new("tenant-a", "org-1")
}

/// 测试用导入参数（小批次，便于观察多批次行为）
pub fn test_settings(batch_size: usize, worker_count: usize) -> ImportSettings {
    ImportSettings {
        batch_size,
        worker_count,
        max_job_duration_secs: 30,
        ..ImportSettings::default()
    }
}

// ==========================================
// MemoryLeadStore - 内存线索存储（可注入故障与延迟）
// ==========================================
#[derive(Default)]
pub struct MemoryLeadStore {
    leads: Mutex<HashMap<(String, String, String), LeadCandidate>>,
    /// 包含这些行号的批次整体失败
    failing_rows: HashSet<usize>,
    /// 这些行号单条被拒绝
    rejected_rows: HashSet<usize>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_batch_containing(mut self, row_number: usize) -> Self {
        self.failing_rows.insert(row_number);
        self
    }

    pub fn reject_row(mut self, row_number: usize) -> Self {
        self.rejected_rows.insert(row_number);
        self
    }

    pub fn stored_count(&self) -> usize {
        self.leads.lock().unwrap().len()
    }

    /// 按自然键取出测试租户下已写入的线索
    pub fn stored_lead(&self, natural_key: &str) -> Option<LeadCandidate> {
        let tenant = test_tenant();
        self.leads
            .lock()
            .unwrap()
            .get(&(tenant.tenant_id, tenant.organization_id, natural_key.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn upsert(
        &self,
        tenant: &TenantContext,
        leads: &[LeadCandidate],
    ) -> RepositoryResult<Vec<UpsertOutcome>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if leads.iter().any(|l| self.failing_rows.contains(&l.row_number)) {
            return Err(RepositoryError::DatabaseQueryError("注入的批次故障".to_string()));
        }

        let mut stored = self.leads.lock().unwrap();
        let outcomes = leads
            .iter()
            .map(|lead| {
                if self.rejected_rows.contains(&lead.row_number) {
                    return UpsertOutcome::Rejected(format!("第 {} 行被拒绝", lead.row_number));
                }
                let key = (
                    tenant.tenant_id.clone(),
                    tenant.organization_id.clone(),
                    lead.natural_key(),
                );
                match stored.insert(key, lead.clone()) {
                    Some(_) => UpsertOutcome::Updated,
                    None => UpsertOutcome::Inserted,
                }
            })
            .collect();
        Ok(outcomes)
    }
}

// ==========================================
// 样例文件
// ==========================================

/// 分号分隔 CSV: Nombre;Telefono;Email，共 rows 行有效数据
pub fn lead_csv(rows: usize) -> Vec<u8> {
    let mut text = String::from("Nombre;Telefono;Email\n");
    for i in 1..=rows {
        text.push_str(&format!("Lead {i};555-{i:04};lead{i}@ejemplo.com\n"));
    }
    text.into_bytes()
}

pub fn build_api(store: Arc<dyn LeadStore>, settings: ImportSettings) -> ImportApi {
    crm_lead_import::logging::init_test();
    ImportApi::new(store, settings)
}

/// 上传并等待进入 preview_ready
pub async fn upload_to_preview(api: &ImportApi, file_name: &str, bytes: Vec<u8>) -> String {
    let job_id = api
        .upload(test_tenant(), file_name, bytes)
        .await
        .expect("上传失败");
    let reached = wait_for_phase(api, &job_id, ImportPhase::PreviewReady).await;
    assert_eq!(reached, ImportPhase::PreviewReady, "作业未进入预览阶段");
    job_id
}

/// 订阅进度直到到达指定阶段或终态，返回最后看到的阶段
pub async fn wait_for_phase(api: &ImportApi, job_id: &str, target: ImportPhase) -> ImportPhase {
    let mut subscription = api.subscribe(job_id).expect("订阅失败");
    let wait = async {
        let mut last = ImportPhase::Uploading;
        while let Some(message) = subscription.recv().await {
            last = message.current_phase;
            if last == target || last.is_terminal() {
                break;
            }
        }
        last
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("等待阶段超时")
}

/// 收集订阅消息直到终态
pub async fn collect_until_terminal(api: &ImportApi, job_id: &str) -> Vec<ProgressMessage> {
    let mut subscription = api.subscribe(job_id).expect("订阅失败");
    let collect = async {
        let mut messages = Vec::new();
        while let Some(message) = subscription.recv().await {
            messages.push(message);
        }
        messages
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("等待终态超时")
}
