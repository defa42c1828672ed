// ==========================================
// CRM 线索导入 - 导入 API
// ==========================================
// 职责: 作业注册表 + 编排门面（上传 → 映射 → 预览 → 提交 → 进度 → 释放）
// 红线: 作业只能通过 job_id 寻址；阶段只由 ProgressTracker 推进
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::ImportSettings;
use crate::domain::import_job::{ErrorLog, ImportJob, ImportResult, ProgressMessage};
use crate::domain::lead::{ColumnDescriptor, FieldMapping, TenantContext};
use crate::domain::types::{FileFormat, ImportPhase};
use crate::engine::batch_commit::{BatchCommitEngine, CommitSummary};
use crate::engine::dry_run::{accepted_candidates, DryRunEngine, PreviewStats};
use crate::engine::events::JobSubscription;
use crate::engine::progress::ProgressTracker;
use crate::i18n;
use crate::importer::error::ImportError;
use crate::importer::file_parser::{ParsedFile, UniversalFileParser};
use crate::importer::format_detector::FormatDetector;
use crate::importer::lead_importer_trait::FieldMapper;
use crate::importer::mapping_validator::{self, MappingIssue, ValidatedMapping};
use crate::importer::record_transformer::{RecordTransformer, TransformedRow};
use crate::importer::template::{generate_template, template_file_name};
use crate::importer::AutoMapper;
use crate::repository::import_job_repo::ImportJobArchive;
use crate::repository::lead_repo::LeadStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

/// 映射状态（供调用方编辑）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingState {
    /// 当前映射（自动建议或最近一次提交的映射）
    pub mapping: FieldMapping,
    pub issues: Vec<MappingIssue>,
    /// 已通过校验、预览所用的映射
    pub accepted: Option<FieldMapping>,
}

/// 模板文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

// ==========================================
// 作业条目
// ==========================================
#[derive(Default)]
struct JobData {
    parsed: Option<ParsedFile>,
    /// 格式识别与解析阶段的告警
    file_warnings: Vec<String>,
    mapping: FieldMapping,
    issues: Vec<MappingIssue>,
    accepted: Option<ValidatedMapping>,
    rows: Vec<TransformedRow>,
    preview: Option<PreviewStats>,
    commit: Option<CommitSummary>,
}

struct JobEntry {
    tracker: Arc<ProgressTracker>,
    cancel: CancellationToken,
    data: AsyncMutex<JobData>,
}

// ==========================================
// ImportApi
// ==========================================
pub struct ImportApi {
    store: Arc<dyn LeadStore>,
    archive: Option<Arc<dyn ImportJobArchive>>,
    settings: ImportSettings,
    jobs: RwLock<HashMap<String, Arc<JobEntry>>>,
}

impl ImportApi {
    /// 创建新的ImportApi实例
    ///
    /// # 参数
    /// - store: 线索存储
    /// - settings: 导入参数（会被规整到有效范围）
    pub fn new(store: Arc<dyn LeadStore>, settings: ImportSettings) -> Self {
        Self {
            store,
            archive: None,
            settings: settings.clamped(),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// 配置作业归档（释放终态作业时写入）
    pub fn with_archive(mut self, archive: Arc<dyn ImportJobArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    fn entry(&self, job_id: &str) -> ApiResult<Arc<JobEntry>> {
        let jobs = self
            .jobs
            .read()
            .map_err(|e| ApiError::InternalError(format!("作业表锁获取失败: {}", e)))?;
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| ApiError::JobNotFound(job_id.to_string()))
    }

    /// 当前注册的作业 ID
    pub fn job_ids(&self) -> Vec<String> {
        self.jobs
            .read()
            .map(|jobs| jobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    // ==========================================
    // 上传
    // ==========================================

    /// 接收上传文件，立即返回 job_id；识别与解析在后台进行
    ///
    /// # 参数
    /// - tenant: 已校验的租户上下文
    /// - file_name: 声明的文件名
    /// - bytes: 文件内容
    ///
    /// # 返回
    /// - Ok(String): job_id
    #[instrument(skip(self, tenant, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        tenant: TenantContext,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> ApiResult<String> {
        let job_id = Uuid::new_v4().to_string();
        let mut job = ImportJob::new(job_id.clone(), tenant, file_name, self.settings.error_cap);
        job.message = i18n::t_with_args("progress.uploading", &[("file", file_name)]);

        let entry = Arc::new(JobEntry {
            tracker: Arc::new(ProgressTracker::new(job, self.settings.top_errors)),
            cancel: CancellationToken::new(),
            data: AsyncMutex::new(JobData::default()),
        });
        {
            let mut jobs = self
                .jobs
                .write()
                .map_err(|e| ApiError::InternalError(format!("作业表锁获取失败: {}", e)))?;
            jobs.insert(job_id.clone(), Arc::clone(&entry));
        }

        spawn_watchdog(Arc::clone(&entry), self.settings.max_job_duration_secs);

        let settings = self.settings.clone();
        let file_name = file_name.to_string();
        let span = info_span!("ingest", job_id = %job_id);
        tokio::spawn(ingest(entry, file_name, bytes, settings).instrument(span));

        info!(job_id = %job_id, "导入作业已创建");
        Ok(job_id)
    }

    // ==========================================
    // 映射
    // ==========================================

    /// 检测到的列
    pub async fn columns(&self, job_id: &str) -> ApiResult<Vec<ColumnDescriptor>> {
        let entry = self.entry(job_id)?;
        let data = entry.data.lock().await;
        match &data.parsed {
            Some(parsed) => Ok(parsed.columns.clone()),
            None => Err(ApiError::invalid_state(entry.tracker.phase(), "读取列信息")),
        }
    }

    /// 当前映射与校验问题
    pub async fn mapping(&self, job_id: &str) -> ApiResult<MappingState> {
        let entry = self.entry(job_id)?;
        let data = entry.data.lock().await;
        if data.parsed.is_none() {
            return Err(ApiError::invalid_state(entry.tracker.phase(), "读取字段映射"));
        }
        Ok(MappingState {
            mapping: data.mapping.clone(),
            issues: data.issues.clone(),
            accepted: data.accepted.as_ref().map(|m| m.mapping().clone()),
        })
    }

    /// 修改映射并重新校验
    ///
    /// - mapping_validating: 通过则进入 preview_ready；否则保持并记录问题
    /// - preview_ready: 通过则重算预览；否则拒绝且保留已接受的映射
    ///
    /// # 返回
    /// - Ok(PreviewStats): 新映射下的预览
    /// - Err(ApiError::Mapping): 校验问题
    #[instrument(skip(self, mapping))]
    pub async fn update_mapping(
        &self,
        job_id: &str,
        mapping: FieldMapping,
    ) -> ApiResult<PreviewStats> {
        let entry = self.entry(job_id)?;
        let mut data = entry.data.lock().await;
        let phase = entry.tracker.phase();
        if !matches!(
            phase,
            ImportPhase::MappingValidating | ImportPhase::PreviewReady
        ) {
            return Err(ApiError::invalid_state(phase, "修改字段映射"));
        }
        apply_mapping(&entry, &mut data, mapping, &self.settings)
    }

    // ==========================================
    // 预览
    // ==========================================

    /// 预览统计（不访问存储）
    pub async fn preview(&self, job_id: &str) -> ApiResult<PreviewStats> {
        let entry = self.entry(job_id)?;
        let data = entry.data.lock().await;
        data.preview
            .clone()
            .ok_or_else(|| ApiError::invalid_state(entry.tracker.phase(), "读取预览"))
    }

    // ==========================================
    // 提交
    // ==========================================

    /// 提交导入（仅 preview_ready），后台分批写入
    #[instrument(skip(self))]
    pub async fn commit(&self, job_id: &str) -> ApiResult<()> {
        let entry = self.entry(job_id)?;
        let data = entry.data.lock().await;
        let tracker = &entry.tracker;
        let phase = tracker.phase();
        if phase != ImportPhase::PreviewReady {
            return Err(ApiError::invalid_state(phase, "提交导入"));
        }

        let candidates = accepted_candidates(&data.rows);
        let skip_reasons: Vec<String> = data
            .rows
            .iter()
            .filter_map(|row| row.skip_reason().map(str::to_string))
            .collect();
        drop(data);

        let batches = candidates.len().div_ceil(self.settings.batch_size);
        let done = "0".to_string();
        let total = batches.to_string();
        tracker.transition(
            ImportPhase::ImportingBatches,
            i18n::t_with_args(
                "progress.importing",
                &[("done", done.as_str()), ("total", total.as_str())],
            ),
        )?;
        tracker.update(|job| {
            for reason in skip_reasons {
                job.skip_reasons.record(reason);
            }
        });

        let engine = BatchCommitEngine::new(
            Arc::clone(&self.store),
            self.settings.batch_size,
            self.settings.worker_count,
        );
        let span = info_span!("commit", job_id = %job_id);
        let entry = Arc::clone(&entry);
        tokio::spawn(
            async move {
                let tenant = entry.tracker.job().tenant;
                let summary = engine
                    .commit(&tenant, candidates, &entry.tracker, &entry.cancel)
                    .await;
                finish_commit(&entry, summary).await;
            }
            .instrument(span),
        );
        Ok(())
    }

    // ==========================================
    // 取消
    // ==========================================

    /// 取消作业
    ///
    /// importing_batches 阶段只停止派发，在途批次完成并计数后进入 canceled；
    /// 其余非终态阶段立即进入 canceled
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: &str) -> ApiResult<ImportPhase> {
        let entry = self.entry(job_id)?;
        let phase = entry.tracker.phase();
        if phase.is_terminal() {
            return Err(ApiError::invalid_state(phase, "取消"));
        }

        entry.cancel.cancel();
        if phase != ImportPhase::ImportingBatches {
            entry.tracker.cancel();
        }
        info!(job_id, %phase, "已请求取消");
        Ok(entry.tracker.phase())
    }

    // ==========================================
    // 进度
    // ==========================================

    /// 最新进度快照
    pub fn snapshot(&self, job_id: &str) -> ApiResult<ProgressMessage> {
        Ok(self.entry(job_id)?.tracker.latest())
    }

    /// 作业副本
    pub fn job(&self, job_id: &str) -> ApiResult<ImportJob> {
        Ok(self.entry(job_id)?.tracker.job())
    }

    /// 订阅进度（第一条为当前快照）
    pub fn subscribe(&self, job_id: &str) -> ApiResult<JobSubscription> {
        Ok(self.entry(job_id)?.tracker.subscribe())
    }

    /// 等待作业结束并返回结果
    pub async fn wait_for_terminal(&self, job_id: &str) -> ApiResult<ImportResult> {
        let entry = self.entry(job_id)?;
        entry.tracker.wait_terminal().await;
        Ok(entry.tracker.job().to_result())
    }

    /// 终态结果
    pub fn result(&self, job_id: &str) -> ApiResult<ImportResult> {
        let job = self.entry(job_id)?.tracker.job();
        if !job.is_terminal() {
            return Err(ApiError::invalid_state(job.phase, "读取结果"));
        }
        Ok(job.to_result())
    }

    /// 分批落库汇总（提交后可用）
    pub async fn commit_summary(&self, job_id: &str) -> ApiResult<Option<CommitSummary>> {
        let entry = self.entry(job_id)?;
        let data = entry.data.lock().await;
        Ok(data.commit.clone())
    }

    // ==========================================
    // 释放
    // ==========================================

    /// 释放终态作业（配置了归档时先归档）
    #[instrument(skip(self))]
    pub async fn release(&self, job_id: &str) -> ApiResult<ImportResult> {
        let entry = self.entry(job_id)?;
        let job = entry.tracker.job();
        if !job.is_terminal() {
            return Err(ApiError::invalid_state(job.phase, "释放作业"));
        }

        if let Some(archive) = &self.archive {
            archive.archive(&job).await?;
        }

        let mut jobs = self
            .jobs
            .write()
            .map_err(|e| ApiError::InternalError(format!("作业表锁获取失败: {}", e)))?;
        jobs.remove(job_id);
        info!(job_id, phase = %job.phase, "作业已释放");
        Ok(job.to_result())
    }

    // ==========================================
    // 模板
    // ==========================================

    /// 生成导入模板（CSV / JSON / XML）
    pub fn template(&self, format: FileFormat, with_example: bool) -> ApiResult<TemplateFile> {
        Ok(TemplateFile {
            file_name: template_file_name(format),
            content: generate_template(format, with_example)?,
        })
    }
}

// ==========================================
// 后台任务
// ==========================================

/// 作业超时看门狗：超时强制 failed 并停止派发
fn spawn_watchdog(entry: Arc<JobEntry>, max_secs: u64) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(max_secs)) => {
                if entry.tracker.fail(&ImportError::Timeout { secs: max_secs }) {
                    entry.cancel.cancel();
                }
            }
            _ = entry.tracker.wait_terminal() => {}
        }
    });
}

/// 识别 + 解析 + 自动映射
async fn ingest(entry: Arc<JobEntry>, file_name: String, bytes: Vec<u8>, settings: ImportSettings) {
    let tracker = &entry.tracker;

    // ===== uploading: 格式识别 =====
    let detector = FormatDetector::new(settings.max_file_bytes);
    let detected = match detector.detect(&file_name, &bytes) {
        Ok(detected) => detected,
        Err(e) => {
            tracker.fail(&ImportError::Format(e));
            return;
        }
    };
    tracker.update(|job| {
        job.format = Some(detected.format);
        job.phase_progress = 100.0;
    });
    let format = detected.format.to_string();
    if tracker
        .transition(
            ImportPhase::Parsing,
            i18n::t_with_args("progress.parsing", &[("format", format.as_str())]),
        )
        .is_err()
    {
        return;
    }

    // ===== parsing =====
    let to_parse = detected.clone();
    let parsed =
        tokio::task::spawn_blocking(move || UniversalFileParser.parse(&bytes, &to_parse, None))
            .await;
    let parsed = match parsed {
        Ok(Ok(parsed)) => parsed,
        Ok(Err(e)) => {
            tracker.fail(&ImportError::Format(e));
            return;
        }
        Err(e) => {
            tracker.fail(&ImportError::InternalError(format!("解析任务异常: {}", e)));
            return;
        }
    };

    // ===== mapping_validating =====
    let mut data = entry.data.lock().await;
    let rows = parsed.records.len().to_string();
    let columns = parsed.columns.len().to_string();
    let proposed = AutoMapper.propose(&parsed.columns);

    data.file_warnings = detected.warnings.clone();
    data.file_warnings.extend(parsed.errors.iter().cloned());
    let file_warnings = data.file_warnings.clone();
    let total_rows = parsed.records.len();
    tracker.update(|job| {
        job.counts.total_rows = total_rows;
        for warning in file_warnings {
            job.warnings.record(warning);
        }
        job.phase_progress = 100.0;
    });
    if tracker
        .transition(
            ImportPhase::MappingValidating,
            i18n::t_with_args(
                "progress.parsed",
                &[("rows", rows.as_str()), ("columns", columns.as_str())],
            ),
        )
        .is_err()
    {
        return;
    }
    data.parsed = Some(parsed);
    data.mapping = proposed.clone();

    match apply_mapping(&entry, &mut data, proposed, &settings) {
        Ok(_) => info!("自动映射通过校验"),
        Err(e) => info!(error = %e, "自动映射待人工修正"),
    }
}

/// 校验映射；通过则转换 + 预览
fn apply_mapping(
    entry: &JobEntry,
    data: &mut JobData,
    mapping: FieldMapping,
    settings: &ImportSettings,
) -> ApiResult<PreviewStats> {
    let tracker = &entry.tracker;
    let phase = tracker.phase();
    let parsed = data
        .parsed
        .as_ref()
        .ok_or_else(|| ApiError::invalid_state(phase, "修改字段映射"))?;

    let validated = match mapping_validator::validate(&mapping, &parsed.columns) {
        Ok(validated) => validated,
        Err(issues) => {
            if phase == ImportPhase::MappingValidating {
                let count = issues.len().to_string();
                data.mapping = mapping;
                data.issues = issues.clone();
                tracker.update(|job| {
                    job.message =
                        i18n::t_with_args("progress.mapping_pending", &[("count", count.as_str())]);
                });
            }
            return Err(ApiError::Mapping(issues));
        }
    };

    let transformer: RecordTransformer = RecordTransformer::default();
    let rows = transformer.transform_all(&parsed.records, &validated);
    let preview = DryRunEngine::new(settings.preview_sample_size, settings.error_cap).preview(&rows);

    let mut warnings = ErrorLog::new(settings.error_cap);
    for warning in data
        .file_warnings
        .iter()
        .chain(rows.iter().flat_map(|row| row.warnings.iter()))
    {
        warnings.record(warning.clone());
    }
    let valid = preview.valid_leads;
    let skipped = preview.skipped_rows;
    let message = i18n::t_with_args(
        "progress.preview_ready",
        &[
            ("valid", valid.to_string().as_str()),
            ("skipped", skipped.to_string().as_str()),
        ],
    );

    data.mapping = mapping;
    data.issues.clear();
    data.accepted = Some(validated);
    data.rows = rows;
    data.preview = Some(preview.clone());

    let applied = tracker.update(|job| {
        job.counts.valid_rows = valid;
        job.counts.skipped_rows = skipped;
        job.warnings = warnings;
        job.phase_progress = 100.0;
        job.message = message.clone();
    });
    if !applied {
        return Err(ApiError::invalid_state(tracker.phase(), "修改字段映射"));
    }
    if phase == ImportPhase::MappingValidating {
        tracker.transition(ImportPhase::PreviewReady, message)?;
    }
    Ok(preview)
}

/// 汇总提交结果并推进到终态
async fn finish_commit(entry: &JobEntry, summary: CommitSummary) {
    let tracker = &entry.tracker;
    let canceled = summary.canceled;
    entry.data.lock().await.commit = Some(summary);

    if canceled {
        tracker.cancel();
        return;
    }
    if tracker
        .transition(ImportPhase::Finalizing, i18n::t("progress.finalizing"))
        .is_err()
    {
        return;
    }
    if entry.cancel.is_cancelled() {
        tracker.cancel();
        return;
    }

    let job = tracker.job();
    let counts = job.counts;
    if counts.imported == 0 && counts.failed > 0 {
        let reason = job
            .errors
            .top(1)
            .into_iter()
            .next()
            .unwrap_or_else(|| i18n::t("common.unknown_error"));
        warn!(failed = counts.failed, "全部线索写入失败");
        if let Err(e) = tracker.transition(
            ImportPhase::Failed,
            i18n::t_with_args("progress.failed", &[("reason", reason.as_str())]),
        ) {
            debug!(job_id = %job.job_id, error = %e, "作业已被并发终止，忽略 failed 转换");
        }
        return;
    }

    let imported = counts.imported.to_string();
    let skipped = counts.skipped_rows.to_string();
    let failed = counts.failed.to_string();
    if let Err(e) = tracker.transition(
        ImportPhase::Completed,
        i18n::t_with_args(
            "progress.completed",
            &[
                ("imported", imported.as_str()),
                ("skipped", skipped.as_str()),
                ("failed", failed.as_str()),
            ],
        ),
    ) {
        debug!(job_id = %job.job_id, error = %e, "作业已被并发终止，忽略 completed 转换");
    }
}
