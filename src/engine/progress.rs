// ==========================================
// CRM 线索导入 - 进度跟踪器
// ==========================================
// 职责: 持有作业状态机，计算加权进度并推送
// 红线: ImportJob 只在此处修改；终态后不再发生阶段转换
// ==========================================

use crate::domain::import_job::{ImportJob, ProgressMessage};
use crate::domain::types::ImportPhase;
use crate::engine::events::{JobSubscription, ProgressPublisher, DEFAULT_CHANNEL_CAPACITY};
use crate::i18n;
use crate::importer::error::{ImportError, PipelineResult};
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// 加权总进度
///
/// 总进度 = 已完成阶段权重之和 + 当前阶段权重 × 阶段进度 / 100
/// 终态不参与计算（completed 由调用方置为 100）
pub fn weighted_total(phase: ImportPhase, phase_percent: f64) -> Option<f64> {
    let ordinal = phase.ordinal()?;
    let completed: f64 = ImportPhase::PIPELINE[..ordinal]
        .iter()
        .map(|p| p.weight())
        .sum();
    let percent = phase_percent.clamp(0.0, 100.0);
    Some(completed + phase.weight() * percent / 100.0)
}

// ==========================================
// ProgressTracker
// ==========================================
pub struct ProgressTracker {
    job: Mutex<ImportJob>,
    publisher: ProgressPublisher,
    top_errors: usize,
}

impl ProgressTracker {
    /// # 参数
    /// - job: 新建作业（uploading 阶段）
    /// - top_errors: 进度消息携带的高频错误条数
    pub fn new(job: ImportJob, top_errors: usize) -> Self {
        let initial = job.to_progress_message(top_errors);
        Self {
            job: Mutex::new(job),
            publisher: ProgressPublisher::new(initial, DEFAULT_CHANNEL_CAPACITY),
            top_errors,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ImportJob> {
        // 持锁期间不会 panic，中毒后直接沿用内部数据
        self.job.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 作业副本
    pub fn job(&self) -> ImportJob {
        self.lock().clone()
    }

    pub fn phase(&self) -> ImportPhase {
        self.lock().phase
    }

    pub fn latest(&self) -> ProgressMessage {
        self.publisher.snapshot()
    }

    pub fn subscribe(&self) -> JobSubscription {
        self.publisher.subscribe()
    }

    /// 等待作业进入终态，返回终态快照
    pub async fn wait_terminal(&self) -> ProgressMessage {
        let mut rx = self.publisher.watch();
        let result = rx
            .wait_for(|message| message.current_phase.is_terminal())
            .await
            .map(|message| message.clone());
        match result {
            Ok(message) => message,
            // 发送端随 tracker 存活
            Err(_) => self.publisher.snapshot(),
        }
    }

    /// 阶段转换
    ///
    /// # 返回
    /// - Ok(()): 转换成功并已推送
    /// - Err(InvalidTransition): 非法转换（含终态之后的任何转换）
    pub fn transition(&self, next: ImportPhase, message: impl Into<String>) -> PipelineResult<()> {
        let mut job = self.lock();
        let from = job.phase;
        if !from.can_transition_to(next) {
            warn!(job_id = %job.job_id, %from, to = %next, "非法阶段转换");
            return Err(ImportError::InvalidTransition { from, to: next });
        }

        job.phase = next;
        job.message = message.into();
        job.phase_progress = if next == ImportPhase::Completed { 100.0 } else { 0.0 };
        if next.is_terminal() {
            job.finished_at = Some(Utc::now());
        }
        self.refresh_total(&mut job);

        info!(
            job_id = %job.job_id,
            %from,
            to = %next,
            total = job.total_progress,
            "作业阶段转换"
        );
        self.publish_locked(&mut job);
        Ok(())
    }

    /// 更新当前阶段进度（终态忽略）
    pub fn set_phase_progress(&self, percent: f64, message: impl Into<String>) -> bool {
        self.update(|job| {
            job.phase_progress = percent.clamp(0.0, 100.0);
            job.message = message.into();
        })
    }

    /// 修改作业数据并推送（终态忽略）
    ///
    /// # 返回
    /// - true: 已修改并推送
    /// - false: 作业已处于终态
    pub fn update(&self, f: impl FnOnce(&mut ImportJob)) -> bool {
        let mut job = self.lock();
        if job.phase.is_terminal() {
            return false;
        }
        f(&mut job);
        self.refresh_total(&mut job);
        self.publish_locked(&mut job);
        true
    }

    /// 修改计数（终态也生效，但不再推送）
    ///
    /// 用于超时后仍在途的批次回写结果
    pub fn record(&self, f: impl FnOnce(&mut ImportJob)) {
        let mut job = self.lock();
        let terminal = job.phase.is_terminal();
        f(&mut job);
        if terminal {
            job.updated_at = Utc::now();
            debug!(job_id = %job.job_id, "终态作业计数已更新");
        } else {
            self.refresh_total(&mut job);
            self.publish_locked(&mut job);
        }
    }

    /// 失败终止（已是终态返回 false）
    pub fn fail(&self, error: &ImportError) -> bool {
        let reason = error.to_string();
        let mut job = self.lock();
        if job.phase.is_terminal() {
            return false;
        }
        let from = job.phase;
        job.errors.record(reason.clone());
        job.phase = ImportPhase::Failed;
        job.message = i18n::t_with_args("progress.failed", &[("reason", reason.as_str())]);
        job.finished_at = Some(Utc::now());
        self.refresh_total(&mut job);

        warn!(job_id = %job.job_id, %from, error = %reason, "导入作业失败");
        self.publish_locked(&mut job);
        true
    }

    /// 取消终止（已是终态返回 false）
    pub fn cancel(&self) -> bool {
        self.transition(ImportPhase::Canceled, i18n::t("progress.canceled"))
            .is_ok()
    }

    /// 总进度只增不减；completed 固定 100
    fn refresh_total(&self, job: &mut ImportJob) {
        let computed = match job.phase {
            ImportPhase::Completed => Some(100.0),
            phase => weighted_total(phase, job.phase_progress),
        };
        if let Some(total) = computed {
            job.total_progress = job.total_progress.max(total);
        }
    }

    fn publish_locked(&self, job: &mut ImportJob) {
        job.sequence += 1;
        job.updated_at = Utc::now();
        // 持锁推送，保证 sequence 与推送顺序一致
        self.publisher.publish(job.to_progress_message(self.top_errors));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lead::TenantContext;

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(
            ImportJob::new(
                "job-1".to_string(),
                TenantContext::new("t1", "o1"),
                "leads.csv",
                10,
            ),
            5,
        )
    }

    #[test]
    fn test_weighted_total() {
        assert_eq!(weighted_total(ImportPhase::Uploading, 100.0), Some(5.0));
        assert_eq!(weighted_total(ImportPhase::MappingValidating, 0.0), Some(20.0));
        assert_eq!(weighted_total(ImportPhase::PreviewReady, 0.0), Some(30.0));
        assert_eq!(weighted_total(ImportPhase::ImportingBatches, 50.0), Some(60.0));
        assert_eq!(weighted_total(ImportPhase::Finalizing, 100.0), Some(100.0));
        assert_eq!(weighted_total(ImportPhase::Failed, 50.0), None);
    }

    #[test]
    fn test_forward_transitions_only() {
        let tracker = tracker();
        tracker.transition(ImportPhase::Parsing, "").unwrap();
        assert!(tracker.transition(ImportPhase::PreviewReady, "").is_err());
        assert!(tracker.transition(ImportPhase::Uploading, "").is_err());
        assert_eq!(tracker.phase(), ImportPhase::Parsing);
    }

    #[test]
    fn test_no_transition_after_cancel() {
        let tracker = tracker();
        assert!(tracker.cancel());
        assert!(!tracker.cancel());
        assert!(tracker.transition(ImportPhase::Parsing, "").is_err());
        assert!(!tracker.fail(&ImportError::Timeout { secs: 1 }));
        assert!(!tracker.update(|job| job.counts.imported = 5));
        assert_eq!(tracker.phase(), ImportPhase::Canceled);
    }

    #[test]
    fn test_total_is_monotonic() {
        let tracker = tracker();
        tracker.set_phase_progress(100.0, "");
        tracker.transition(ImportPhase::Parsing, "").unwrap();
        let before = tracker.latest().total_progress_percent;
        tracker.set_phase_progress(0.0, "");
        assert!(tracker.latest().total_progress_percent >= before);

        tracker.set_phase_progress(60.0, "");
        assert_eq!(tracker.latest().total_progress_percent, 14.0);
    }

    #[test]
    fn test_fail_records_reason_and_keeps_total() {
        let tracker = tracker();
        tracker.transition(ImportPhase::Parsing, "").unwrap();
        let before = tracker.latest().total_progress_percent;

        assert!(tracker.fail(&ImportError::Timeout { secs: 30 }));
        let latest = tracker.latest();
        assert_eq!(latest.current_phase, ImportPhase::Failed);
        assert_eq!(latest.total_progress_percent, before);
        assert_eq!(latest.metrics.top_errors.len(), 1);
    }

    #[test]
    fn test_record_after_terminal_updates_counts_silently() {
        let tracker = tracker();
        tracker.fail(&ImportError::Timeout { secs: 1 });
        let sequence = tracker.latest().sequence;

        tracker.record(|job| job.counts.imported += 3);
        assert_eq!(tracker.job().counts.imported, 3);
        assert_eq!(tracker.latest().sequence, sequence);
    }

    #[tokio::test]
    async fn test_wait_terminal() {
        let tracker = std::sync::Arc::new(tracker());
        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_terminal().await })
        };
        tracker.cancel();
        let message = waiter.await.unwrap();
        assert_eq!(message.current_phase, ImportPhase::Canceled);
    }
}
