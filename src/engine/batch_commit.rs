// ==========================================
// CRM 线索导入 - 分批落库引擎
// ==========================================
// 职责: 切分批次，有界并发写入，汇总批次结果
// 红线: 单批失败不中断后续批次；计数只在汇总循环中修改
// ==========================================

use crate::domain::lead::{LeadCandidate, TenantContext};
use crate::engine::progress::ProgressTracker;
use crate::i18n;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryResult;
use crate::repository::lead_repo::{LeadStore, UpsertOutcome};
use futures::future;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// 分批落库汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub batches_total: usize,
    pub batches_dispatched: usize,
    pub batches_succeeded: usize,
    pub batches_failed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed_records: usize,
    pub canceled: bool,
}

impl CommitSummary {
    /// 成功落库的记录数（新增 + 更新）
    pub fn imported(&self) -> usize {
        self.inserted + self.updated
    }
}

struct BatchCompletion {
    index: usize,
    size: usize,
    result: RepositoryResult<Vec<UpsertOutcome>>,
}

// ==========================================
// BatchCommitEngine
// ==========================================
pub struct BatchCommitEngine {
    store: Arc<dyn LeadStore>,
    batch_size: usize,
    worker_count: usize,
}

impl BatchCommitEngine {
    /// # 参数
    /// - store: 线索存储
    /// - batch_size: 每批条数（至少 1）
    /// - worker_count: 并发批次数（至少 1）
    pub fn new(store: Arc<dyn LeadStore>, batch_size: usize, worker_count: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            worker_count: worker_count.max(1),
        }
    }

    /// 按 batch_size 切分（保持原顺序）
    pub fn split_batches(&self, candidates: Vec<LeadCandidate>) -> Vec<Vec<LeadCandidate>> {
        let mut batches = Vec::with_capacity(candidates.len().div_ceil(self.batch_size));
        let mut iter = candidates.into_iter().peekable();
        while iter.peek().is_some() {
            batches.push(iter.by_ref().take(self.batch_size).collect());
        }
        batches
    }

    /// 分批写入
    ///
    /// 每次派发新批次前检查取消令牌；已派发的批次总会完成并计入结果
    #[instrument(skip_all, fields(records = candidates.len(), batch_size = self.batch_size))]
    pub async fn commit(
        &self,
        tenant: &TenantContext,
        candidates: Vec<LeadCandidate>,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> CommitSummary {
        let batches = self.split_batches(candidates);
        let batches_total = batches.len();
        let mut summary = CommitSummary {
            batches_total,
            ..CommitSummary::default()
        };

        tracker.update(|job| {
            job.batches_total = batches_total;
            job.batches_completed = 0;
            job.message = importing_message(0, batches_total);
        });
        if batches_total == 0 {
            return summary;
        }

        let dispatched = AtomicUsize::new(0);
        let mut completions = stream::iter(batches.into_iter().enumerate())
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|(index, batch)| {
                dispatched.fetch_add(1, Ordering::SeqCst);
                debug!(batch = index + 1, size = batch.len(), "派发批次");
                let store = Arc::clone(&self.store);
                let tenant = tenant.clone();
                async move {
                    let result = store.upsert(&tenant, &batch).await;
                    BatchCompletion {
                        index,
                        size: batch.len(),
                        result,
                    }
                }
            })
            .buffer_unordered(self.worker_count);

        while let Some(completion) = completions.next().await {
            Self::aggregate(completion, &mut summary, tracker);
        }
        drop(completions);

        summary.batches_dispatched = dispatched.load(Ordering::SeqCst);
        summary.canceled = cancel.is_cancelled();

        info!(
            dispatched = summary.batches_dispatched,
            succeeded = summary.batches_succeeded,
            failed = summary.batches_failed,
            imported = summary.imported(),
            failed_records = summary.failed_records,
            canceled = summary.canceled,
            "分批落库结束"
        );
        summary
    }

    /// 汇总单个批次结果
    fn aggregate(completion: BatchCompletion, summary: &mut CommitSummary, tracker: &ProgressTracker) {
        let BatchCompletion {
            index,
            size,
            result,
        } = completion;
        let batch_no = index + 1;

        let mut imported = 0;
        let mut failed = 0;
        let mut messages = Vec::new();

        match result {
            Ok(outcomes) => {
                summary.batches_succeeded += 1;
                let reported = outcomes.len();
                for outcome in outcomes {
                    match outcome {
                        UpsertOutcome::Inserted => {
                            summary.inserted += 1;
                            imported += 1;
                        }
                        UpsertOutcome::Updated => {
                            summary.updated += 1;
                            imported += 1;
                        }
                        UpsertOutcome::Rejected(reason) => {
                            failed += 1;
                            messages.push(reason);
                        }
                    }
                }
                if reported < size {
                    failed += size - reported;
                    messages.push(
                        ImportError::Persistence {
                            batch: batch_no,
                            affected: size - reported,
                            message: "存储未返回写入结果".to_string(),
                        }
                        .to_string(),
                    );
                }
            }
            Err(e) => {
                summary.batches_failed += 1;
                failed += size;
                let err = ImportError::Persistence {
                    batch: batch_no,
                    affected: size,
                    message: e.to_string(),
                };
                error!(batch = batch_no, affected = size, error = %e, "批次写入失败");
                messages.push(err.to_string());
            }
        }
        summary.failed_records += failed;

        tracker.record(|job| {
            job.counts.imported += imported;
            job.counts.failed += failed;
            for message in messages {
                job.errors.record(message);
            }
            job.batches_completed += 1;
            if job.batches_total > 0 {
                job.phase_progress =
                    (job.batches_completed as f64 / job.batches_total as f64 * 100.0).min(100.0);
            }
            job.message = importing_message(job.batches_completed, job.batches_total);
        });
    }
}

fn importing_message(done: usize, total: usize) -> String {
    let done = done.to_string();
    let total = total.to_string();
    i18n::t_with_args("progress.importing", &[("done", done.as_str()), ("total", total.as_str())])
}
