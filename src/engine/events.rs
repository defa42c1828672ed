// ==========================================
// CRM 线索导入 - 进度事件推送
// ==========================================
// 职责: 每个作业一个广播通道 + 一个最新快照通道
// 说明: 实时订阅者按 sequence 顺序收到消息；滞后或重连的订阅者收到当前快照
// ==========================================

use crate::domain::import_job::ProgressMessage;
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

/// 默认广播通道容量
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

// ==========================================
// ProgressPublisher
// ==========================================
pub struct ProgressPublisher {
    tx: broadcast::Sender<ProgressMessage>,
    latest: watch::Sender<ProgressMessage>,
}

impl ProgressPublisher {
    /// # 参数
    /// - initial: 初始快照
    /// - capacity: 广播通道容量
    pub fn new(initial: ProgressMessage, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let (latest, _) = watch::channel(initial);
        Self { tx, latest }
    }

    /// 推送一条消息（先更新快照，再广播）
    ///
    /// # 返回
    /// - 收到广播的订阅者数量
    pub fn publish(&self, message: ProgressMessage) -> usize {
        self.latest.send_replace(message.clone());
        match self.tx.send(message) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(message)) => {
                debug!(
                    job_id = %message.job_id,
                    sequence = message.sequence,
                    "无订阅者，仅更新快照"
                );
                0
            }
        }
    }

    /// 当前快照
    pub fn snapshot(&self) -> ProgressMessage {
        self.latest.borrow().clone()
    }

    /// 快照接收端（用于等待某个状态）
    pub fn watch(&self) -> watch::Receiver<ProgressMessage> {
        self.latest.subscribe()
    }

    /// 新订阅；第一条消息为当前快照
    pub fn subscribe(&self) -> JobSubscription {
        // 先订阅广播再读快照，期间推送的消息由 sequence 去重
        let rx = self.tx.subscribe();
        let latest = self.latest.subscribe();
        let initial = latest.borrow().clone();
        JobSubscription {
            rx,
            latest,
            pending: Some(initial),
            last_sequence: None,
            finished: false,
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ==========================================
// JobSubscription
// ==========================================
pub struct JobSubscription {
    rx: broadcast::Receiver<ProgressMessage>,
    latest: watch::Receiver<ProgressMessage>,
    pending: Option<ProgressMessage>,
    last_sequence: Option<u64>,
    finished: bool,
}

impl JobSubscription {
    /// 接收下一条消息
    ///
    /// # 返回
    /// - Some(msg): sequence 严格递增
    /// - None: 已收到终态消息，或作业已释放
    pub async fn recv(&mut self) -> Option<ProgressMessage> {
        if self.finished {
            return None;
        }
        if let Some(initial) = self.pending.take() {
            return Some(self.deliver(initial));
        }

        loop {
            match self.rx.recv().await {
                Ok(message) => {
                    if self.is_stale(&message) {
                        continue;
                    }
                    return Some(self.deliver(message));
                }
                Err(RecvError::Lagged(skipped)) => {
                    let snapshot = self.latest.borrow().clone();
                    warn!(
                        job_id = %snapshot.job_id,
                        skipped,
                        "订阅者滞后，改发当前快照"
                    );
                    if !self.is_stale(&snapshot) {
                        return Some(self.deliver(snapshot));
                    }
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// 转为 Stream（终态后结束）
    pub fn into_stream(self) -> impl Stream<Item = ProgressMessage> {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|message| (message, subscription))
        })
    }

    fn is_stale(&self, message: &ProgressMessage) -> bool {
        matches!(self.last_sequence, Some(last) if message.sequence <= last)
    }

    fn deliver(&mut self, message: ProgressMessage) -> ProgressMessage {
        self.last_sequence = Some(message.sequence);
        if message.current_phase.is_terminal() {
            self.finished = true;
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import_job::ImportJob;
    use crate::domain::lead::TenantContext;
    use crate::domain::types::ImportPhase;
    use futures::StreamExt;

    fn message(sequence: u64, phase: ImportPhase) -> ProgressMessage {
        let mut job = ImportJob::new(
            "job-1".to_string(),
            TenantContext::new("t1", "o1"),
            "leads.csv",
            10,
        );
        job.sequence = sequence;
        job.phase = phase;
        job.to_progress_message(5)
    }

    #[tokio::test]
    async fn test_subscriber_gets_snapshot_then_live_messages() {
        let publisher = ProgressPublisher::new(message(0, ImportPhase::Uploading), 16);
        publisher.publish(message(1, ImportPhase::Parsing));

        let mut sub = publisher.subscribe();
        publisher.publish(message(2, ImportPhase::MappingValidating));

        assert_eq!(sub.recv().await.unwrap().sequence, 1);
        assert_eq!(sub.recv().await.unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_receives_snapshot() {
        let publisher = ProgressPublisher::new(message(0, ImportPhase::Uploading), 2);
        let mut sub = publisher.subscribe();
        assert_eq!(sub.recv().await.unwrap().sequence, 0);

        for seq in 1..=6 {
            publisher.publish(message(seq, ImportPhase::ImportingBatches));
        }

        let next = sub.recv().await.unwrap();
        assert!(next.sequence >= 5);
        assert_eq!(publisher.snapshot().sequence, 6);
    }

    #[tokio::test]
    async fn test_stream_ends_after_terminal() {
        let publisher = ProgressPublisher::new(message(0, ImportPhase::Finalizing), 16);
        let sub = publisher.subscribe();
        publisher.publish(message(1, ImportPhase::Completed));

        let phases: Vec<ImportPhase> = sub
            .into_stream()
            .map(|m| m.current_phase)
            .collect()
            .await;
        assert_eq!(phases, vec![ImportPhase::Finalizing, ImportPhase::Completed]);
    }
}
