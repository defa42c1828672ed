// ==========================================
// CRM 线索导入 - 导入作业领域模型
// ==========================================
// 职责: ImportJob（作业状态）/ 有界错误日志 / 进度消息 / 终态结果
// 红线: ImportJob 只允许由进度跟踪器修改
// ==========================================

use crate::domain::lead::TenantContext;
use crate::domain::types::{FileFormat, ImportPhase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ErrorLog - 有界去重错误日志
// ==========================================
// 最多保留 cap 条不同消息，超出部分只计数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub message: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLog {
    cap: usize,
    entries: Vec<ErrorEntry>,
    overflow: usize,
}

impl ErrorLog {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            entries: Vec::new(),
            overflow: 0,
        }
    }

    /// 记录一条消息；重复消息只累加次数
    pub fn record(&mut self, message: impl Into<String>) {
        let message = message.into();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.message == message) {
            entry.count += 1;
            return;
        }
        if self.entries.len() < self.cap {
            self.entries.push(ErrorEntry { message, count: 1 });
        } else {
            self.overflow += 1;
        }
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    /// 因容量上限被丢弃的不同消息数
    pub fn overflow(&self) -> usize {
        self.overflow
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.overflow == 0
    }

    /// 已保留消息（按首次出现顺序）
    pub fn messages(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    /// 出现次数最多的 n 条消息（次数相同按首次出现顺序）
    pub fn top(&self, n: usize) -> Vec<String> {
        let mut sorted: Vec<&ErrorEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.count.cmp(&a.count));
        sorted.into_iter().take(n).map(|e| e.message.clone()).collect()
    }
}

// ==========================================
// JobCounts - 作业计数
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub skipped_rows: usize,
    pub imported: usize,
    pub failed: usize,
}

// ==========================================
// ImportJob - 导入作业
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub job_id: String,
    pub tenant: TenantContext,
    pub file_name: String,
    pub format: Option<FileFormat>,

    // ===== 状态 =====
    pub phase: ImportPhase,
    pub counts: JobCounts,
    pub batches_total: usize,
    pub batches_completed: usize,

    // ===== 有界日志 =====
    /// 作业级 / 批次级 / 写入错误
    pub errors: ErrorLog,
    /// 行级跳过原因（独立容量，不挤占写入错误）
    pub skip_reasons: ErrorLog,
    pub warnings: ErrorLog,

    // ===== 进度 =====
    pub total_progress: f64,
    pub phase_progress: f64,
    pub message: String,
    pub sequence: u64,

    // ===== 审计 =====
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn new(
        job_id: String,
        tenant: TenantContext,
        file_name: impl Into<String>,
        error_cap: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            tenant,
            file_name: file_name.into(),
            format: None,
            phase: ImportPhase::Uploading,
            counts: JobCounts::default(),
            batches_total: 0,
            batches_completed: 0,
            errors: ErrorLog::new(error_cap),
            skip_reasons: ErrorLog::new(error_cap),
            warnings: ErrorLog::new(error_cap),
            total_progress: 0.0,
            phase_progress: 0.0,
            message: String::new(),
            sequence: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// 生成推送消息（快照）
    pub fn to_progress_message(&self, top_errors: usize) -> ProgressMessage {
        ProgressMessage {
            kind: ProgressMessage::KIND.to_string(),
            sequence: self.sequence,
            job_id: self.job_id.clone(),
            current_phase: self.phase,
            total_progress_percent: self.total_progress,
            phase_progress_percent: self.phase_progress,
            message: self.message.clone(),
            metrics: ProgressMetrics {
                records_inserted: self.counts.imported,
                records_skipped: self.counts.skipped_rows,
                records_failed: self.counts.failed,
                top_errors: self.top_errors(top_errors),
            },
        }
    }

    /// 高频错误: 写入错误优先，不足 n 条时以跳过原因补齐
    pub fn top_errors(&self, n: usize) -> Vec<String> {
        let mut top = self.errors.top(n);
        let remaining = n.saturating_sub(top.len());
        top.extend(self.skip_reasons.top(remaining));
        top
    }

    /// 终态汇总（写入错误在前，跳过原因在后）
    pub fn to_result(&self) -> ImportResult {
        let mut errors = self.errors.messages();
        errors.extend(self.skip_reasons.messages());
        ImportResult {
            imported_count: self.counts.imported,
            skipped_count: self.counts.skipped_rows,
            failed_count: self.counts.failed,
            errors,
            errors_overflow: self.errors.overflow() + self.skip_reasons.overflow(),
        }
    }
}

// ==========================================
// ProgressMessage - 进度推送消息
// ==========================================
// 线上格式: {type: "progress", currentPhase, totalProgressPercent, ...}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub sequence: u64,
    pub job_id: String,
    pub current_phase: ImportPhase,
    pub total_progress_percent: f64,
    pub phase_progress_percent: f64,
    pub message: String,
    pub metrics: ProgressMetrics,
}

impl ProgressMessage {
    pub const KIND: &'static str = "progress";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMetrics {
    pub records_inserted: usize,
    pub records_skipped: usize,
    pub records_failed: usize,
    pub top_errors: Vec<String>,
}

// ==========================================
// ImportResult - 终态结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub imported_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
    pub errors_overflow: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_log_dedup_and_cap() {
        let mut log = ErrorLog::new(2);
        log.record("a");
        log.record("b");
        log.record("a");
        log.record("c");
        log.record("d");

        assert_eq!(log.messages(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(log.entries()[0].count, 2);
        assert_eq!(log.overflow(), 2);
    }

    #[test]
    fn test_error_log_top_by_count() {
        let mut log = ErrorLog::new(10);
        log.record("x");
        log.record("y");
        log.record("y");
        log.record("z");

        assert_eq!(log.top(2), vec!["y".to_string(), "x".to_string()]);
    }

    #[test]
    fn test_skip_reasons_do_not_crowd_out_write_errors() {
        let mut job = ImportJob::new(
            "job-1".to_string(),
            TenantContext::new("t1", "o1"),
            "leads.csv",
            3,
        );
        for row in 1..=5 {
            job.skip_reasons.record(format!("第 {} 行已跳过", row));
        }
        job.errors.record("批次 1 写入失败");

        let result = job.to_result();
        assert_eq!(result.errors[0], "批次 1 写入失败");
        assert_eq!(result.errors.len(), 4);
        assert_eq!(result.errors_overflow, 2);
        assert_eq!(job.top_errors(2)[0], "批次 1 写入失败");
        assert_eq!(job.top_errors(2).len(), 2);
    }

    #[test]
    fn test_progress_message_wire_format() {
        let job = ImportJob::new(
            "job-1".to_string(),
            TenantContext::new("t1", "o1"),
            "leads.csv",
            50,
        );
        let value = serde_json::to_value(job.to_progress_message(5)).unwrap();

        assert_eq!(value["type"], "progress");
        assert_eq!(value["currentPhase"], "uploading");
        assert_eq!(value["totalProgressPercent"], 0.0);
        assert!(value["metrics"]["topErrors"].as_array().unwrap().is_empty());
        assert_eq!(value["metrics"]["recordsInserted"], 0);
    }
}
