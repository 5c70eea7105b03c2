//! 运行控制器 - 编排层
//!
//! 按表格顺序逐条处理候选人，在每条记录之前检查暂停 / 终止，
//! 汇总结果；正常结束时发送汇总通知。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::control::RunState;
use crate::error::{AutomationError, FailureKind};
use crate::models::Record;
use crate::services::{Notification, Notifier};
use crate::utils::logging::log_record_start;
use crate::workflow::{RecordCtx, RecordOutcome, RecordPipeline, RecordReport};

/// 一次运行的结果
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<RecordReport>,
    /// 被操作员终止时为真，此时 `reports` 只包含已处理完的记录
    pub aborted: bool,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn done(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Done(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Failed { .. }))
    }

    pub fn failures_by_kind(&self) -> Vec<(FailureKind, usize)> {
        let mut counts: BTreeMap<FailureKind, usize> = BTreeMap::new();
        for kind in self.reports.iter().filter_map(|r| r.outcome.failure_kind()) {
            *counts.entry(kind).or_insert(0) += 1;
        }
        counts.into_iter().collect()
    }

    fn count(&self, pred: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// 汇总通知正文
    pub fn describe(&self) -> String {
        let mut lines = vec![
            format!("処理件数: {}", self.total()),
            format!("完了: {}", self.done()),
            format!("スキップ: {}", self.skipped()),
            format!("エラー: {}", self.failed()),
        ];
        for report in &self.reports {
            if let RecordOutcome::Failed { stage, message, .. } = &report.outcome {
                lines.push(format!("  #{} [{}] {}", report.identifier, stage, message));
            }
        }
        lines.join("\n")
    }
}

/// 运行控制器
pub struct RunController {
    pipeline: RecordPipeline,
    state: Arc<RunState>,
    pause_poll: Duration,
    notifier: Arc<dyn Notifier>,
    summary_recipient: Option<String>,
    summary_subject: String,
}

impl RunController {
    pub fn new(
        pipeline: RecordPipeline,
        state: Arc<RunState>,
        pause_poll: Duration,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            pipeline,
            state,
            pause_poll,
            notifier,
            summary_recipient: None,
            summary_subject: "処理結果".to_string(),
        }
    }

    /// 运行结束后把汇总发给 `recipient`
    pub fn with_summary(mut self, recipient: Option<String>, subject: impl Into<String>) -> Self {
        self.summary_recipient = recipient;
        self.summary_subject = subject.into();
        self
    }

    /// 按顺序处理全部记录
    pub async fn run(&self, records: &[Record]) -> RunSummary {
        let total = records.len();
        let mut summary = RunSummary::default();

        for (idx, record) in records.iter().enumerate() {
            if let Err(AutomationError::FatalAbort) = self.state.checkpoint(self.pause_poll).await {
                summary.aborted = true;
                break;
            }

            log_record_start(idx + 1, total, record);
            let ctx = RecordCtx::new(idx + 1, total, record);
            match self.pipeline.run(record, &ctx).await {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    warn!("{} 🛑 运行终止: {}", ctx, e);
                    summary.aborted = true;
                    break;
                }
            }
        }

        if summary.aborted {
            warn!("🛑 已终止，处理了 {}/{} 条记录", summary.total(), total);
        } else {
            self.signal_completed(&summary).await;
        }
        summary
    }

    /// 正常结束后的汇总通知；被终止时不会调用
    async fn signal_completed(&self, summary: &RunSummary) {
        let Some(recipient) = &self.summary_recipient else {
            return;
        };
        let notification = Notification {
            to: recipient.clone(),
            cc: String::new(),
            subject: self.summary_subject.clone(),
            body: summary.describe(),
            attachments: Vec::new(),
        };
        match self.notifier.send(&notification).await {
            Ok(()) => info!("📨 已发送汇总通知: {}", recipient),
            Err(e) => warn!("⚠️ 汇总通知发送失败: {}", e),
        }
    }
}
