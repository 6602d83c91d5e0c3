//! 提醒投递 Worker
//!
//! 每次 sweep 都是无状态的一次扫描：取出 pending 且 remind_at <= now 的记录，逐条发送，
//! 发送成功才标记 sent；失败的记录保持 pending，下一次扫描再试（至少一次投递）。
//! 单条记录的发送与状态更新互相独立，一条失败不阻塞其它。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::StoreError;
use crate::notify::Notifier;
use crate::reminders::store::{ReminderRecord, ReminderStore};

/// 一次扫描的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
}

/// 提醒消息文本
pub fn format_reminder(record: &ReminderRecord, lead: chrono::Duration) -> String {
    format!(
        "⏰ *REMINDER ({} ahead)*\n\n🔥 *{}*",
        humanize_lead(lead),
        record.title
    )
}

fn humanize_lead(lead: chrono::Duration) -> String {
    let minutes = lead.num_minutes();
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m} min"),
        (1, 0) => "1 hour".to_string(),
        (h, 0) => format!("{h} hours"),
        (h, m) => format!("{h}h{m:02}"),
    }
}

/// 提醒投递 Worker
pub struct DispatchWorker {
    store: Arc<dyn ReminderStore>,
    notifier: Arc<dyn Notifier>,
    lead: chrono::Duration,
}

impl DispatchWorker {
    pub fn new(store: Arc<dyn ReminderStore>, notifier: Arc<dyn Notifier>, lead: chrono::Duration) -> Self {
        Self {
            store,
            notifier,
            lead,
        }
    }

    /// 扫描一次；只有查询本身失败才返回错误
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let due = self.store.due(now).await?;
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };

        if due.is_empty() {
            tracing::debug!(%now, "No reminders due");
            return Ok(report);
        }
        tracing::info!(count = due.len(), notifier = self.notifier.name(), "Dispatching due reminders");

        for record in &due {
            if let Err(e) = self.notifier.send(&format_reminder(record, self.lead)).await {
                tracing::warn!(reminder_id = record.id, title = %record.title, error = %e, "Delivery failed, will retry next sweep");
                report.failed += 1;
                continue;
            }

            match self.store.mark_sent(record.id).await {
                Ok(true) => {
                    tracing::info!(reminder_id = record.id, title = %record.title, "Reminder sent");
                    report.sent += 1;
                }
                Ok(false) => {
                    tracing::warn!(reminder_id = record.id, "Reminder was no longer pending after delivery");
                    report.sent += 1;
                }
                Err(e) => {
                    // 已送达但未标记，下次扫描会重发
                    tracing::error!(reminder_id = record.id, error = %e, "Failed to mark reminder as sent");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// 常驻模式：每隔 interval 扫描一次，直到 token 被取消
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        tracing::info!(interval_secs = interval.as_secs(), "Reminder worker started");
        loop {
            match self.sweep(Utc::now()).await {
                Ok(report) if report.due > 0 => {
                    tracing::info!(due = report.due, sent = report.sent, failed = report.failed, "Sweep finished");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Reminder query failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        tracing::info!("Reminder worker stopped");
    }
}
