//! 提醒调度：把 AlertRequest 换算为绝对触发时刻并持久化
//!
//! 指令里的 HH:MM 是规范时区中「今天」的挂钟时间，触发时刻 = 事件时间 - 提前量。
//! 触发时刻不晚于 now 的请求直接丢弃（不顺延到明天）。每条记录独立写入，单条失败不影响其它。

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::alerts::AlertRequest;
use crate::core::ScheduleError;
use crate::reminders::store::{InsertOutcome, NewReminder, ReminderRecord, ReminderStore};

/// 默认提前量
pub fn default_lead() -> Duration {
    Duration::hours(1)
}

/// 一次调度的汇总
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduleReport {
    pub persisted: Vec<ReminderRecord>,
    pub duplicates: usize,
    pub dropped_past: usize,
    pub rejected_invalid: usize,
    pub failed: usize,
}

/// 提醒调度器
pub struct ReminderScheduler {
    store: Arc<dyn ReminderStore>,
    timezone: Tz,
    lead: Duration,
}

/// 解析 "H:MM" 并做范围检查（hour < 24, minute < 60）
pub fn parse_clock(time: &str) -> Result<(u32, u32), ScheduleError> {
    let (hour, minute) = time
        .split_once(':')
        .ok_or_else(|| ScheduleError::InvalidTime(time.to_string()))?;
    let hour: u32 = hour
        .parse()
        .map_err(|_| ScheduleError::InvalidTime(time.to_string()))?;
    let minute: u32 = minute
        .parse()
        .map_err(|_| ScheduleError::InvalidTime(time.to_string()))?;
    if hour >= 24 || minute >= 60 {
        return Err(ScheduleError::OutOfRange { hour, minute });
    }
    Ok((hour, minute))
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn ReminderStore>, timezone: Tz, lead: Duration) -> Self {
        Self {
            store,
            timezone,
            lead,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// 计算触发时刻：规范时区的今天 + HH:MM，再减去提前量
    pub fn fire_instant(
        &self,
        alert: &AlertRequest,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        let (hour, minute) = parse_clock(&alert.time)?;
        let today = now.with_timezone(&self.timezone).date_naive();
        let naive = today
            .and_hms_opt(hour, minute, 0)
            .ok_or(ScheduleError::OutOfRange { hour, minute })?;
        // 夏令时回拨产生的歧义时间取较早者
        let event = self
            .timezone
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| ScheduleError::NonexistentLocalTime(naive.to_string()))?;
        Ok(event.with_timezone(&Utc) - self.lead)
    }

    /// 调度全部请求；不返回错误，所有问题都计入报告
    pub async fn schedule(&self, alerts: &[AlertRequest], now: DateTime<Utc>) -> ScheduleReport {
        let mut report = ScheduleReport::default();

        for alert in alerts {
            let remind_at = match self.fire_instant(alert, now) {
                Ok(instant) => instant,
                Err(e) => {
                    tracing::warn!(title = %alert.title, command = %alert.raw_command, error = %e, "Rejected reminder directive");
                    report.rejected_invalid += 1;
                    continue;
                }
            };

            if remind_at <= now {
                tracing::info!(title = %alert.title, time = %alert.time, "Reminder time already passed today, dropped");
                report.dropped_past += 1;
                continue;
            }

            let reminder = NewReminder {
                title: alert.title.clone(),
                remind_at,
            };
            match self.store.insert(reminder, now).await {
                Ok(InsertOutcome::Inserted(record)) => {
                    tracing::info!(
                        reminder_id = record.id,
                        title = %record.title,
                        remind_at = %record.remind_at,
                        "Saved reminder"
                    );
                    report.persisted.push(record);
                }
                Ok(InsertOutcome::Duplicate) => {
                    tracing::info!(title = %alert.title, %remind_at, "Reminder already scheduled, skipped");
                    report.duplicates += 1;
                }
                Err(e) => {
                    tracing::error!(title = %alert.title, error = %e, "Failed to save reminder");
                    report.failed += 1;
                }
            }
        }

        report
    }
}
