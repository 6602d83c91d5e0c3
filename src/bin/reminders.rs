//! Briefing 提醒 Worker
//!
//! 扫描到期的 pending 提醒并通过 Telegram 发送，成功后标记为 sent。未配置 Telegram 时拒绝启动。
//! `[worker] interval_secs = 0`（默认）时扫描一次即退出，适合由 cron 定时拉起；
//! 大于 0 时常驻运行，Ctrl-C / SIGTERM 优雅退出。
//!
//! 启动: cargo run --bin briefing-reminders

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use briefing::config::load_from_env;
use briefing::core::ShutdownManager;
use briefing::notify::create_delivery_notifier;
use briefing::observability;
use briefing::reminders::{DispatchWorker, SqliteReminderStore};
use chrono::Utc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_from_env().context("Failed to load config")?;
    let store = SqliteReminderStore::open(&cfg.reminders.db_path).with_context(|| {
        format!("Failed to open reminder store at {}", cfg.reminders.db_path.display())
    })?;
    // 没有真实通道时拒绝启动，提醒保持 pending
    let notifier = create_delivery_notifier(&cfg.notify).context("Telegram not configured")?;
    let worker = DispatchWorker::new(Arc::new(store), notifier, cfg.reminders.lead());

    if cfg.worker.interval_secs == 0 {
        let report = worker.sweep(Utc::now()).await.context("Reminder sweep failed")?;
        tracing::info!(due = report.due, sent = report.sent, failed = report.failed, "Sweep finished");
        return Ok(());
    }

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();
    worker
        .run(Duration::from_secs(cfg.worker.interval_secs), shutdown.token())
        .await;
    Ok(())
}
