//! Briefing 每日简报
//!
//! 入口：初始化日志、加载配置与分类数据，跑一次流水线（生成 → 投递 → 登记提醒）。
//! 配置文件可通过 BRIEFING_CONFIG 指定；`BRIEFING__LLM__PROVIDER=mock` 可离线演练。

use std::sync::Arc;

use anyhow::Context;
use briefing::config::load_from_env;
use briefing::data::load_category_data;
use briefing::notify::create_notifier;
use briefing::reminders::SqliteReminderStore;
use briefing::{observability, DailyPipeline};
use chrono::Utc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_from_env().context("Failed to load config")?;
    let store = SqliteReminderStore::open(&cfg.reminders.db_path).with_context(|| {
        format!("Failed to open reminder store at {}", cfg.reminders.db_path.display())
    })?;
    let notifier = create_notifier(&cfg.notify);
    let pipeline = DailyPipeline::from_config(&cfg, Arc::new(store), notifier)?;

    tracing::info!(dir = %cfg.app.data_dir.display(), "Fetching category data");
    let data = load_category_data(&cfg.app.data_dir).context("Failed to load category data")?;

    let summary = pipeline.run(&data, Utc::now()).await;
    tracing::info!(
        results = summary.output.results.len(),
        degraded = summary.output.degraded_count(),
        report_sent = summary.report_sent,
        reminders_saved = summary.schedule.persisted.len(),
        duplicates = summary.schedule.duplicates,
        dropped_past = summary.schedule.dropped_past,
        "Done"
    );

    Ok(())
}
