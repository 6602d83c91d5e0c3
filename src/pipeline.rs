//! 每日简报流水线：构建分类 Agent、跑编排器、投递简报、登记提醒
//!
//! 入口二进制只负责加载配置与打开存储，其余组装都在这里完成，便于集成测试直接驱动。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::agent::{CategoryAgent, RetryPolicy};
use crate::config::AppConfig;
use crate::core::{render_report, ConcurrencyLimiter, Orchestrator, RunOutput};
use crate::data::CategoryData;
use crate::llm::create_client_for_category;
use crate::notify::Notifier;
use crate::prompts;
use crate::reminders::{ReminderScheduler, ReminderStore, ScheduleReport};

/// 一次运行的汇总
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub report: String,
    pub output: RunOutput,
    pub report_sent: bool,
    pub schedule: ScheduleReport,
}

/// 按配置注册分类 Agent；没有任何凭据的分类跳过
pub fn build_orchestrator(cfg: &AppConfig, base_prompt: &str) -> Orchestrator {
    let orch = &cfg.orchestrator;
    let retry = RetryPolicy::new(orch.max_retries, Duration::from_secs(orch.retry_base_delay_secs));
    let mut orchestrator = Orchestrator::new(
        ConcurrencyLimiter::new(orch.max_concurrency),
        Duration::from_secs(orch.agent_timeout_secs),
    );

    for category in &orch.categories {
        let Some(client) = create_client_for_category(&cfg.llm, category) else {
            tracing::warn!(%category, "No API key found, agent not registered");
            continue;
        };
        let system_prompt = prompts::category_prompt(&cfg.app.prompts_dir, base_prompt, category);
        let agent = CategoryAgent::new(category.as_str(), system_prompt, client).with_retry_policy(retry);
        if orchestrator.add_agent(agent) {
            tracing::debug!(%category, model = %cfg.llm.model, "Registered category agent");
        }
    }

    orchestrator
}

/// 每日流水线
pub struct DailyPipeline {
    orchestrator: Orchestrator,
    scheduler: ReminderScheduler,
    notifier: Arc<dyn Notifier>,
    user_context: String,
    report_title: String,
}

impl DailyPipeline {
    pub fn new(
        orchestrator: Orchestrator,
        scheduler: ReminderScheduler,
        notifier: Arc<dyn Notifier>,
        user_context: impl Into<String>,
        report_title: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            scheduler,
            notifier,
            user_context: user_context.into(),
            report_title: report_title.into(),
        }
    }

    /// 从配置组装；公共提示词缺失或时区非法时启动失败
    pub fn from_config(
        cfg: &AppConfig,
        store: Arc<dyn ReminderStore>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let base_prompt = prompts::load_base_prompt(&cfg.app.prompts_dir).with_context(|| {
            format!(
                "Base prompt not found at {}",
                prompts::base_prompt_path(&cfg.app.prompts_dir).display()
            )
        })?;
        let timezone = cfg.reminders.tz()?;
        let orchestrator = build_orchestrator(cfg, &base_prompt);
        if orchestrator.categories().is_empty() {
            tracing::warn!("No category agents registered, the report will only contain raw data");
        }

        Ok(Self::new(
            orchestrator,
            ReminderScheduler::new(store, timezone, cfg.reminders.lead()),
            notifier,
            cfg.app.user_context.clone(),
            cfg.app.report_title.clone(),
        ))
    }

    /// 跑一次：生成、渲染、投递简报，再登记提醒
    ///
    /// 简报发送失败只记日志，提醒照常登记。
    pub async fn run(&self, data: &BTreeMap<String, CategoryData>, now: DateTime<Utc>) -> PipelineSummary {
        tracing::info!(categories = ?self.orchestrator.categories(), "AI analysis in progress");
        let output = self.orchestrator.run_all(&self.user_context, data).await;

        let local_date = now.with_timezone(&self.scheduler.timezone()).date_naive();
        let report = render_report(&self.report_title, local_date, &output.results);

        let report_sent = match self.notifier.send(&report).await {
            Ok(()) => {
                tracing::info!(notifier = self.notifier.name(), degraded = output.degraded_count(), "Report delivered");
                true
            }
            Err(e) => {
                tracing::error!(notifier = self.notifier.name(), error = %e, "Failed to deliver report");
                false
            }
        };

        let schedule = if output.alerts.is_empty() {
            ScheduleReport::default()
        } else {
            tracing::info!(alerts = output.alerts.len(), "Found alerts, saving reminders");
            self.scheduler.schedule(&output.alerts, now).await
        };

        PipelineSummary {
            report,
            output,
            report_sent,
            schedule,
        }
    }
}
