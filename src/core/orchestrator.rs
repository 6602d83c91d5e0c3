//! 编排器：并发扇出各分类 Agent 并汇总
//!
//! - 扇出：每个已注册分类一个 tokio 任务，先取并发许可，再在硬超时内调用 Agent
//! - 降级：单个分类失败/超时只替换为标记文本，不影响兄弟任务
//! - 汇合：等待全部任务后按注册顺序输出（与完成顺序无关），再附上无 Agent 的直通分类
//! - 提醒：合并全部内容后跑一次指令提取，结果作为返回值的一部分

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use futures_util::future::join_all;
use regex::Regex;
use serde::Serialize;

use crate::agent::{AgentOutcome, CategoryAgent};
use crate::alerts::{extract_alerts, AlertRequest};
use crate::core::ConcurrencyLimiter;
use crate::data::{CategoryData, MISSING_DATA};

/// 默认单分类超时
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(45);

/// 单个分类的结果类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Generated,
    Failed,
    Overloaded,
    TimedOut,
    /// 输入中有数据但没有对应 Agent，原样透传
    PassThrough,
}

/// 单个分类的一次生成结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    pub category: String,
    pub content: String,
    pub kind: ResultKind,
    pub error: Option<String>,
    /// 采集器附带的图表文件，交给外部渲染器
    pub chart_refs: Vec<PathBuf>,
}

/// run_all 的完整输出：结果列表与提取出的提醒
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOutput {
    pub results: Vec<GenerationResult>,
    pub alerts: Vec<AlertRequest>,
}

impl RunOutput {
    pub fn degraded_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| !matches!(r.kind, ResultKind::Generated | ResultKind::PassThrough))
            .count()
    }
}

/// 编排器：持有全部 Agent、并发限制器与单分类超时
pub struct Orchestrator {
    agents: Vec<Arc<CategoryAgent>>,
    limiter: ConcurrencyLimiter,
    agent_timeout: Duration,
}

impl Orchestrator {
    pub fn new(limiter: ConcurrencyLimiter, agent_timeout: Duration) -> Self {
        Self {
            agents: Vec::new(),
            limiter,
            agent_timeout,
        }
    }

    /// 注册 Agent；分类名重复时忽略并返回 false
    pub fn add_agent(&mut self, agent: CategoryAgent) -> bool {
        if self.agents.iter().any(|a| a.category() == agent.category()) {
            tracing::warn!(category = %agent.category(), "Duplicate category agent ignored");
            return false;
        }
        self.agents.push(Arc::new(agent));
        true
    }

    pub fn categories(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.category()).collect()
    }

    pub fn agent_timeout(&self) -> Duration {
        self.agent_timeout
    }

    /// 运行全部 Agent 并汇总
    pub async fn run_all(
        &self,
        user_context: &str,
        data: &BTreeMap<String, CategoryData>,
    ) -> RunOutput {
        let started = Instant::now();
        tracing::info!(
            agents = self.agents.len(),
            max_concurrency = self.limiter.capacity(),
            timeout_secs = self.agent_timeout.as_secs(),
            "Starting generation fan-out"
        );

        let handles: Vec<_> = self
            .agents
            .iter()
            .map(|agent| {
                let agent = Arc::clone(agent);
                let limiter = self.limiter.clone();
                let agent_timeout = self.agent_timeout;
                let user_context = user_context.to_string();
                let raw_data = data
                    .get(agent.category())
                    .map(|d| d.text.clone())
                    .unwrap_or_else(|| MISSING_DATA.to_string());

                tokio::spawn(async move {
                    let _permit = match limiter.acquire().await {
                        Ok(permit) => permit,
                        Err(e) => return AgentOutcome::Failed(e.to_string()),
                    };
                    // 超时只放弃等待；底层请求随 future drop 被尽力中止
                    match tokio::time::timeout(
                        agent_timeout,
                        agent.generate_outcome(&user_context, &raw_data),
                    )
                    .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            tracing::warn!(
                                category = %agent.category(),
                                timeout_secs = agent_timeout.as_secs(),
                                "Agent timed out, substituting marker"
                            );
                            AgentOutcome::TimedOut
                        }
                    }
                })
            })
            .collect();

        let outcomes = join_all(handles).await;

        let mut results: Vec<GenerationResult> = self
            .agents
            .iter()
            .zip(outcomes)
            .map(|(agent, joined)| {
                let outcome = joined.unwrap_or_else(|e| {
                    tracing::error!(category = %agent.category(), error = %e, "Agent task aborted");
                    AgentOutcome::Failed(format!("agent task aborted: {e}"))
                });
                let chart_refs = data
                    .get(agent.category())
                    .map(|d| d.chart_refs.clone())
                    .unwrap_or_default();
                to_result(agent.category(), outcome, chart_refs)
            })
            .collect();

        for (category, item) in data {
            if self.agents.iter().any(|a| a.category() == category) {
                continue;
            }
            tracing::debug!(%category, "No agent registered, passing data through");
            results.push(GenerationResult {
                category: category.clone(),
                content: pass_through_content(category, &item.text),
                kind: ResultKind::PassThrough,
                error: None,
                chart_refs: item.chart_refs.clone(),
            });
        }

        let alerts = extract_alerts(&merge_contents(&results));
        tracing::info!(
            results = results.len(),
            alerts = alerts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generation fan-in complete"
        );

        RunOutput { results, alerts }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(ConcurrencyLimiter::default(), DEFAULT_AGENT_TIMEOUT)
    }
}

fn to_result(category: &str, outcome: AgentOutcome, chart_refs: Vec<PathBuf>) -> GenerationResult {
    let (kind, error) = match &outcome {
        AgentOutcome::Content(_) => (ResultKind::Generated, None),
        AgentOutcome::Failed(err) => (ResultKind::Failed, Some(err.clone())),
        AgentOutcome::Overloaded => (ResultKind::Overloaded, Some("rate limit retries exhausted".to_string())),
        AgentOutcome::TimedOut => (ResultKind::TimedOut, Some("backend timed out".to_string())),
    };
    GenerationResult {
        category: category.to_string(),
        content: strip_code_fences(&outcome.into_text(category)),
        kind,
        error,
        chart_refs,
    }
}

fn pass_through_content(category: &str, text: &str) -> String {
    format!("📎 *{}* (raw data, no agent)\n{}", category.to_uppercase(), text)
}

fn merge_contents(results: &[GenerationResult]) -> String {
    results
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn fence_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_+-]*[ \t]*\r?\n?").expect("fence regex is valid"))
}

/// 去掉模型防御性包裹的代码围栏：整行的 ``` / ```markdown 删除，行内残留的 ``` 也一并去掉
pub fn strip_code_fences(content: &str) -> String {
    let without_lines = fence_line_regex().replace_all(content, "");
    without_lines.replace("```", "").trim().to_string()
}

/// 组装最终简报：标题行、日期行、各分类内容
pub fn render_report(title: &str, date: NaiveDate, results: &[GenerationResult]) -> String {
    let mut report = format!("🌅 *{}*\n*{}*\n", title, date.format("%d/%m/%Y"));
    report.push_str(&merge_contents(results));
    report
}
