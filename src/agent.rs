//! 分类 Agent：单个分类的生成调用
//!
//! generate(user_context, raw_data) 总是返回字符串：成功文本，或带明显标记的错误/跳过文本，
//! 调用方无需处理错误。限流错误按线性退避重试（退避时长对应固定的配额重置窗口），
//! 其它错误视为不可恢复，立即转为错误文本。
//!
//! 重试被建模为显式状态机：Attempting → BackingOff → Attempting → … → Exhausted，
//! 退避使用 tokio::time::sleep，可被外层超时直接丢弃。

use std::sync::Arc;
use std::time::Duration;

use crate::llm::{LlmClient, Message};

/// 默认最大重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// 默认退避基数
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(10);

/// 追加在每个 Prompt 末尾的输出格式要求
pub const OUTPUT_INSTRUCTION: &str = "OUTPUT FORMAT:\nReply in concise Telegram Markdown \
(bold with *, bullets with -). Do not wrap the answer in code fences. \
To suggest a reminder, write /remind_<keyword>_<HH>h<MM> on its own line.";

/// 退避策略：第 n 次重试前等待 n * base_delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// 第 retry 次重试（从 1 开始）前的等待时长
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }

    /// 全部重试的最坏累计等待
    pub fn worst_case_wait(&self) -> Duration {
        (1..=self.max_retries).map(|n| self.delay_for(n)).sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}

/// 重试状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryState {
    /// 第 attempt 次调用后端（从 1 开始）
    Attempting { attempt: u32 },
    /// 第 attempt 次调用被限流，等待 delay 后重试
    BackingOff { attempt: u32, delay: Duration },
    Exhausted,
}

/// 单次生成的结构化结果；Agent 边界之外只以文本形式出现
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    Content(String),
    /// 非限流的后端错误，不重试
    Failed(String),
    /// 限流重试耗尽
    Overloaded,
    /// 外层超时（由编排器填入）
    TimedOut,
}

impl AgentOutcome {
    /// 转为面向用户的文本；非成功结果带统一标记
    pub fn into_text(self, category: &str) -> String {
        match self {
            AgentOutcome::Content(text) => text,
            AgentOutcome::Failed(err) => failure_marker(category, &err),
            AgentOutcome::Overloaded => overload_marker(category),
            AgentOutcome::TimedOut => timeout_marker(category),
        }
    }
}

pub fn failure_marker(category: &str, err: &str) -> String {
    format!("❌ Error in {category} agent: {err}")
}

pub fn overload_marker(category: &str) -> String {
    format!("⚠️ {category} skipped: backend overloaded (rate limit).")
}

pub fn timeout_marker(category: &str) -> String {
    format!("⚠️ {category} skipped: backend hung (timeout).")
}

/// 单个分类的生成包装：持有分类名、系统 Prompt 与该分类凭据对应的客户端
pub struct CategoryAgent {
    category: String,
    system_prompt: String,
    client: Arc<dyn LlmClient>,
    retry: RetryPolicy,
}

impl CategoryAgent {
    pub fn new(
        category: impl Into<String>,
        system_prompt: impl Into<String>,
        client: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            category: category.into(),
            system_prompt: system_prompt.into(),
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// 拼接系统 Prompt、用户画像、原始数据与输出格式要求
    pub fn build_prompt(&self, user_context: &str, raw_data: &str) -> String {
        format!(
            "{}\n\nUSER PROFILE:\n{}\n\nRAW DATA:\n{}\n\n{}",
            self.system_prompt, user_context, raw_data, OUTPUT_INSTRUCTION
        )
    }

    /// 生成并转为文本，永不返回错误
    pub async fn generate(&self, user_context: &str, raw_data: &str) -> String {
        self.generate_outcome(user_context, raw_data)
            .await
            .into_text(&self.category)
    }

    /// 驱动重试状态机，返回结构化结果
    pub async fn generate_outcome(&self, user_context: &str, raw_data: &str) -> AgentOutcome {
        let messages = [Message::user(self.build_prompt(user_context, raw_data))];
        let mut state = RetryState::Attempting { attempt: 1 };

        loop {
            state = match state {
                RetryState::Attempting { attempt } => match self.client.complete(&messages).await {
                    Ok(text) => return AgentOutcome::Content(text),
                    Err(e) if e.is_rate_limit() => {
                        if attempt > self.retry.max_retries {
                            RetryState::Exhausted
                        } else {
                            RetryState::BackingOff {
                                attempt,
                                delay: self.retry.delay_for(attempt),
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(category = %self.category, attempt, error = %e, "Generation failed");
                        return AgentOutcome::Failed(e.to_string());
                    }
                },
                RetryState::BackingOff { attempt, delay } => {
                    tracing::warn!(
                        category = %self.category,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limit hit, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Exhausted => {
                    tracing::error!(
                        category = %self.category,
                        retries = self.retry.max_retries,
                        "Rate limit retries exhausted, skipping category"
                    );
                    return AgentOutcome::Overloaded;
                }
            };
        }
    }
}

impl std::fmt::Debug for CategoryAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryAgent")
            .field("category", &self.category)
            .field("model", &self.client.model_name())
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use crate::core::LlmError;

    /// 按脚本依次返回结果，并记录每次调用的时刻
    struct ScriptedClient {
        script: Mutex<Vec<Result<String, LlmError>>>,
        calls: Mutex<Vec<Instant>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(mut script: Vec<Result<String, LlmError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.prompts
                .lock()
                .unwrap()
                .push(messages[0].content.clone());
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(LlmError::RateLimited("429".to_string())))
        }
    }

    fn agent_with(client: Arc<ScriptedClient>) -> CategoryAgent {
        CategoryAgent::new("finance", "You are a finance analyst.", client)
            .with_retry_policy(RetryPolicy::new(3, Duration::from_secs(10)))
    }

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy::new(3, Duration::from_secs(10));
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(3), Duration::from_secs(30));
        assert_eq!(policy.worst_case_wait(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let client = Arc::new(ScriptedClient::new(vec![Ok("all good".to_string())]));
        let agent = agent_with(client.clone());
        assert_eq!(agent.generate("ctx", "data").await, "all good");
        assert_eq!(client.call_times().len(), 1);

        let prompt = client.prompts.lock().unwrap()[0].clone();
        assert!(prompt.starts_with("You are a finance analyst."));
        assert!(prompt.contains("USER PROFILE:\nctx"));
        assert!(prompt.contains("RAW DATA:\ndata"));
        assert!(prompt.ends_with(OUTPUT_INSTRUCTION));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausts_with_increasing_delays() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let agent = agent_with(client.clone());

        let start = Instant::now();
        let out = agent.generate("ctx", "data").await;
        let elapsed = start.elapsed();

        assert_eq!(out, overload_marker("finance"));
        // 首次调用 + 3 次重试
        let calls = client.call_times();
        assert_eq!(calls.len(), 4);
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(30)
            ]
        );
        assert!(gaps.windows(2).all(|w| w[0] < w[1]));
        assert!(elapsed >= Duration::from_secs(60));
        assert!(elapsed < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_rate_limit() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err(LlmError::RateLimited("429".to_string())),
            Ok("recovered".to_string()),
        ]));
        let agent = agent_with(client.clone());
        let outcome = agent.generate_outcome("ctx", "data").await;
        assert_eq!(outcome, AgentOutcome::Content("recovered".to_string()));
        assert_eq!(client.call_times().len(), 2);
    }

    #[tokio::test]
    async fn test_other_error_not_retried() {
        let client = Arc::new(ScriptedClient::new(vec![Err(LlmError::ApiError(
            "invalid api key".to_string(),
        ))]));
        let agent = agent_with(client.clone());
        let out = agent.generate("ctx", "data").await;
        assert!(out.starts_with("❌ Error in finance agent"));
        assert!(out.contains("invalid api key"));
        assert_eq!(client.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let agent = CategoryAgent::new("news", "p", client.clone())
            .with_retry_policy(RetryPolicy::new(0, Duration::from_secs(10)));
        assert_eq!(agent.generate_outcome("c", "d").await, AgentOutcome::Overloaded);
        assert_eq!(client.call_times().len(), 1);
    }

    #[test]
    fn test_outcome_markers_distinct() {
        let texts = [
            AgentOutcome::Failed("x".into()).into_text("tech"),
            AgentOutcome::Overloaded.into_text("tech"),
            AgentOutcome::TimedOut.into_text("tech"),
        ];
        assert_ne!(texts[0], texts[1]);
        assert_ne!(texts[1], texts[2]);
        assert!(texts.iter().all(|t| t.contains("tech")));
    }
}
