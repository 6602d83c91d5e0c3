//! Mock LLM 客户端（离线演练与测试，无需 API）
//!
//! 根据分类名返回一段固定的简报文本，finance / events 分类附带提醒指令，便于本地跑通整条流水线。

use async_trait::async_trait;

use crate::core::LlmError;
use crate::llm::{LlmClient, Message};

/// Mock 客户端：按分类返回样例内容
#[derive(Debug, Clone)]
pub struct MockLlmClient {
    category: String,
}

impl MockLlmClient {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let prompt_chars = messages.iter().map(|m| m.content.chars().count()).sum::<usize>();
        let body = match self.category.as_str() {
            "finance" => "- 💡 *IMPACT*: Market pullback is a buying window.\n\
                          👉 Reminder: /remind_mua_hpg_14h00\n\
                          👉 Reminder: /remind_thanh_toan_netflix_20h00"
                .to_string(),
            "events" => "- 📅 Flash sale opens this evening.\n👉 Reminder: /remind_flash_sale_19:30"
                .to_string(),
            other => format!("- Nothing notable for {other} today."),
        };
        Ok(format!(
            "### {} (dry run)\n{}\n_prompt: {} chars_",
            self.category.to_uppercase(),
            body,
            prompt_chars
        ))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_finance_has_directive() {
        let client = MockLlmClient::new("finance");
        let out = client.complete(&[Message::user("hi")]).await.unwrap();
        assert!(out.contains("/remind_mua_hpg_14h00"));
        assert!(out.starts_with("### FINANCE"));
    }

    #[tokio::test]
    async fn test_mock_other_category() {
        let client = MockLlmClient::new("weather");
        let out = client.complete(&[Message::user("hi")]).await.unwrap();
        assert!(out.contains("Nothing notable for weather"));
        assert!(!out.contains("/remind_"));
    }
}
