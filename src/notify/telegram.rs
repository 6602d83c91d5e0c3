//! Telegram Bot API 通知器
//!
//! POST {api_base}/bot{token}/sendMessage，非 2xx 视为投递失败（由调用方决定是否重试）。

use async_trait::async_trait;
use serde::Serialize;

use crate::config::NotifySection;
use crate::core::NotifyError;
use crate::notify::Notifier;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

/// 发往单个固定会话的 Telegram 通知器
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    parse_mode: Option<String>,
}

impl TelegramNotifier {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        parse_mode: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            parse_mode,
        }
    }

    pub fn from_config(cfg: &NotifySection) -> Result<Self, NotifyError> {
        let token = cfg
            .telegram_bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| NotifyError::NotConfigured("telegram_bot_token".to_string()))?;
        let chat_id = cfg
            .telegram_chat_id
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| NotifyError::NotConfigured("telegram_chat_id".to_string()))?;
        Ok(Self::new(
            cfg.api_base.clone(),
            token,
            chat_id,
            cfg.parse_mode.clone(),
        ))
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let req = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: self.parse_mode.as_deref(),
        };

        let resp = self.client.post(self.endpoint()).json(&req).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let n = TelegramNotifier::new("https://api.telegram.org/", "123:abc", "42", None);
        assert_eq!(n.endpoint(), "https://api.telegram.org/bot123:abc/sendMessage");
    }

    #[test]
    fn test_missing_chat_id() {
        let cfg = NotifySection {
            telegram_bot_token: Some("123:abc".to_string()),
            ..NotifySection::default()
        };
        assert!(matches!(
            TelegramNotifier::from_config(&cfg),
            Err(NotifyError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_request_body() {
        let req = SendMessageRequest {
            chat_id: "42",
            text: "hi",
            parse_mode: None,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"chat_id": "42", "text": "hi"})
        );
    }
}
