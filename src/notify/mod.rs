//! 通知投递：固定目标会话的文本发送
//!
//! 消息格式化与分段由外部渲染器负责，这里只负责把一段文本送达并报告成败。

pub mod telegram;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::NotifySection;
use crate::core::NotifyError;

pub use telegram::TelegramNotifier;

/// 通知发送接口
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;

    fn name(&self) -> &'static str;
}

/// 只写日志的通知器（离线演练或未配置 Telegram 时使用）
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!(chars = text.chars().count(), "[notify] {}", text);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// 根据配置选择通知器：bot token 与 chat id 齐全时走 Telegram，否则退回日志
pub fn create_notifier(cfg: &NotifySection) -> Arc<dyn Notifier> {
    match TelegramNotifier::from_config(cfg) {
        Ok(notifier) => Arc::new(notifier),
        Err(e) => {
            tracing::warn!(error = %e, "Telegram not configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    }
}

/// 提醒投递用的通知器：必须是真实通道
///
/// 日志通知器总是成功，会让 Worker 把未送达的提醒标记为 sent，所以这里不做回退。
pub fn create_delivery_notifier(cfg: &NotifySection) -> Result<Arc<dyn Notifier>, NotifyError> {
    Ok(Arc::new(TelegramNotifier::from_config(cfg)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        assert!(LogNotifier.send("hello").await.is_ok());
    }

    #[test]
    fn test_unconfigured_falls_back_to_log() {
        let notifier = create_notifier(&NotifySection::default());
        assert_eq!(notifier.name(), "log");
    }

    #[test]
    fn test_configured_uses_telegram() {
        let cfg = NotifySection {
            telegram_bot_token: Some("123:abc".to_string()),
            telegram_chat_id: Some("42".to_string()),
            ..NotifySection::default()
        };
        assert_eq!(create_notifier(&cfg).name(), "telegram");
    }

    #[test]
    fn test_delivery_notifier_requires_telegram() {
        assert!(matches!(
            create_delivery_notifier(&NotifySection::default()),
            Err(NotifyError::NotConfigured(_))
        ));

        let cfg = NotifySection {
            telegram_bot_token: Some("123:abc".to_string()),
            telegram_chat_id: Some("42".to_string()),
            ..NotifySection::default()
        };
        assert_eq!(create_delivery_notifier(&cfg).unwrap().name(), "telegram");
    }
}
