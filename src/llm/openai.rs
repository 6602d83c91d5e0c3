//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；默认指向 Gemini 的 OpenAI 兼容端点。
//! 后端错误按消息内容归类为限流或普通失败，交给 Agent 决定是否重试。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;

use crate::core::LlmError;
use crate::llm::{LlmClient, Message};

/// OpenAI 兼容客户端：每个分类一个实例（各自的凭据）
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    category: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(category: &str, base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        // 关闭 async_openai 内置的指数退避：429 必须立即返回，由 Agent 按线性退避重试
        let no_retry = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        Self {
            client: Client::with_config(config).with_backoff(no_retry),
            category: category.to_string(),
            model: model.to_string(),
        }
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        messages
            .iter()
            .map(|m| {
                Ok(ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()?,
                ))
            })
            .collect()
    }
}

/// Debug 输出包含 API 错误的 type/code 字段，Display 只有 message，两者合并后再归类
fn classify_openai_error(err: &OpenAIError) -> LlmError {
    LlmError::classify(format!("{err} ({err:?})"))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(
                self.to_openai_messages(messages)
                    .map_err(|e| LlmError::ApiError(e.to_string()))?,
            )
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| classify_openai_error(&e))?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                category = %self.category,
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "Token usage"
            );
        }

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
