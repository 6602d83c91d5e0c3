//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容端点 / Mock）实现 LlmClient::complete（非流式）。
//! 错误统一为 LlmError，限流类错误由 Agent 层退避重试。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::LlmError;

/// 单条用户消息；分类 Prompt 整体作为一条 user 消息发送
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条候选的文本
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 后端/模型名，用于日志
    fn model_name(&self) -> &str {
        "unknown"
    }
}
