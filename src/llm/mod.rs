//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock），以及按分类构造客户端

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::LlmSection;

pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use traits::{LlmClient, Message};

/// 为某个分类创建 LLM 客户端；provider 为 mock 时走离线 Mock，否则需要该分类的凭据
///
/// 没有任何可用凭据时返回 None，调用方跳过该分类。
pub fn create_client_for_category(llm: &LlmSection, category: &str) -> Option<Arc<dyn LlmClient>> {
    if llm.provider.eq_ignore_ascii_case("mock") {
        return Some(Arc::new(MockLlmClient::new(category)));
    }

    let api_key = llm.key_for(category)?;
    Some(Arc::new(OpenAiClient::new(
        category,
        llm.base_url.as_deref(),
        &llm.model,
        &api_key,
    )))
}
