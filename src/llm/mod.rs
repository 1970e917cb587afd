//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use deepseek::{create_deepseek_client, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use traits::LlmClient;

use crate::config::LlmSection;
use crate::core::ChainError;

/// 按 [llm] 配置创建客户端
///
/// mock 后端没有预置回复，任何调用都会失败：规划走兜底工具（若配置），综合走模板。
pub fn create_llm_client(section: &LlmSection) -> Result<Arc<dyn LlmClient>, ChainError> {
    let api_key = std::env::var(&section.api_key_env).ok();
    let timeout = Duration::from_secs(section.timeouts.request);

    let client: Arc<dyn LlmClient> = match section.provider.as_str() {
        "mock" => Arc::new(MockLlmClient::new()),
        "deepseek" => Arc::new(
            create_deepseek_client(Some(&section.model), api_key.as_deref())
                .with_request_timeout(timeout),
        ),
        "openai" => Arc::new(
            OpenAiClient::new(section.base_url.as_deref(), &section.model, api_key.as_deref())
                .with_request_timeout(timeout),
        ),
        other => {
            return Err(ChainError::Config(format!("unknown llm provider: {other}")));
        }
    };

    tracing::info!(provider = %section.provider, model = %section.model, "llm client created");
    Ok(client)
}
