//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::{MockLlmClient, RecordedRequest, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmError, RetryConfig, RetryingLlmClient};

use crate::config::AppConfig;

/// 按 [llm] 配置创建客户端：provider = "mock" 时离线回显，其它一律走 OpenAI 兼容端点；外层套重试
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let llm = &cfg.llm;
    match llm.provider.as_str() {
        "mock" => {
            tracing::info!("using mock llm backend");
            Arc::new(MockLlmClient)
        }
        provider => {
            tracing::info!(provider = %provider, model = %llm.model, "using openai-compatible backend");
            let client = OpenAiClient::new(
                llm.base_url.as_deref(),
                &llm.model,
                llm.api_key.as_deref(),
                llm.request_timeout_secs,
            )
            .with_temperature(llm.temperature);
            Arc::new(RetryingLlmClient::new(client, llm.retry.clone()))
        }
    }
}
