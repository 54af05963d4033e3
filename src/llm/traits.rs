//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / Scripted）实现 LlmClient::chat：输入完整历史与工具 schema，
//! 返回一条 assistant 消息（文本或工具调用）。RetryingLlmClient 对瞬时错误做指数退避重试。

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::memory::Message;
use crate::tools::ToolSchema;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 网络抖动、5xx 等，可重试
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    /// 鉴权失败、请求格式错误等，不可重试
    #[error("provider error: {0}")]
    Fatal(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Transient(_) | LlmError::RateLimited { .. })
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 一次 chat completion；tools 为空表示不允许工具调用
    async fn chat(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<Message, LlmError>;

    /// 后端名称（日志用）
    fn name(&self) -> &str {
        "llm"
    }
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for std::sync::Arc<T> {
    async fn chat(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<Message, LlmError> {
        (**self).chat(messages, tools).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// [llm.retry] 段：重试次数与退避区间
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 总尝试次数（含首次）
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次失败后的等待时间（attempt 从 1 开始），按 2 的幂增长并截断到上限
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

/// 重试装饰器：仅对可重试错误退避重试，达到次数上限后返回最后一次错误
pub struct RetryingLlmClient<C> {
    inner: C,
    config: RetryConfig,
}

impl<C: LlmClient> RetryingLlmClient<C> {
    pub fn new(inner: C, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for RetryingLlmClient<C> {
    async fn chat(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<Message, LlmError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.chat(messages, tools).await {
                Ok(msg) => return Ok(msg),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let mut wait = self.config.backoff(attempt);
                    if let LlmError::RateLimited { retry_after_ms } = &e {
                        wait = wait.max(Duration::from_millis(*retry_after_ms));
                    }
                    tracing::warn!(
                        backend = %self.inner.name(),
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "llm call failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    tracing::error!(backend = %self.inner.name(), attempt, error = %e, "llm call failed");
                    return Err(e);
                }
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
