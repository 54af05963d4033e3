//! Agent 错误类型
//!
//! 只有 LLM 重试耗尽（Llm）与用户取消（Cancelled）会中止一轮对话；
//! 其余工具层错误由 ToolExecutor 转成带错误标记的工具结果文本，交还给模型处理。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    Config(String),

    /// 模型调用在重试后仍失败，本轮终止
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    #[error("Invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Task {0} not found")]
    UnknownTask(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    /// 子 Agent 委派超出配置的最大深度
    #[error("Delegation depth limit reached ({0})")]
    DelegationDepthExceeded(usize),

    #[error("Plan Mode is not active")]
    PlanModeInactive,

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn invalid_arguments(tool: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }

    /// 重发同一条输入也无法恢复（鉴权、请求格式、配置错误）
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Llm(LlmError::Fatal(_)) | AgentError::Config(_))
    }
}
