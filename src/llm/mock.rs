//! Mock / Scripted LLM 客户端（用于离线运行与测试，无需 API）
//!
//! MockLlmClient 回显最后一条 user 消息；ScriptedLlmClient 按顺序回放预设结果并记录每次请求。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};
use crate::tools::ToolSchema;

/// Mock 客户端：回显用户最后一条消息，作为最终回答
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(&self, messages: &[Message], _tools: &[ToolSchema]) -> Result<Message, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or("(no input)");
        Ok(Message::assistant(format!("Echo from Mock: {}", last_user)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 一次被记录的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// 脚本客户端：依次弹出预设的响应；脚本耗尽后返回 Fatal
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<Message, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Result<Message, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 便捷构造：全部为成功响应
    pub fn replies(messages: Vec<Message>) -> Self {
        Self::new(messages.into_iter().map(Ok).collect())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<Message, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }
        self.script
            .lock()
            .map_err(|e| LlmError::Fatal(e.to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Fatal("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
