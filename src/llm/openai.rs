//! OpenAI 兼容 API 客户端
//!
//! 直接 POST `{base_url}/chat/completions`，消息与工具 schema 使用本 crate 的 serde wire 格式；
//! 支持 OpenAI、DeepSeek、通义（DashScope 兼容模式）及自建代理。

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;
use crate::tools::ToolSchema;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI 兼容客户端：持有 HTTP client、endpoint、model 与 key
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Message,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        request_timeout_secs: u64,
    ) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// 组装请求体；工具调用补上 provider 要求的 "type": "function"
    fn build_request(&self, messages: &[Message], tools: &[ToolSchema]) -> Value {
        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                let mut v = m.to_wire();
                if let Some(calls) = v.get_mut("tool_calls").and_then(|c| c.as_array_mut()) {
                    for call in calls {
                        if let Some(obj) = call.as_object_mut() {
                            obj.insert("type".to_string(), json!("function"));
                        }
                    }
                }
                v
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": wire_messages,
            "temperature": self.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(ToolSchema::to_function_tool).collect());
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

fn classify_status(status: reqwest::StatusCode, body: String) -> LlmError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited { retry_after_ms: 0 }
    } else if status.is_server_error() {
        LlmError::Transient(format!("HTTP {}: {}", status, body))
    } else {
        LlmError::Fatal(format!("HTTP {}: {}", status, body))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<Message, LlmError> {
        let body = self.build_request(messages, tools);
        tracing::debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "llm request");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            let text = response.text().await.unwrap_or_default();
            return Err(match (classify_status(status, text), retry_after_ms) {
                (LlmError::RateLimited { .. }, Some(ms)) => LlmError::RateLimited { retry_after_ms: ms },
                (e, _) => e,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Fatal(format!("invalid response body: {}", e)))?;
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::Fatal("response has no choices".to_string()))?;

        Ok(Message::assistant_with_tool_calls(
            message.content,
            message.tool_calls.unwrap_or_default(),
        ))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolCallRequest;

    #[test]
    fn test_request_adds_function_type_and_tools() {
        let client = OpenAiClient::new(Some("http://localhost:1/v1/"), "qwen-plus", Some("k"), 5);
        let messages = vec![
            Message::system("sys"),
            Message::assistant_with_tool_calls(None, vec![ToolCallRequest::new("c1", "list_dir", "{}")]),
            Message::tool("c1", "list_dir", "src/"),
        ];
        let tools = vec![ToolSchema {
            name: "list_dir".into(),
            description: "List".into(),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }];
        let body = client.build_request(&messages, &tools);
        assert_eq!(body["messages"][1]["tool_calls"][0]["type"], "function");
        assert!(body["messages"][1].get("content").is_none());
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "list_dir");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(client.base_url, "http://localhost:1/v1");
    }

    #[test]
    fn test_request_without_tools_omits_tool_choice() {
        let client = OpenAiClient::new(None, "m", Some("k"), 5);
        let body = client.build_request(&[Message::user("hi")], &[]);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            LlmError::RateLimited { .. }
        ));
        assert!(classify_status(reqwest::StatusCode::BAD_GATEWAY, String::new()).is_retryable());
        assert!(!classify_status(reqwest::StatusCode::UNAUTHORIZED, String::new()).is_retryable());
    }
}
