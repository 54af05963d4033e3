//! 工具执行器
//!
//! 按输入顺序逐个处理工具调用：解析参数 → 查找工具 → 调用（带超时）；任何失败都转成以
//! `Error:` 开头的结果文本。保证每个调用恰好一个结果、顺序一致，执行器本身从不返回错误。
//! 每次调用输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::memory::ToolCallRequest;
use crate::react::AgentEvent;
use crate::tools::{Tool, ToolContext, ToolRegistry, ToolSchema, ToolScope};

/// 失败结果的前缀标记
pub const ERROR_MARKER: &str = "Error:";

/// 单个工具调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
}

impl ToolResult {
    fn from_outcome(call: &ToolCallRequest, outcome: Result<String, AgentError>) -> Self {
        let content = match outcome {
            Ok(content) => content,
            Err(e) => format!("{} {}", ERROR_MARKER, e),
        };
        Self {
            tool_call_id: call.id.clone(),
            name: call.function.name.clone(),
            content,
        }
    }

    /// 以错误标记开头即视为失败
    pub fn is_error(&self) -> bool {
        self.content.starts_with(ERROR_MARKER)
    }
}

/// 工具执行器：持有共享注册表与统一超时
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn schemas(&self, scope: &ToolScope) -> Vec<ToolSchema> {
        self.registry.schemas(scope)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 依次执行整批调用；每完成一个即通过 ctx.events 推送 ToolOutput
    pub async fn execute(&self, calls: &[ToolCallRequest], ctx: &mut ToolContext<'_>) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.execute_one(call, ctx).await;
            if let Some(tx) = ctx.events {
                let _ = tx.send(AgentEvent::ToolOutput {
                    tool_call_id: result.tool_call_id.clone(),
                    name: result.name.clone(),
                    content: result.content.clone(),
                });
            }
            results.push(result);
        }
        results
    }

    /// 执行单个调用并输出审计日志
    pub async fn execute_one(&self, call: &ToolCallRequest, ctx: &mut ToolContext<'_>) -> ToolResult {
        let start = Instant::now();
        let outcome = self.invoke(call, ctx).await;

        let outcome_label = match &outcome {
            Ok(_) => "ok",
            Err(AgentError::ToolTimeout(_)) => "timeout",
            Err(AgentError::ToolNotFound(_)) => "not_found",
            Err(AgentError::InvalidArguments { .. }) => "invalid_arguments",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.function.name,
            "call_id": call.id,
            "ok": outcome.is_ok(),
            "outcome": outcome_label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.function.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        ToolResult::from_outcome(call, outcome)
    }

    async fn invoke(&self, call: &ToolCallRequest, ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
        let args = parse_arguments(call)?;
        let tool = self.registry.lookup(call.name())?;
        let name = call.name();

        let run = AssertUnwindSafe(tool.execute(args, ctx)).catch_unwind();
        let joined = if tool.long_running() {
            run.await
        } else {
            timeout(self.timeout, run)
                .await
                .map_err(|_| AgentError::ToolTimeout(format!("{} exceeded {}s", name, self.timeout.as_secs())))?
        };
        joined.unwrap_or_else(|_| Err(AgentError::ToolExecutionFailed(format!("{} panicked", name))))
    }
}

/// 解析 JSON 编码的参数；空串视为 {}，非对象视为非法
fn parse_arguments(call: &ToolCallRequest) -> Result<Value, AgentError> {
    let raw = call.function.arguments.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AgentError::invalid_arguments(call.name(), format!("malformed JSON ({}): {}", e, raw)))?;
    if !value.is_object() {
        return Err(AgentError::invalid_arguments(call.name(), "arguments must be a JSON object"));
    }
    Ok(value)
}

fn args_preview(args: &str) -> String {
    if args.chars().count() > 200 {
        format!("{}...", args.chars().take(200).collect::<String>())
    } else {
        args.to_string()
    }
}
