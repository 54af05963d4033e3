//! 子 Agent 委派工具：submit_task
//!
//! 为目标新建独立的 AgentLoop + Session（Plan Mode 强制关闭，深度 +1），同步跑完后把最终文本
//! 作为工具结果返回。子 Agent 的任何失败都转成带错误标记的结果文本，不向上传播。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::react::AgentLoop;
use crate::tools::{args_schema, parse_args, Tool, ToolContext, ToolScope, ERROR_MARKER};

pub const SUBMIT_TASK: &str = "submit_task";

#[derive(Deserialize, JsonSchema)]
pub(crate) struct SubmitTaskArgs {
    /// The goal or task description for the sub-agent
    pub goal: String,
    /// Summary of what is already known, passed to the sub-agent as context
    pub context_summary: Option<String>,
    /// Files or other resources the sub-agent should look at
    #[serde(default)]
    pub resources: Vec<String>,
    /// Hints on how to approach the task
    #[serde(default)]
    pub hints: Vec<String>,
    /// ID of the plan task this delegation fulfils (Plan Mode)
    pub task_id: Option<String>,
}

impl SubmitTaskArgs {
    /// 目标 + 资源 + 提示，拼成子 Agent 的首条用户消息
    fn to_goal_message(&self) -> String {
        let mut out = self.goal.trim().to_string();
        if !self.resources.is_empty() {
            out.push_str("\n\nRelevant resources:");
            for r in &self.resources {
                out.push_str(&format!("\n- {}", r));
            }
        }
        if !self.hints.is_empty() {
            out.push_str("\n\nHints:");
            for h in &self.hints {
                out.push_str(&format!("\n- {}", h));
            }
        }
        out
    }
}

/// 从 submit_task 的原始参数中取出 task_id（解析失败视为无）
pub fn delegated_task_id(arguments: &str) -> Option<String> {
    serde_json::from_str::<Value>(arguments)
        .ok()?
        .get("task_id")?
        .as_str()
        .map(str::to_string)
}

/// 委派工具
pub struct SubmitTaskTool;

#[async_trait]
impl Tool for SubmitTaskTool {
    fn name(&self) -> &str {
        SUBMIT_TASK
    }

    fn description(&self) -> &str {
        "Delegate a self-contained task to a sub-agent. The sub-agent works independently with the same tools \
         and returns its final answer. Pass task_id when the task belongs to the current plan."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SubmitTaskArgs>()
    }

    fn is_visible(&self, scope: &ToolScope) -> bool {
        scope.can_delegate()
    }

    fn long_running(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
        if !ctx.scope.can_delegate() {
            return Err(AgentError::DelegationDepthExceeded(ctx.scope.max_depth));
        }
        let args: SubmitTaskArgs = parse_args(self.name(), args)?;
        let components = ctx
            .components
            .cloned()
            .ok_or_else(|| AgentError::ToolExecutionFailed("sub-agent runtime is not available".into()))?;

        let depth = ctx.scope.depth + 1;
        tracing::info!(depth, goal = %args.goal, task_id = ?args.task_id, "delegating to sub-agent");

        let mut child = AgentLoop::sub_agent(components, depth, &args.goal, args.context_summary.as_deref());
        if let Some(parent) = &ctx.cancel {
            child = child.with_cancel_token(parent.child_token());
        }

        match child.run(&args.to_goal_message(), None).await {
            Ok(text) if text.trim().is_empty() => Ok("Task completed (no output).".to_string()),
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::warn!(depth, error = %e, "sub-agent failed");
                Ok(format!("{} sub-agent failed: {}", ERROR_MARKER, e))
            }
        }
    }
}
