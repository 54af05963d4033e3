//! Plan Mode 任务工具：plan_task / update_task_status
//!
//! 只在 Plan Mode 下对模型可见；非 Plan Mode 下被调用时返回 PlanModeInactive。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::{AgentError, TaskSpec, TaskStatus};
use crate::tools::{args_schema, parse_args, Tool, ToolContext, ToolScope};

#[derive(Deserialize, JsonSchema)]
struct PlanTaskArgs {
    /// List of tasks that make up the plan
    tasks: Vec<TaskSpec>,
}

/// 创建（整体替换）当前计划
pub struct PlanTaskTool;

#[async_trait]
impl Tool for PlanTaskTool {
    fn name(&self) -> &str {
        "plan_task"
    }

    fn description(&self) -> &str {
        "Create or overwrite the current task plan. Tasks run in declaration order once their dependencies are completed."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<PlanTaskArgs>()
    }

    fn is_visible(&self, scope: &ToolScope) -> bool {
        scope.plan_mode
    }

    async fn execute(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
        if !ctx.scope.plan_mode {
            return Err(AgentError::PlanModeInactive);
        }
        let args: PlanTaskArgs = parse_args(self.name(), args)?;
        let count = args.tasks.len();
        ctx.tasks.create_plan(args.tasks);
        tracing::info!(tasks = count, "plan created");
        Ok(format!("Plan created successfully.\n{}", ctx.tasks.plan_summary()))
    }
}

#[derive(Deserialize, JsonSchema)]
struct UpdateTaskArgs {
    /// ID of the task to update
    task_id: String,
    /// New status of the task
    status: TaskStatus,
    /// Summary of the result
    result: Option<String>,
    /// Error message if failed
    error: Option<String>,
}

/// 更新单个任务状态
pub struct UpdateTaskStatusTool;

#[async_trait]
impl Tool for UpdateTaskStatusTool {
    fn name(&self) -> &str {
        "update_task_status"
    }

    fn description(&self) -> &str {
        "Update the status of a task in the current plan, optionally recording a result or error."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<UpdateTaskArgs>()
    }

    fn is_visible(&self, scope: &ToolScope) -> bool {
        scope.plan_mode
    }

    async fn execute(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
        if !ctx.scope.plan_mode {
            return Err(AgentError::PlanModeInactive);
        }
        let args: UpdateTaskArgs = parse_args(self.name(), args)?;
        ctx.tasks
            .update_task(&args.task_id, args.status, args.result, args.error)?;
        Ok(format!(
            "Task {} updated to {}.\n{}",
            args.task_id,
            args.status.as_str(),
            ctx.tasks.plan_summary()
        ))
    }
}
