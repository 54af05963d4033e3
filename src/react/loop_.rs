//! Think-Act-Observe 主循环
//!
//! 每步：尝试压缩上下文 -> 带可见工具 schema 调用模型 -> 有工具调用则按序执行、逐条写回工具消息并继续；
//! 无工具调用则以文本作为最终回复结束本轮。支持取消与最大步数限制。
//! Plan Mode 下，带 task_id 的 submit_task 结果会自动回写任务状态，并附上下一个可执行任务与计划全貌。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentComponents, AgentError, TaskManager, TaskStatus};
use crate::memory::{CompactionOutcome, Message, Session, ToolCallRequest};
use crate::react::events::{send_event, AgentEvent};
use crate::tools::{delegated_task_id, ToolContext, ToolResult, ToolScope, SUBMIT_TASK};

/// Plan Mode 追加到系统提示的说明
const PLAN_MODE_PROMPT: &str = "\n\n## Plan Mode\n\
You are in Plan Mode. First break the request into tasks with `plan_task` \
(each task has an id, a description and the ids it depends on). \
Then work through the plan: delegate each eligible task with `submit_task`, passing its `task_id`, \
or record progress yourself with `update_task_status`. \
After each delegated task you will be told which task is eligible next and the status of the whole plan. \
When every task is completed or failed, reply with a short summary.";

/// 子 Agent 的系统提示
fn sub_agent_prompt(goal: &str) -> String {
    format!(
        "You are a sub-agent working on a specific task: {}\n\
         Use the available tools to complete the task.\n\
         When finished, reply with a concise summary of what you did and what you found.",
        goal.trim()
    )
}

/// 一个 Agent 实例：独占 Session 与任务表，共享 AgentComponents
pub struct AgentLoop {
    components: Arc<AgentComponents>,
    session: Session,
    tasks: TaskManager,
    scope: ToolScope,
    cancel: CancellationToken,
}

impl AgentLoop {
    /// 根 Agent（深度 0）
    pub fn new(components: Arc<AgentComponents>, plan_mode: bool) -> Self {
        let mut prompt = components.system_prompt.clone();
        if plan_mode {
            prompt.push_str(PLAN_MODE_PROMPT);
        }
        let session = Session::new(prompt, components.session_config)
            .with_workspace(&components.workspace, components.reference_limits);
        let scope = ToolScope {
            plan_mode,
            depth: 0,
            max_depth: components.max_delegation_depth,
        };
        Self {
            components,
            session,
            tasks: TaskManager::new(),
            scope,
            cancel: CancellationToken::new(),
        }
    }

    /// 子 Agent：系统提示点明目标，可选的上下文摘要放在系统提示之后；Plan Mode 关闭
    pub fn sub_agent(
        components: Arc<AgentComponents>,
        depth: usize,
        goal: &str,
        context_summary: Option<&str>,
    ) -> Self {
        let mut session = Session::new(sub_agent_prompt(goal), components.session_config)
            .with_workspace(&components.workspace, components.reference_limits);
        if let Some(summary) = context_summary.filter(|s| !s.trim().is_empty()) {
            session = session.with_context_summary(summary);
        }
        let scope = ToolScope {
            plan_mode: false,
            depth,
            max_depth: components.max_delegation_depth,
        };
        Self {
            components,
            session,
            tasks: TaskManager::new(),
            scope,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 上一轮被取消后换新令牌，以便继续对话
    pub fn renew_cancel_token(&mut self) {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    pub fn scope(&self) -> ToolScope {
        self.scope
    }

    /// 清空会话历史与任务表（保留系统提示）
    pub fn reset(&mut self) {
        self.session.clear();
        self.tasks = TaskManager::new();
    }

    /// 处理一条用户输入，直到模型给出不带工具调用的回复
    ///
    /// 只有模型调用失败（重试耗尽）与取消会返回 Err；工具层错误都作为工具结果交还模型。
    pub async fn run(
        &mut self,
        input: &str,
        events: Option<&UnboundedSender<AgentEvent>>,
    ) -> Result<String, AgentError> {
        let content = match self.session.resolve_reference(input) {
            Some(block) => format!("{}\n\n{}", input, block),
            None => input.to_string(),
        };
        self.session.add(Message::user(content));

        let max_steps = self.components.max_steps.max(1);
        let mut last_text = String::new();

        for step in 0..max_steps {
            if self.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            if let CompactionOutcome::Compacted { removed } =
                self.session.compress(self.components.llm.as_ref()).await
            {
                send_event(events, AgentEvent::Compacted { removed });
            }

            let schemas = self.components.executor.schemas(&self.scope);
            tracing::debug!(step, depth = self.scope.depth, tools = schemas.len(), "calling model");
            let response = tokio::select! {
                _ = self.cancel.cancelled() => return Err(AgentError::Cancelled),
                r = self.components.llm.chat(self.session.messages(), &schemas) => r?,
            };

            let calls = response.tool_calls().to_vec();
            last_text = response.text().to_string();
            self.session.add(response);

            if calls.is_empty() {
                send_event(events, AgentEvent::Answer { text: last_text.clone() });
                return Ok(last_text);
            }

            send_event(
                events,
                AgentEvent::DispatchStarted {
                    count: calls.len(),
                    names: calls.iter().map(|c| c.name().to_string()).collect(),
                },
            );
            self.mark_delegations_started(&calls);

            let results = {
                let mut ctx = ToolContext::new(self.scope, &mut self.tasks)
                    .with_components(&self.components)
                    .with_events(events)
                    .with_cancel(self.cancel.clone());
                self.components.executor.execute(&calls, &mut ctx).await
            };

            for (call, result) in calls.iter().zip(results) {
                let content = self.observe(call, &result);
                self.session
                    .add(Message::tool(result.tool_call_id, result.name, content));
            }
        }

        tracing::warn!(max_steps, depth = self.scope.depth, "step limit reached without a final answer");
        let notice = if last_text.trim().is_empty() {
            format!("Stopped after reaching the step limit ({}) without a final answer.", max_steps)
        } else {
            format!(
                "Stopped after reaching the step limit ({}). Last output:\n{}",
                max_steps, last_text
            )
        };
        send_event(events, AgentEvent::Answer { text: notice.clone() });
        Ok(notice)
    }

    /// 带已登记 task_id 的委派调用先标记为 in_progress
    fn mark_delegations_started(&mut self, calls: &[ToolCallRequest]) {
        for call in calls.iter().filter(|c| c.name() == SUBMIT_TASK) {
            if let Some(id) = delegated_task_id(&call.function.arguments) {
                if self.tasks.get_task(&id).is_some() {
                    let _ = self.tasks.update_task(&id, TaskStatus::InProgress, None, None);
                }
            }
        }
    }

    /// 生成写回历史的工具消息内容：委派结果回写任务状态，并附下一个可执行任务与计划全貌
    fn observe(&mut self, call: &ToolCallRequest, result: &ToolResult) -> String {
        if call.name() != SUBMIT_TASK {
            return result.content.clone();
        }
        let Some(task_id) = delegated_task_id(&call.function.arguments) else {
            return result.content.clone();
        };
        if self.tasks.get_task(&task_id).is_none() {
            return result.content.clone();
        }

        let update = if result.is_error() {
            self.tasks
                .update_task(&task_id, TaskStatus::Failed, None, Some(result.content.clone()))
        } else {
            self.tasks
                .update_task(&task_id, TaskStatus::Completed, Some(result.content.clone()), None)
        };
        if let Err(e) = update {
            tracing::warn!(task = %task_id, error = %e, "failed to record delegated task outcome");
        }

        let hint = match self.tasks.get_next_task() {
            Some(next) => format!("Next eligible task: {} - {}", next.id, next.description),
            None => "No eligible task remaining.".to_string(),
        };
        format!(
            "{}\n\n[Plan] {}\n{}",
            result.content,
            hint,
            self.tasks.plan_summary()
        )
    }
}
