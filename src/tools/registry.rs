//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 AgentBuilder 在启动时
//! 显式注册一次，之后只读并通过 Arc 共享；ToolExecutor 在调用时统一做参数解析、查找与错误转换。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentComponents, AgentError, TaskManager};
use crate::react::AgentEvent;
use crate::tools::schema::{empty_parameters, ToolSchema};

/// 当前 Agent 的可见范围：Plan Mode 与委派深度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolScope {
    pub plan_mode: bool,
    /// 根 Agent 为 0，每层子 Agent +1
    pub depth: usize,
    pub max_depth: usize,
}

impl Default for ToolScope {
    fn default() -> Self {
        Self {
            plan_mode: false,
            depth: 0,
            max_depth: 1,
        }
    }
}

impl ToolScope {
    pub fn can_delegate(&self) -> bool {
        self.depth < self.max_depth
    }
}

/// 每次工具调用显式携带的上下文句柄（替代进程级全局状态）
pub struct ToolContext<'a> {
    pub scope: ToolScope,
    /// 当前 Agent 的任务表
    pub tasks: &'a mut TaskManager,
    /// 共享组件（LLM、执行器、配置）；委派子 Agent 时需要
    pub components: Option<&'a Arc<AgentComponents>>,
    pub events: Option<&'a UnboundedSender<AgentEvent>>,
    /// 所属 Agent 的取消令牌；子 Agent 由它派生
    pub cancel: Option<CancellationToken>,
}

impl<'a> ToolContext<'a> {
    pub fn new(scope: ToolScope, tasks: &'a mut TaskManager) -> Self {
        Self {
            scope,
            tasks,
            components: None,
            events: None,
            cancel: None,
        }
    }

    pub fn with_components(mut self, components: &'a Arc<AgentComponents>) -> Self {
        self.components = Some(components);
        self
    }

    pub fn with_events(mut self, events: Option<&'a UnboundedSender<AgentEvent>>) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为已解析的 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（function calling 中的 name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        empty_parameters()
    }

    /// 在给定范围内是否向模型暴露
    fn is_visible(&self, _scope: &ToolScope) -> bool {
        true
    }

    /// 长耗时工具（如子 Agent）不受执行器的统一超时约束
    fn long_running(&self) -> bool {
        false
    }

    /// 执行工具
    async fn execute(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<String, AgentError>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// 工具注册表：按注册顺序存储 Arc<dyn Tool>，同名注册会替换旧工具
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// 查找工具；不存在时返回 ToolNotFound
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>, AgentError> {
        self.get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 当前范围内可见工具的 schema（注册顺序）
    pub fn schemas(&self, scope: &ToolScope) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .filter(|t| t.is_visible(scope))
            .map(|t| t.schema())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, bool);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn is_visible(&self, scope: &ToolScope) -> bool {
            !self.1 || scope.plan_mode
        }

        async fn execute(&self, _args: Value, _ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_lookup_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.lookup("missing").err().unwrap();
        assert!(matches!(err, AgentError::ToolNotFound(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_schemas_respect_scope_and_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Named("b_tool", false));
        registry.register(Named("a_plan", true));
        registry.register(Named("b_tool", false));
        assert_eq!(registry.len(), 2);

        let names = |scope: ToolScope| -> Vec<String> {
            registry.schemas(&scope).into_iter().map(|s| s.name).collect()
        };
        assert_eq!(names(ToolScope::default()), vec!["b_tool"]);
        assert_eq!(
            names(ToolScope { plan_mode: true, ..ToolScope::default() }),
            vec!["b_tool", "a_plan"]
        );
    }

    #[test]
    fn test_scope_delegation_limit() {
        assert!(ToolScope::default().can_delegate());
        assert!(!ToolScope { depth: 1, ..ToolScope::default() }.can_delegate());
    }
}
