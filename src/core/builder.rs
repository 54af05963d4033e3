//! Agent 构建器：统一的组件初始化逻辑
//!
//! 启动时注册一次全部工具、创建 LLM 客户端，打包成可在根 Agent 与子 Agent 之间共享的 AgentComponents。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::{ReferenceLimits, SessionConfig};
use crate::tools::{
    GlobSearchTool, GrepSearchTool, ListDirTool, PlanTaskTool, ReadFileTool, SafeFs, ShellTool,
    SubmitTaskTool, ToolExecutor, ToolRegistry, UpdateTaskStatusTool, WriteFileTool,
};

/// 默认系统提示词
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are CodeAgent, an autonomous coding assistant working inside the user's project. \
Use the available tools to read, search and modify files and to run commands. \
Inspect before you change things, keep edits minimal, and verify your work when you can. \
When the task is done, reply with a concise summary of what you did.";

/// Agent 构建器
pub struct AgentBuilder {
    config: AppConfig,
    workspace: PathBuf,
    system_prompt: String,
}

impl AgentBuilder {
    pub fn new(config: AppConfig, workspace: PathBuf) -> Self {
        let system_prompt = config
            .app
            .system_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        Self {
            config,
            workspace,
            system_prompt,
        }
    }

    /// 设置系统提示词
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// 工具注册表：文件、搜索、Shell、计划、委派
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let fs = SafeFs::new(&self.workspace);
        let mut tools = ToolRegistry::new();

        tools.register(ReadFileTool::new(fs.clone()));
        tools.register(WriteFileTool::new(fs.clone()));
        tools.register(ListDirTool::new(fs.clone()));
        tools.register(GrepSearchTool::new(fs.clone()));
        tools.register(GlobSearchTool::new(fs));
        tools.register(ShellTool::new(&self.workspace, &self.config.tools.shell));
        tools.register(PlanTaskTool);
        tools.register(UpdateTaskStatusTool);
        tools.register(SubmitTaskTool);

        tracing::debug!(tools = ?tools.tool_names(), "tool registry built");
        tools
    }

    /// 构建 LLM 客户端
    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        create_llm_from_config(&self.config)
    }

    /// 用配置中的后端构建完整组件
    pub fn build_components(&self) -> Arc<AgentComponents> {
        self.build_components_with_llm(self.build_llm())
    }

    /// 用外部提供的 LLM 客户端构建组件（测试 / 嵌入场景）
    pub fn build_components_with_llm(&self, llm: Arc<dyn LlmClient>) -> Arc<AgentComponents> {
        let tools = self.build_tool_registry();
        Arc::new(AgentComponents {
            llm,
            executor: ToolExecutor::new(Arc::new(tools), self.config.tools.tool_timeout_secs),
            system_prompt: self.system_prompt.clone(),
            session_config: self.config.session.to_session_config(),
            reference_limits: self.config.tools.reference.to_limits(),
            workspace: self.workspace.clone(),
            max_steps: self.config.app.max_steps,
            max_delegation_depth: self.config.app.max_delegation_depth,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

/// 预构建的 Agent 组件：根 Agent 与所有子 Agent 共享
pub struct AgentComponents {
    pub llm: Arc<dyn LlmClient>,
    pub executor: ToolExecutor,
    pub system_prompt: String,
    pub session_config: SessionConfig,
    pub reference_limits: ReferenceLimits,
    pub workspace: PathBuf,
    /// 单轮对话内最多调用模型的次数
    pub max_steps: usize,
    pub max_delegation_depth: usize,
}

/// 便捷函数：加载配置并确定工作目录后创建 AgentBuilder
pub fn create_agent_builder(config_path: Option<PathBuf>) -> Result<AgentBuilder, crate::core::AgentError> {
    let config = crate::config::load_config(config_path)
        .map_err(|e| crate::core::AgentError::Config(e.to_string()))?;

    let workspace = match config.app.workspace_root.clone() {
        Some(root) => root,
        None => std::env::current_dir()
            .map_err(|e| crate::core::AgentError::Config(format!("cannot determine current dir: {}", e)))?,
    };
    if !workspace.is_dir() {
        return Err(crate::core::AgentError::Config(format!(
            "workspace root {} is not a directory",
            workspace.display()
        )));
    }
    let workspace = workspace.canonicalize().unwrap_or(workspace);

    Ok(AgentBuilder::new(config, workspace))
}
