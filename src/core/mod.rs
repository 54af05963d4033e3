//! 核心层：错误类型、任务管理、组件构建

pub mod builder;
pub mod error;
pub mod task_manager;

pub use builder::{create_agent_builder, AgentBuilder, AgentComponents, DEFAULT_SYSTEM_PROMPT};
pub use error::AgentError;
pub use task_manager::{Task, TaskManager, TaskSpec, TaskStatus};
