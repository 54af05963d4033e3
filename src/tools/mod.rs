pub mod agent;
pub mod executor;
pub mod filesystem;
pub mod registry;
pub mod schema;
pub mod search;
pub mod shell;
pub mod task;

pub use agent::{delegated_task_id, SubmitTaskTool, SUBMIT_TASK};
pub use executor::{ToolExecutor, ToolResult, ERROR_MARKER};
pub use filesystem::{ListDirTool, ReadFileTool, SafeFs, WriteFileTool};
pub use registry::{Tool, ToolContext, ToolRegistry, ToolScope};
pub use schema::{args_schema, empty_parameters, parse_args, ToolSchema};
pub use search::{GlobSearchTool, GrepSearchTool};
pub use shell::ShellTool;
pub use task::{PlanTaskTool, UpdateTaskStatusTool};
