//! Shell 工具：在工作目录下执行命令，禁止危险子串
//!
//! 命令命中 blocked_patterns 时直接拒绝；执行通过 sh -c / cmd /C，带超时与 tracing 审计。
//! 输出格式为 `STDOUT:` / `STDERR:` / `[Exit Code: n]`，超过上限截断。

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use crate::config::ShellSection;
use crate::core::AgentError;
use crate::tools::{args_schema, parse_args, Tool, ToolContext};

#[derive(Deserialize, JsonSchema)]
struct RunShellArgs {
    /// The shell command to execute (e.g. 'cargo test', 'ls -la')
    command: String,
}

/// Shell 工具
pub struct ShellTool {
    workspace: PathBuf,
    blocked_patterns: Vec<String>,
    timeout_secs: u64,
    max_output_chars: usize,
}

impl ShellTool {
    pub fn new(workspace: impl Into<PathBuf>, cfg: &ShellSection) -> Self {
        Self {
            workspace: workspace.into(),
            blocked_patterns: cfg.blocked_patterns.clone(),
            timeout_secs: cfg.timeout_secs.max(1),
            max_output_chars: cfg.max_output_chars,
        }
    }

    fn check_blocked(&self, command: &str) -> Result<(), AgentError> {
        if command.trim().is_empty() {
            return Err(AgentError::invalid_arguments("run_shell", "empty command"));
        }
        match self.blocked_patterns.iter().find(|p| command.contains(p.as_str())) {
            Some(p) => Err(AgentError::ToolExecutionFailed(format!(
                "Command blocked due to restricted pattern: {}",
                p
            ))),
            None => Ok(()),
        }
    }

    fn format_output(&self, stdout: &str, stderr: &str, exit_code: i32) -> String {
        let mut parts = Vec::new();
        if !stdout.is_empty() {
            parts.push(format!("STDOUT:\n{}", stdout));
        }
        if !stderr.is_empty() {
            parts.push(format!("STDERR:\n{}", stderr));
        }
        if exit_code != 0 {
            parts.push(format!("\n[Exit Code: {}]", exit_code));
        }
        let output = parts.join("\n");
        if output.is_empty() {
            return "[Command finished with no output]".to_string();
        }

        let total = output.chars().count();
        if total > self.max_output_chars {
            let head: String = output.chars().take(self.max_output_chars).collect();
            format!("{}\n... [Output Truncated, total length {} chars]", head, total)
        } else {
            output
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "run_shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace. Use this to run scripts, tests, or system tools."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<RunShellArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
        let args: RunShellArgs = parse_args(self.name(), args)?;
        let command = args.command.trim();
        self.check_blocked(command)?;

        tracing::info!(command = %command, cwd = %self.workspace.display(), "run_shell");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&self.workspace).kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output())
            .await
            .map_err(|_| {
                AgentError::ToolTimeout(format!("Command execution exceeded {} seconds", self.timeout_secs))
            })?
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Execution failed: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        Ok(self.format_output(&stdout, &stderr, exit_code))
    }
}
