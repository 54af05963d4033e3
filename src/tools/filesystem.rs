//! 沙箱文件系统工具
//!
//! SafeFs 绑定工作目录，所有路径必须落在根目录下（禁止 ../ 与绝对路径逃逸）；
//! read_file / write_file / list_dir 三个工具都经由 SafeFs 访问磁盘。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::{args_schema, parse_args, Tool, ToolContext};

/// 沙箱文件系统：绑定根目录，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 词法规整：拼到根目录下并消解 `.` / `..`，越过根目录即视为逃逸
    fn normalize(&self, path: &str) -> Result<PathBuf, AgentError> {
        let raw = Path::new(path.trim());
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root_dir.join(raw)
        };
        let mut out = PathBuf::new();
        for comp in joined.components() {
            match comp {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !out.pop() {
                        return Err(AgentError::PathEscape(path.to_string()));
                    }
                }
                other => out.push(other.as_os_str()),
            }
        }
        if out.starts_with(&self.root_dir) {
            Ok(out)
        } else {
            Err(AgentError::PathEscape(path.to_string())) // 如 ../../etc/passwd
        }
    }

    /// 已存在路径：规整后再 canonicalize，防止符号链接指向根外
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let full = self.normalize(path)?;
        let canonical = full
            .canonicalize()
            .map_err(|_| AgentError::ToolExecutionFailed(format!("Path not found: {}", path)))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(AgentError::PathEscape(path.to_string()))
        }
    }

    /// 相对根目录的显示路径
    pub fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    pub fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        if resolved.is_dir() {
            return Err(AgentError::ToolExecutionFailed(format!("{} is a directory", path)));
        }
        std::fs::read_to_string(&resolved)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Read failed: {}", e)))
    }

    /// 写文件（覆盖），自动创建父目录；返回写入的字节数
    ///
    /// 创建任何目录前先确认最深的已存在祖先在根目录内；目标本身是符号链接时拒绝写入。
    pub fn write_file(&self, path: &str, content: &str) -> Result<usize, AgentError> {
        let target = self.normalize(path)?;
        if target == self.root_dir {
            return Err(AgentError::ToolExecutionFailed("Cannot write to the workspace root".into()));
        }
        let escape = || AgentError::PathEscape(path.to_string());

        let mut ancestor = target.as_path();
        while std::fs::symlink_metadata(ancestor).is_err() {
            ancestor = ancestor.parent().ok_or_else(escape)?;
        }
        let ancestor_canon = ancestor.canonicalize().map_err(|_| escape())?;
        if !ancestor_canon.starts_with(&self.root_dir) {
            return Err(escape());
        }

        if let Ok(meta) = std::fs::symlink_metadata(&target) {
            if meta.file_type().is_symlink() {
                return Err(escape());
            }
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::ToolExecutionFailed(format!("Create dir failed: {}", e)))?;
        }
        std::fs::write(&target, content)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Write failed: {}", e)))?;
        Ok(content.len())
    }

    /// 列目录：目录在前加 [DIR]，文件加 [FILE]，按名称排序
    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, AgentError> {
        let base = if path.trim().is_empty() || path.trim() == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        if !base.is_dir() {
            return Err(AgentError::ToolExecutionFailed(format!("Not a directory: {}", path)));
        }
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&base)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("List failed: {}", e)))?
        {
            let entry = entry.map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                dirs.push(format!("[DIR] {}", name));
            } else {
                files.push(format!("[FILE] {}", name));
            }
        }
        dirs.sort();
        files.sort();
        dirs.extend(files);
        Ok(dirs)
    }
}

#[derive(Deserialize, JsonSchema)]
struct ReadFileArgs {
    /// Path to the file to read, relative to the workspace
    path: String,
}

/// 读取文件内容
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read contents of a file in the workspace."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ReadFileArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
        let args: ReadFileArgs = parse_args(self.name(), args)?;
        tracing::info!(path = %args.path, "read_file");
        self.fs.read_file(&args.path)
    }
}

#[derive(Deserialize, JsonSchema)]
struct WriteFileArgs {
    /// Path to the file to write, relative to the workspace
    path: String,
    /// Content to write to the file
    content: String,
}

/// 写文件（覆盖已有内容）
pub struct WriteFileTool {
    fs: SafeFs,
}

impl WriteFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Overwrites if it exists; parent directories are created."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<WriteFileArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
        let args: WriteFileArgs = parse_args(self.name(), args)?;
        tracing::info!(path = %args.path, bytes = args.content.len(), "write_file");
        let bytes = self.fs.write_file(&args.path, &args.content)?;
        Ok(format!("Successfully wrote {} bytes to {}", bytes, args.path))
    }
}

fn default_dir() -> String {
    ".".to_string()
}

#[derive(Deserialize, JsonSchema)]
struct ListDirArgs {
    /// Directory path to list
    #[serde(default = "default_dir")]
    path: String,
}

/// 列出目录
pub struct ListDirTool {
    fs: SafeFs,
}

impl ListDirTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List files and directories in a given path."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ListDirArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
        let args: ListDirArgs = parse_args(self.name(), args)?;
        let entries = self.fs.list_dir(&args.path)?;
        if entries.is_empty() {
            return Ok("(empty directory)".to_string());
        }
        Ok(entries.join("\n"))
    }
}
