//! 代码搜索工具：grep_search（子串匹配）与 glob_search（路径模式）
//!
//! 两者都限定在工作目录内，结果最多 100 条，超出时追加截断说明。

use std::path::Path;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::filesystem::SafeFs;
use crate::tools::{args_schema, parse_args, Tool, ToolContext};

/// 单次搜索返回的最大条数
const MAX_RESULTS: usize = 100;
/// 匹配行展示的最大字符数
const MAX_LINE_CHARS: usize = 200;
/// 超过该大小的文件不做内容搜索
const MAX_FILE_SIZE: u64 = 1024 * 1024;

fn default_root() -> String {
    ".".to_string()
}

fn default_exclude_dirs() -> Vec<String> {
    [".git", "target", "node_modules", "__pycache__", ".venv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Deserialize, JsonSchema)]
struct GrepArgs {
    /// String pattern to search for
    pattern: String,
    /// Directory to search in (default: workspace root)
    #[serde(default = "default_root")]
    path: String,
    /// Whether the search should be case sensitive
    #[serde(default)]
    case_sensitive: bool,
    /// Directory names to skip
    #[serde(default = "default_exclude_dirs")]
    exclude_dirs: Vec<String>,
}

/// 递归子串搜索，输出 `path:line: text`
pub struct GrepSearchTool {
    fs: SafeFs,
}

impl GrepSearchTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }

    fn search(&self, args: &GrepArgs) -> Result<String, AgentError> {
        let root = self.fs.resolve(&args.path)?;
        let needle = if args.case_sensitive {
            args.pattern.clone()
        } else {
            args.pattern.to_lowercase()
        };

        let mut results = Vec::new();
        let walker = walkdir::WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                !name.starts_with('.') && !args.exclude_dirs.iter().any(|d| d == name.as_ref())
            })
            .filter_map(|e| e.ok());

        for entry in walker {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.metadata().map(|m| m.len() > MAX_FILE_SIZE).unwrap_or(true) {
                continue;
            }
            // 非 UTF-8（二进制）文件跳过
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            let display = self.fs.display(entry.path());
            for (idx, line) in content.lines().enumerate() {
                let hit = if args.case_sensitive {
                    line.contains(&needle)
                } else {
                    line.to_lowercase().contains(&needle)
                };
                if !hit {
                    continue;
                }
                let shown: String = line.trim().chars().take(MAX_LINE_CHARS).collect();
                results.push(format!("{}:{}: {}", display, idx + 1, shown));
                if results.len() >= MAX_RESULTS {
                    results.push(format!("... (results truncated after {} matches)", MAX_RESULTS));
                    return Ok(results.join("\n"));
                }
            }
        }

        if results.is_empty() {
            Ok("No matches found.".to_string())
        } else {
            Ok(results.join("\n"))
        }
    }
}

#[async_trait]
impl Tool for GrepSearchTool {
    fn name(&self) -> &str {
        "grep_search"
    }

    fn description(&self) -> &str {
        "Search for a string pattern in files (recursive). Returns 'path:line: content' lines."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<GrepArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
        let args: GrepArgs = parse_args(self.name(), args)?;
        if args.pattern.is_empty() {
            return Err(AgentError::invalid_arguments(self.name(), "pattern must not be empty"));
        }
        self.search(&args)
    }
}

#[derive(Deserialize, JsonSchema)]
struct GlobArgs {
    /// Glob pattern (e.g. **/*.rs)
    pattern: String,
    /// Root directory to search in
    #[serde(default = "default_root")]
    path: String,
}

/// 按 glob 模式查找文件
pub struct GlobSearchTool {
    fs: SafeFs,
}

impl GlobSearchTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }

    fn search(&self, args: &GlobArgs) -> Result<String, AgentError> {
        if Path::new(&args.pattern).is_absolute() || args.pattern.split(['/', '\\']).any(|c| c == "..") {
            return Err(AgentError::PathEscape(args.pattern.clone()));
        }
        let root = self.fs.resolve(&args.path)?;
        let full = root.join(&args.pattern);
        let paths = glob::glob(&full.to_string_lossy())
            .map_err(|e| AgentError::invalid_arguments("glob_search", format!("bad pattern: {}", e)))?;

        let mut matched: Vec<String> = paths
            .filter_map(|p| p.ok())
            .take(MAX_RESULTS + 1)
            .map(|p| self.fs.display(&p))
            .collect();
        if matched.is_empty() {
            return Ok("No matching files found.".to_string());
        }
        if matched.len() > MAX_RESULTS {
            matched.truncate(MAX_RESULTS);
            matched.push(format!("... (results truncated after {} files)", MAX_RESULTS));
        }
        Ok(matched.join("\n"))
    }
}

#[async_trait]
impl Tool for GlobSearchTool {
    fn name(&self) -> &str {
        "glob_search"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g. **/*.rs)."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<GlobArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
        let args: GlobArgs = parse_args(self.name(), args)?;
        self.search(&args)
    }
}
