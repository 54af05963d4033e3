//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CODEAGENT__*` 覆盖（双下划线表示嵌套，如 `CODEAGENT__LLM__MODEL=qwen-max`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::RetryConfig;
use crate::memory::{ReferenceLimits, SessionConfig};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub session: SessionSection,
    pub tools: ToolsSection,
}

/// [app] 段：工作目录、Plan Mode、步数与委派深度上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 项目根目录，未设置时用当前目录
    pub workspace_root: Option<PathBuf>,
    /// 启动即进入 Plan Mode
    pub plan_mode: bool,
    /// 单轮对话内最多调用模型的次数
    pub max_steps: usize,
    /// 子 Agent 最大嵌套深度（根 Agent 为 0）
    pub max_delegation_depth: usize,
    /// 覆盖默认系统提示词
    pub system_prompt: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            workspace_root: None,
            plan_mode: false,
            max_steps: 50,
            max_delegation_depth: 1,
            system_prompt: None,
        }
    }
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai（任意兼容端点）/ mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "qwen-plus".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.0,
            request_timeout_secs: 120,
            retry: RetryConfig::default(),
        }
    }
}

/// [session] 段：token 预算与压缩参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub max_tokens: usize,
    pub reserved_output_tokens: usize,
    /// 使用率达到该值时压缩
    pub compress_threshold: f64,
    /// 压缩时原样保留的最近消息条数
    pub preserve_count: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        let d = SessionConfig::default();
        Self {
            max_tokens: d.budget.max_tokens,
            reserved_output_tokens: d.budget.reserved_output_tokens,
            compress_threshold: d.compress_threshold,
            preserve_count: d.preserve_count,
        }
    }
}

impl SessionSection {
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig::new(self.max_tokens, self.reserved_output_tokens)
            .with_compress_threshold(self.compress_threshold)
            .with_preserve_count(self.preserve_count)
    }
}

/// [tools] 段：工具超时、Shell 限制、@file 引用上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）；委派子 Agent 不受此限制
    pub tool_timeout_secs: u64,
    pub shell: ShellSection,
    pub reference: ReferenceSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 120,
            shell: ShellSection::default(),
            reference: ReferenceSection::default(),
        }
    }
}

/// [tools.shell] 段：超时、禁止的子串、输出截断
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    pub timeout_secs: u64,
    pub blocked_patterns: Vec<String>,
    pub max_output_chars: usize,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            blocked_patterns: default_blocked_patterns(),
            max_output_chars: 5000,
        }
    }
}

fn default_blocked_patterns() -> Vec<String> {
    vec![
        "rm -rf /".into(),
        "rm -fr /".into(),
        "Format-Volume".into(),
        "dd if=/dev/zero".into(),
        "mkfs".into(),
        ":(){:|:&};:".into(), // fork bomb
        ":(){ :|:& };:".into(),
    ]
}

/// [tools.reference] 段：@file 引用的文件数、行数、字节数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferenceSection {
    pub max_files: usize,
    pub max_lines: usize,
    pub max_bytes: usize,
}

impl Default for ReferenceSection {
    fn default() -> Self {
        let d = ReferenceLimits::default();
        Self {
            max_files: d.max_files,
            max_lines: d.max_lines,
            max_bytes: d.max_bytes,
        }
    }
}

impl ReferenceSection {
    pub fn to_limits(&self) -> ReferenceLimits {
        ReferenceLimits {
            max_files: self.max_files,
            max_lines: self.max_lines,
            max_bytes: self.max_bytes,
        }
    }
}

/// 从 config 目录加载配置，环境变量 CODEAGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CODEAGENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CODEAGENT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_steps, 50);
        assert_eq!(cfg.app.max_delegation_depth, 1);
        assert!(!cfg.app.plan_mode);
        assert_eq!(cfg.llm.retry.max_attempts, 3);
        assert_eq!(cfg.session.preserve_count, 10);
        assert!((cfg.session.compress_threshold - 0.9).abs() < f64::EPSILON);
        assert!(cfg.tools.shell.blocked_patterns.iter().any(|p| p == "rm -rf /"));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            "[app]\nplan_mode = true\n\n[session]\nmax_tokens = 1000\nreserved_output_tokens = 200\n\n[llm]\nprovider = \"mock\"\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert!(cfg.app.plan_mode);
        assert_eq!(cfg.llm.provider, "mock");
        let session = cfg.session.to_session_config();
        assert_eq!(session.budget.effective_window(), 800);
        assert_eq!(session.preserve_count, 10);
    }
}
