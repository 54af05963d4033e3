//! @file 引用解析
//!
//! 扫描用户输入中的 `@file:<path-or-glob>` 标记，在工作目录下解析为文件（字面路径或 glob），
//! 拒绝解析到根目录之外的匹配，按文件数 / 行数 / 字节数截断后拼成 `<Context>` 块。

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

static MARKER: OnceLock<Regex> = OnceLock::new();

fn marker() -> &'static Regex {
    MARKER.get_or_init(|| Regex::new(r"@file:(\S+)").expect("valid marker regex"))
}

/// 引用内容上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceLimits {
    pub max_files: usize,
    pub max_lines: usize,
    pub max_bytes: usize,
}

impl Default for ReferenceLimits {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_lines: 400,
            max_bytes: 64 * 1024,
        }
    }
}

/// 绑定根目录的引用解析器
#[derive(Debug, Clone)]
pub struct FileReferenceResolver {
    root: PathBuf,
    limits: ReferenceLimits,
}

impl FileReferenceResolver {
    pub fn new(root: impl AsRef<Path>, limits: ReferenceLimits) -> Self {
        let root = root.as_ref().to_path_buf();
        let root = root.canonicalize().unwrap_or(root);
        Self { root, limits }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 提取全部标记（去掉结尾的常见标点）
    pub fn markers(text: &str) -> Vec<String> {
        marker()
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim_end_matches([',', ';', ')', '"', '\'']).to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// 解析所有引用；无标记时返回 None
    pub fn resolve(&self, text: &str) -> Option<String> {
        let tokens = Self::markers(text);
        if tokens.is_empty() {
            return None;
        }

        let mut files: BTreeSet<PathBuf> = BTreeSet::new();
        let mut notices: Vec<String> = Vec::new();
        for token in &tokens {
            let (matched, rejected) = self.expand(token);
            if matched.is_empty() && rejected == 0 {
                notices.push(format!("No matches for @file:{}", token));
            }
            if rejected > 0 {
                notices.push(format!(
                    "Skipped {} match(es) for @file:{} outside the workspace",
                    rejected, token
                ));
            }
            files.extend(matched);
        }

        let mut out = String::from("<Context>\n");
        let total = files.len();
        for path in files.iter().take(self.limits.max_files) {
            out.push_str(&self.render_file(path));
        }
        if total > self.limits.max_files {
            notices.push(format!(
                "{} more file(s) omitted (limit {})",
                total - self.limits.max_files,
                self.limits.max_files
            ));
        }
        for notice in notices {
            out.push_str(&notice);
            out.push('\n');
        }
        out.push_str("</Context>");
        Some(out)
    }

    /// 展开单个 token：返回 (根目录内的文件, 被拒绝的越界匹配数)
    fn expand(&self, token: &str) -> (Vec<PathBuf>, usize) {
        let candidates: Vec<PathBuf> = if token.contains(['*', '?', '[']) {
            let pattern = self.root.join(token);
            match glob::glob(&pattern.to_string_lossy()) {
                Ok(paths) => paths.filter_map(Result::ok).collect(),
                Err(e) => {
                    tracing::warn!(pattern = %token, error = %e, "invalid @file glob");
                    Vec::new()
                }
            }
        } else {
            vec![self.root.join(token)]
        };

        let mut matched = Vec::new();
        let mut rejected = 0;
        for candidate in candidates {
            let Ok(canonical) = candidate.canonicalize() else {
                continue;
            };
            if !canonical.starts_with(&self.root) {
                rejected += 1;
                continue;
            }
            if canonical.is_file() {
                matched.push(canonical);
            }
        }
        (matched, rejected)
    }

    fn render_file(&self, path: &Path) -> String {
        let display = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let mut buf = Vec::new();
        let read = std::fs::File::open(path)
            .and_then(|f| f.take(self.limits.max_bytes as u64 + 1).read_to_end(&mut buf));
        if let Err(e) = read {
            return format!("<File path=\"{}\">\n(unreadable: {})\n</File>\n", display, e);
        }
        let byte_truncated = buf.len() > self.limits.max_bytes;
        buf.truncate(self.limits.max_bytes);
        let text = String::from_utf8_lossy(&buf);

        let total_lines = text.lines().count();
        let mut body: String = text
            .lines()
            .take(self.limits.max_lines)
            .collect::<Vec<_>>()
            .join("\n");
        if total_lines > self.limits.max_lines || byte_truncated {
            body.push_str("\n... (truncated)");
        }
        format!("<File path=\"{}\">\n{}\n</File>\n", display, body)
    }
}
