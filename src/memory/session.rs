//! 会话：有序消息历史、token 预算统计与上下文压缩
//!
//! 历史只通过 add 追加增长；压缩时把 [boundary, len - preserve_count) 区间替换为一条摘要型
//! system 消息。下标 0 的系统提示与最近 preserve_count 条消息始终原样保留；
//! 切点若落在工具调用组内部则前移，保证每条 tool 结果都跟在其 assistant 调用之后。

use std::path::Path;

use uuid::Uuid;

use crate::llm::LlmClient;
use crate::memory::{FileReferenceResolver, Message, ReferenceLimits, Role, TokenBudget, TokenEstimator};

const SUMMARIZER_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that summarizes conversation history for a coding agent.";
const SUMMARIZE_INSTRUCTION: &str = "Summarize the following conversation history concisely. \
     Preserve file paths, key decisions, tool results that matter, and any unfinished work.";

/// 会话预算与压缩参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub budget: TokenBudget,
    /// 使用率达到该值才压缩
    pub compress_threshold: f64,
    /// 压缩时原样保留的最近消息条数
    pub preserve_count: usize,
}

impl SessionConfig {
    pub fn new(max_tokens: usize, reserved_output_tokens: usize) -> Self {
        Self {
            budget: TokenBudget::new(max_tokens, reserved_output_tokens),
            ..Self::default()
        }
    }

    pub fn with_compress_threshold(mut self, threshold: f64) -> Self {
        self.compress_threshold = threshold;
        self
    }

    pub fn with_preserve_count(mut self, count: usize) -> Self {
        self.preserve_count = count;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            budget: TokenBudget::default(),
            compress_threshold: 0.9,
            preserve_count: 10,
        }
    }
}

/// 一次 compress 调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum CompactionOutcome {
    /// 使用率未达阈值
    BelowThreshold,
    /// 可摘要区间为空
    NothingToSummarize,
    /// 已把 removed 条消息折叠为一条摘要
    Compacted { removed: usize },
    /// 摘要调用失败，历史未改动
    Failed(String),
}

/// 会话：系统提示固定在下标 0
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    system_prompt: String,
    history: Vec<Message>,
    compaction_boundary: usize,
    config: SessionConfig,
    references: Option<FileReferenceResolver>,
}

impl Session {
    pub fn new(system_prompt: impl Into<String>, config: SessionConfig) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            id: Uuid::new_v4(),
            history: vec![Message::system(system_prompt.clone())],
            system_prompt,
            compaction_boundary: 1,
            config,
            references: None,
        }
    }

    /// 在系统提示之后注入一条上下文摘要（子 Agent 创建时使用）
    pub fn with_context_summary(mut self, summary: impl AsRef<str>) -> Self {
        self.history.insert(
            1,
            Message::system(format!("Context from the parent agent:\n{}", summary.as_ref())),
        );
        self
    }

    /// 绑定工作目录，用于解析 @file 引用
    pub fn with_workspace(mut self, root: impl AsRef<Path>, limits: ReferenceLimits) -> Self {
        self.references = Some(FileReferenceResolver::new(root, limits));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn add(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn compaction_boundary(&self) -> usize {
        self.compaction_boundary
    }

    /// 清空历史，只保留系统提示
    pub fn clear(&mut self) {
        self.history = vec![Message::system(self.system_prompt.clone())];
        self.compaction_boundary = 1;
    }

    /// provider wire 格式
    pub fn to_wire(&self) -> Vec<serde_json::Value> {
        self.history.iter().map(Message::to_wire).collect()
    }

    pub fn token_estimate(text: &str) -> usize {
        TokenEstimator::estimate(text)
    }

    pub fn total_tokens(&self) -> usize {
        self.history.iter().map(TokenEstimator::estimate_message).sum()
    }

    pub fn usage_ratio(&self) -> f64 {
        self.config.budget.usage_ratio(self.total_tokens())
    }

    /// 解析输入中的 @file 引用；未绑定工作目录或无标记时返回 None
    pub fn resolve_reference(&self, text: &str) -> Option<String> {
        self.references.as_ref()?.resolve(text)
    }

    /// 上下文压缩：使用率达到阈值时，对 [boundary, len - preserve_count) 发起一次无工具的摘要调用，
    /// 成功则替换为一条摘要 system 消息并推进 boundary；失败只记录日志，历史保持不变
    pub async fn compress(&mut self, summarizer: &dyn LlmClient) -> CompactionOutcome {
        let ratio = self.usage_ratio();
        if ratio < self.config.compress_threshold {
            return CompactionOutcome::BelowThreshold;
        }

        let start = self.compaction_boundary;
        let mut end = self.history.len().saturating_sub(self.config.preserve_count);
        // 切点不能落在工具调用组中间：保留区以发起调用的 assistant 消息开头
        while end > start && self.history.get(end).is_some_and(|m| m.role == Role::Tool) {
            end -= 1;
        }
        if start >= end {
            tracing::debug!(ratio, start, end, "compaction skipped: nothing eligible");
            return CompactionOutcome::NothingToSummarize;
        }

        let transcript = render_transcript(&self.history[start..end]);
        let request = [
            Message::system(SUMMARIZER_SYSTEM_PROMPT),
            Message::user(format!("{}\n\n{}", SUMMARIZE_INSTRUCTION, transcript)),
        ];

        let summary = match summarizer.chat(&request, &[]).await {
            Ok(reply) if !reply.text().trim().is_empty() => reply.text().trim().to_string(),
            Ok(_) => {
                tracing::warn!("compaction skipped: summarizer returned empty content");
                return CompactionOutcome::Failed("empty summary".to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "compaction skipped: summarizer failed");
                return CompactionOutcome::Failed(e.to_string());
            }
        };

        let removed = end - start;
        self.history.splice(
            start..end,
            [Message::system(format!("Previous conversation summary:\n\n{}", summary))],
        );
        self.compaction_boundary = start + 1;
        tracing::info!(
            session = %self.id,
            removed,
            ratio_before = ratio,
            ratio_after = self.usage_ratio(),
            "context compacted"
        );
        CompactionOutcome::Compacted { removed }
    }
}

/// 区间渲染为纯文本对话记录
fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for m in messages {
        match m.role {
            Role::Tool => {
                out.push_str(&format!(
                    "tool ({}): {}\n",
                    m.name.as_deref().unwrap_or("?"),
                    m.text()
                ));
            }
            role => {
                if !m.text().is_empty() {
                    out.push_str(&format!("{}: {}\n", role.as_str(), m.text()));
                }
                for call in m.tool_calls() {
                    out.push_str(&format!(
                        "{} -> {}({})\n",
                        role.as_str(),
                        call.function.name,
                        call.function.arguments
                    ));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::memory::ToolCallRequest;

    fn small_session() -> Session {
        Session::new("System Prompt", SessionConfig::new(1000, 200))
    }

    /// 约 75 token（300 个 ASCII 字符）
    fn filler(i: usize) -> Message {
        let body = "A".repeat(300 - format!("Msg {i:02}: ").len());
        Message::user(format!("Msg {i:02}: {body}"))
    }

    #[test]
    fn test_new_session_has_system_prompt() {
        let session = small_session();
        assert_eq!(session.len(), 1);
        assert_eq!(session.messages()[0].role, Role::System);
        assert_eq!(session.messages()[0].text(), "System Prompt");
        assert_eq!(session.compaction_boundary(), 1);
    }

    #[test]
    fn test_context_summary_goes_after_system_prompt() {
        let session = small_session().with_context_summary("parent found bug in parser.rs");
        assert_eq!(session.len(), 2);
        assert_eq!(session.messages()[0].text(), "System Prompt");
        assert_eq!(session.messages()[1].role, Role::System);
        assert!(session.messages()[1].text().contains("parser.rs"));
    }

    #[test]
    fn test_clear_keeps_system_prompt() {
        let mut session = small_session();
        session.add(Message::user("Hi"));
        session.clear();
        assert_eq!(session.len(), 1);
        assert_eq!(session.messages()[0].text(), "System Prompt");
    }

    #[test]
    fn test_usage_ratio_non_decreasing_on_append() {
        let mut session = small_session();
        let mut last = session.usage_ratio();
        for i in 0..20 {
            session.add(filler(i));
            let ratio = session.usage_ratio();
            assert!(ratio >= last);
            last = ratio;
        }
    }

    #[test]
    fn test_usage_ratio_counts_tool_call_payload() {
        let mut session = small_session();
        let before = session.usage_ratio();
        session.add(Message::assistant_with_tool_calls(
            None,
            vec![ToolCallRequest::new("c1", "write_file", "{\"path\":\"a.rs\",\"content\":\"fn main() {}\"}")],
        ));
        assert!(session.usage_ratio() > before);
    }

    #[test]
    fn test_usage_ratio_degenerate_budget() {
        let session = Session::new("s", SessionConfig::new(100, 100));
        assert_eq!(session.usage_ratio(), 1.0);
    }

    #[tokio::test]
    async fn test_compress_noop_below_threshold() {
        let mut session = small_session();
        session.add(Message::user("short"));
        let summarizer = ScriptedLlmClient::replies(vec![Message::assistant("unused")]);
        assert_eq!(session.compress(&summarizer).await, CompactionOutcome::BelowThreshold);
        assert_eq!(summarizer.call_count(), 0);
        assert_eq!(session.len(), 2);
    }

    #[tokio::test]
    async fn test_compress_nothing_to_summarize_when_only_recent_turns() {
        // 预算很小：10 条即超过阈值，但全部属于保留区
        let mut session = Session::new("s", SessionConfig::new(100, 0));
        for i in 0..10 {
            session.add(filler(i));
        }
        let summarizer = ScriptedLlmClient::replies(vec![Message::assistant("unused")]);
        assert_eq!(session.compress(&summarizer).await, CompactionOutcome::NothingToSummarize);
        assert_eq!(summarizer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_scenario_threshold_and_fold() {
        let mut session = small_session();
        for i in 0..9 {
            session.add(filler(i));
        }
        assert!(session.total_tokens() <= 720);
        assert!(session.usage_ratio() < 0.9);

        session.add(filler(9));
        assert!(session.total_tokens() > 720);
        assert!(session.usage_ratio() >= 0.9);

        // 再追加两条，使保留区之外有可摘要内容
        session.add(filler(10));
        session.add(filler(11));
        let tail_before: Vec<Message> = session.messages()[session.len() - 10..].to_vec();
        let ratio_before = session.usage_ratio();

        let summarizer = ScriptedLlmClient::replies(vec![Message::assistant("[SUMMARY] msgs 0-1")]);
        let outcome = session.compress(&summarizer).await;
        assert_eq!(outcome, CompactionOutcome::Compacted { removed: 2 });

        // 系统提示未变，摘要在下标 1，最近 10 条原样在尾部
        assert_eq!(session.messages()[0].text(), "System Prompt");
        assert_eq!(session.messages()[1].role, Role::System);
        assert!(session.messages()[1].text().contains("[SUMMARY] msgs 0-1"));
        assert_eq!(session.len(), 12);
        assert_eq!(&session.messages()[2..], tail_before.as_slice());
        assert_eq!(session.compaction_boundary(), 2);
        assert!(session.usage_ratio() < ratio_before);

        // 摘要调用恰好一次，且不带工具
        let requests = summarizer.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tool_names.is_empty());
        assert!(requests[0].messages[1].text().contains("file paths"));
        assert!(requests[0].messages[1].text().contains("Msg 00"));
    }

    #[tokio::test]
    async fn test_second_compress_does_not_resummarize_summary() {
        let mut session = small_session();
        for i in 0..12 {
            session.add(filler(i));
        }
        let summarizer = ScriptedLlmClient::replies(vec![
            Message::assistant("first summary"),
            Message::assistant("second summary"),
        ]);
        session.compress(&summarizer).await;
        for i in 12..15 {
            session.add(filler(i));
        }
        let outcome = session.compress(&summarizer).await;
        assert_eq!(outcome, CompactionOutcome::Compacted { removed: 3 });
        assert!(session.messages()[1].text().contains("first summary"));
        assert!(session.messages()[2].text().contains("second summary"));
        assert_eq!(session.compaction_boundary(), 3);
        assert!(!summarizer.requests()[1].messages[1].text().contains("first summary"));
    }

    #[tokio::test]
    async fn test_compress_keeps_tool_call_group_together() {
        let mut session = Session::new("s", SessionConfig::new(100, 0));
        session.add(Message::user("read the config"));
        session.add(Message::assistant_with_tool_calls(
            None,
            vec![ToolCallRequest::new("c1", "read_file", "{\"path\":\"config.toml\"}")],
        ));
        session.add(Message::tool("c1", "read_file", "x".repeat(400)));
        for i in 0..9 {
            session.add(filler(i));
        }
        let summarizer = ScriptedLlmClient::replies(vec![Message::assistant("asked to read config")]);
        let outcome = session.compress(&summarizer).await;
        assert_eq!(outcome, CompactionOutcome::Compacted { removed: 1 });

        let msgs = session.messages();
        assert_eq!(msgs[1].role, Role::System);
        assert_eq!(msgs[2].role, Role::Assistant);
        assert_eq!(msgs[2].tool_calls()[0].id, "c1");
        assert_eq!(msgs[3].role, Role::Tool);
        assert!(msgs.len() - 2 >= 10);
        // 每条工具结果之前都有带对应 id 的 assistant 调用
        for (i, m) in msgs.iter().enumerate().filter(|(_, m)| m.role == Role::Tool) {
            let id = m.tool_call_id.as_deref().unwrap_or_default();
            assert!(msgs[..i].iter().any(|prev| prev.tool_calls().iter().any(|c| c.id == id)));
        }
    }

    #[tokio::test]
    async fn test_compress_skips_when_only_a_split_group_is_eligible() {
        let mut session = Session::new("s", SessionConfig::new(100, 0));
        session.add(Message::assistant_with_tool_calls(
            None,
            vec![ToolCallRequest::new("c1", "list_dir", "{}")],
        ));
        session.add(Message::tool("c1", "list_dir", "x".repeat(400)));
        for i in 0..9 {
            session.add(filler(i));
        }
        let summarizer = ScriptedLlmClient::replies(vec![Message::assistant("unused")]);
        assert_eq!(session.compress(&summarizer).await, CompactionOutcome::NothingToSummarize);
        assert_eq!(summarizer.call_count(), 0);
        assert_eq!(session.len(), 12);
    }

    #[tokio::test]
    async fn test_compress_failure_leaves_history_untouched() {
        let mut session = small_session();
        for i in 0..12 {
            session.add(filler(i));
        }
        let before = session.messages().to_vec();
        let summarizer = ScriptedLlmClient::new(vec![Err(LlmError::Fatal("boom".into()))]);
        let outcome = session.compress(&summarizer).await;
        assert!(matches!(outcome, CompactionOutcome::Failed(_)));
        assert_eq!(session.messages(), before.as_slice());
        assert_eq!(session.compaction_boundary(), 1);
    }

    #[test]
    fn test_transcript_renders_tool_calls() {
        let text = render_transcript(&[
            Message::assistant_with_tool_calls(None, vec![ToolCallRequest::new("c1", "read_file", "{\"path\":\"src/main.rs\"}")]),
            Message::tool("c1", "read_file", "fn main() {}"),
        ]);
        assert!(text.contains("assistant -> read_file({\"path\":\"src/main.rs\"})"));
        assert!(text.contains("tool (read_file): fn main() {}"));
    }
}
