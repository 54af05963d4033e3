//! Agent 过程事件：供 REPL / 前端按顺序展示工具调度、工具输出与最终回复

use serde::Serialize;

/// 单轮对话中的过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 即将执行一批工具调用
    DispatchStarted { count: usize, names: Vec<String> },
    /// 单个工具调用完成（内容即回灌给模型的原始结果）
    ToolOutput {
        tool_call_id: String,
        name: String,
        content: String,
    },
    /// 最终回复
    Answer { text: String },
    /// 上下文已压缩
    Compacted { removed: usize },
}

pub(crate) fn send_event(tx: Option<&tokio::sync::mpsc::UnboundedSender<AgentEvent>>, ev: AgentEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
