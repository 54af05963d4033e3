//! Token 预算
//!
//! 不依赖真实分词器：按字符数近似估算 token；TokenBudget 给出扣除输出预留后的有效窗口。

use crate::memory::Message;

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 英文约 4 字符/token，中文约 1.5 字符/token，均向上取整；空文本为 0
    pub fn estimate(text: &str) -> usize {
        let mut ascii_chars = 0usize;
        let mut non_ascii_chars = 0usize;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        ascii_chars.div_ceil(4) + (non_ascii_chars as f64 / 1.5).ceil() as usize
    }

    /// 单条消息的估算：正文 + 每个工具调用的名称与参数文本
    pub fn estimate_message(message: &Message) -> usize {
        let calls: usize = message
            .tool_calls()
            .iter()
            .map(|c| Self::estimate(&c.function.name) + Self::estimate(&c.function.arguments))
            .sum();
        Self::estimate(message.text()) + calls
    }
}

/// Token 预算：总窗口与为模型输出预留的部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// 总 token 预算
    pub max_tokens: usize,
    /// 模型输出预留
    pub reserved_output_tokens: usize,
}

impl TokenBudget {
    pub fn new(max_tokens: usize, reserved_output_tokens: usize) -> Self {
        Self {
            max_tokens,
            reserved_output_tokens,
        }
    }

    /// 可供历史消息使用的窗口
    pub fn effective_window(&self) -> usize {
        self.max_tokens.saturating_sub(self.reserved_output_tokens)
    }

    /// 使用率；有效窗口非正时视为已满（1.0）
    pub fn usage_ratio(&self, used_tokens: usize) -> f64 {
        let window = self.effective_window();
        if window == 0 {
            return 1.0;
        }
        used_tokens as f64 / window as f64
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(32_000, 4_000)
    }
}
