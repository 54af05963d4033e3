//! 记忆层：消息模型、token 预算、会话与上下文压缩、@file 引用解析

pub mod message;
pub mod reference;
pub mod session;
pub mod token_budget;

pub use message::{FunctionCall, Message, Role, ToolCallRequest};
pub use reference::{FileReferenceResolver, ReferenceLimits};
pub use session::{CompactionOutcome, Session, SessionConfig};
pub use token_budget::{TokenBudget, TokenEstimator};
