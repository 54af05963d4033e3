//! 认知层：Think-Act-Observe 主循环与过程事件

pub mod events;
pub mod loop_;

pub use events::AgentEvent;
pub use loop_::AgentLoop;
