//! CodeAgent - Rust 自主编程智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、Plan Mode 任务管理、组件构建
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）、重试
//! - **memory**: 消息模型、token 预算、会话与上下文压缩、@file 引用
//! - **react**: Think-Act-Observe 主循环与过程事件
//! - **tools**: 工具注册表、执行器与内置工具（文件、搜索、Shell、计划、委派）

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod react;
pub mod tools;

pub use crate::core::{AgentBuilder, AgentComponents, AgentError};
pub use crate::react::{AgentEvent, AgentLoop};
