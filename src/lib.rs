//! Hive - Rust 智能体编排核心
//!
//! 驱动推理端与副作用工具之间的循环：基础编排循环（core::runner）、错误分类与
//! 重试策略（core::classifier / core::policy）、可选的审议协议（core::deliberation）、
//! 跨进程可恢复的会话持久化（session）。推理端与具体工具通过 trait 接入（llm / tools）。

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod session;
pub mod tools;

pub use agent::{build_registry, create_components, resume_command, run_command, AgentComponents};
pub use config::{load_config, AppConfig};
pub use core::{
    AgentError, AgentRunner, CompletionPolicy, DeliberationConfig, DeliberationResult,
    DeliberationRunner, RetryPolicy, RunConfig, RunResult,
};
pub use llm::{Action, ReasoningClient, ScriptedClient};
pub use session::{Command, Message, Role, SessionManager, SessionState, SessionStatus};
pub use tools::{Tool, ToolExecutor, ToolOutcome, ToolRegistry};
