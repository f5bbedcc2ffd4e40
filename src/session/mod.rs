//! 会话层：对话模型、可恢复状态与文件式持久化

pub mod manager;
pub mod message;
pub mod state;

pub use manager::SessionManager;
pub use message::{Message, Role, ToolCallRequest};
pub use state::{Command, SessionState, SessionStatus, ToolCallRecord, ToolCallResult};
