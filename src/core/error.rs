//! Agent 错误类型
//!
//! 运行级错误（推理失败、取消、超时、迭代耗尽、会话不一致）终结本次 run；
//! 工具级失败不在此列，由循环内的重试策略局部恢复。

use thiserror::Error;

/// 编排循环可能出现的运行级错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 推理客户端调用失败，对本次 run 总是致命（由调用方决定是否整体重跑）
    #[error("Reasoning client error: {0}")]
    Llm(String),

    #[error("Cancelled by caller")]
    Cancelled,

    /// 运行级截止时间已到
    #[error("Run deadline exceeded after {0}s")]
    DeadlineExceeded(u64),

    #[error("Exceeded maximum iterations ({0})")]
    IterationsExhausted(usize),

    /// 审议阶段置信度低于阈值且建议中止
    #[error("Aborted on low confidence: {0}")]
    ConfidenceAbort(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// 恢复会话时 model / system prompt 与持久化内容不一致
    #[error("Session mismatch: {0}")]
    SessionMismatch(String),

    #[error("Session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// 取消/超时与普通失败分开分类，调用方据此决定是否恢复会话
    pub fn is_interruption(&self) -> bool {
        matches!(self, AgentError::Cancelled | AgentError::DeadlineExceeded(_))
    }
}
