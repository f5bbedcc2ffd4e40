//! 推理层：客户端抽象与实现（OpenAI 兼容 / Scripted Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::ScriptedClient;
pub use openai::OpenAiReasoningClient;
pub use traits::{
    Action, ConfidenceAssessment, ConfidenceRecommendation, ReasoningClient, Thought,
    ToolDefinition,
};
