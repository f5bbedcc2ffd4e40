//! 推理客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Scripted Mock）实现 ReasoningClient：generate_action 返回
//! 文本或工具调用；generate_thought / assess_confidence 为审议协议的可选能力，
//! 默认不支持。Err 为调用层失败字符串，由 Runner 转为 AgentError::Llm（运行级致命）。

use async_trait::async_trait;

use crate::session::{Message, ToolCallRequest};

/// 推理端可见的工具定义（名称、描述、参数 JSON Schema）
#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// 推理端选择的下一步动作
#[derive(Clone, Debug)]
pub enum Action {
    /// 自由文本回复
    Text(String),
    /// 结构化工具调用请求
    ToolCall(ToolCallRequest),
}

/// 思考阶段产物：内部推理轨迹 + 置信度 + 建议动作
#[derive(Clone, Debug)]
pub struct Thought {
    pub content: String,
    /// [0,1]
    pub confidence: f64,
    pub suggested_action: String,
}

/// 置信度评估的建议
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfidenceRecommendation {
    Proceed,
    Abort,
}

/// 对刚执行动作的置信度评估
#[derive(Clone, Debug)]
pub struct ConfidenceAssessment {
    /// [0,1]
    pub score: f64,
    pub recommendation: ConfidenceRecommendation,
    pub rationale: String,
}

/// 推理客户端 trait：生成动作（必需）与审议能力（可选）
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// 给定完整对话与可见工具集，生成下一步动作
    async fn generate_action(
        &self,
        model: &str,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Action, String>;

    /// 行动前的内部思考；默认不支持
    async fn generate_thought(
        &self,
        _model: &str,
        _goal: &str,
        _messages: &[Message],
    ) -> Result<Thought, String> {
        Err("thought generation not supported".to_string())
    }

    /// 对刚执行动作的置信度评估；默认不支持
    async fn assess_confidence(
        &self,
        _model: &str,
        _goal: &str,
        _action_summary: &str,
    ) -> Result<ConfidenceAssessment, String> {
        Err("confidence assessment not supported".to_string())
    }

    /// 是否支持审议协议（thought / confidence 两个可选能力）
    fn supports_deliberation(&self) -> bool {
        false
    }
}
