//! Scripted 推理客户端（用于测试与离线运行，无需 API）
//!
//! 按脚本顺序弹出预设动作，脚本耗尽后返回固定的完成文本；
//! thought / confidence 同样可脚本化，便于确定性地驱动审议协议。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{
    Action, ConfidenceAssessment, ConfidenceRecommendation, ReasoningClient, Thought,
    ToolDefinition,
};
use crate::session::Message;

/// 脚本化客户端：动作、思考与置信度评估都按队列弹出
pub struct ScriptedClient {
    actions: Mutex<VecDeque<Action>>,
    thoughts: Mutex<VecDeque<Thought>>,
    assessments: Mutex<VecDeque<ConfidenceAssessment>>,
    /// 动作脚本耗尽后的回复文本
    fallback: String,
    deliberation: bool,
}

impl ScriptedClient {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            actions: Mutex::new(actions.into()),
            thoughts: Mutex::new(VecDeque::new()),
            assessments: Mutex::new(VecDeque::new()),
            fallback: "Task completed.".to_string(),
            deliberation: false,
        }
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    pub fn with_thoughts(mut self, thoughts: Vec<Thought>) -> Self {
        self.thoughts = Mutex::new(thoughts.into());
        self
    }

    pub fn with_assessments(mut self, assessments: Vec<ConfidenceAssessment>) -> Self {
        self.assessments = Mutex::new(assessments.into());
        self
    }

    /// 声明支持审议协议（thought / confidence）
    pub fn with_deliberation(mut self) -> Self {
        self.deliberation = true;
        self
    }
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl ReasoningClient for ScriptedClient {
    async fn generate_action(
        &self,
        _model: &str,
        _system_prompt: &str,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<Action, String> {
        let mut actions = self.actions.lock().map_err(|e| e.to_string())?;
        Ok(actions
            .pop_front()
            .unwrap_or_else(|| Action::Text(self.fallback.clone())))
    }

    async fn generate_thought(
        &self,
        _model: &str,
        _goal: &str,
        _messages: &[Message],
    ) -> Result<Thought, String> {
        let mut thoughts = self.thoughts.lock().map_err(|e| e.to_string())?;
        Ok(thoughts.pop_front().unwrap_or_else(|| Thought {
            content: "considering the next step".to_string(),
            confidence: 0.8,
            suggested_action: String::new(),
        }))
    }

    async fn assess_confidence(
        &self,
        _model: &str,
        _goal: &str,
        _action_summary: &str,
    ) -> Result<ConfidenceAssessment, String> {
        let mut assessments = self.assessments.lock().map_err(|e| e.to_string())?;
        Ok(assessments.pop_front().unwrap_or(ConfidenceAssessment {
            score: 0.9,
            recommendation: ConfidenceRecommendation::Proceed,
            rationale: "scripted default".to_string(),
        }))
    }

    fn supports_deliberation(&self) -> bool {
        self.deliberation
    }
}
