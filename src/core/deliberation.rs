//! 审议协议：基础循环的装饰器
//!
//! 每次基础迭代外可选包裹三个阶段：行动前的 thought（内部推理轨迹，绝不进入推理端
//! 可见的对话）、工具动作后的 confidence（低于阈值且建议中止时立刻失败结束，
//! 这是审议唯一能提前终止基础循环的路径）、成功结束后的 reflection 摘要。
//! 配置关闭时为纯透传，审议台账为空。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::runner::{AgentRunner, RunResult, StepOutcome};
use crate::core::AgentError;
use crate::llm::ConfidenceRecommendation;

/// 审议阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliberationPhase {
    Thought,
    Action,
    Reflect,
    Confidence,
}

/// 一个内部推理单元；internal=true 的步骤绝不出现在对话转写中
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliberationStep {
    pub id: String,
    pub phase: DeliberationPhase,
    pub content: String,
    /// [0,1]；无评分的阶段为 0
    pub confidence: f64,
    #[serde(default)]
    pub reasoning_path: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub internal: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl DeliberationStep {
    fn new(phase: DeliberationPhase, content: impl Into<String>, confidence: f64, internal: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            phase,
            content: content.into(),
            confidence,
            reasoning_path: Vec::new(),
            timestamp: Utc::now(),
            internal,
            metadata: BTreeMap::new(),
        }
    }
}

/// 审议配置
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliberationConfig {
    /// 关闭时 run_with_deliberation 纯透传基础循环
    #[serde(default)]
    pub enabled: bool,
    /// 工具动作后是否做置信度评估
    #[serde(default = "default_true")]
    pub require_explanation: bool,
    /// 低于该值且建议中止时终止 run
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// 成功结束后是否生成 reflection 摘要
    #[serde(default = "default_true")]
    pub enable_reflection: bool,
}

fn default_true() -> bool {
    true
}

fn default_confidence_threshold() -> f64 {
    0.4
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            require_explanation: true,
            confidence_threshold: default_confidence_threshold(),
            enable_reflection: true,
        }
    }
}

/// 审议 run 的返回值：内嵌基础 RunResult 并附加审议台账与汇总
#[derive(Clone, Debug)]
pub struct DeliberationResult {
    pub run: RunResult,
    pub deliberation_steps: Vec<DeliberationStep>,
    pub thought_count: usize,
    /// 所有非零置信度分数（thought + confidence 步骤）的算术平均；无分数时为 0
    pub average_confidence: f64,
    pub reflection_notes: Vec<String>,
}

/// 审议 Runner：组合（而非继承）一个基础 AgentRunner
pub struct DeliberationRunner {
    base: AgentRunner,
    config: DeliberationConfig,
    steps: Vec<DeliberationStep>,
    reflection_notes: Vec<String>,
}

impl DeliberationRunner {
    pub fn new(base: AgentRunner, config: DeliberationConfig) -> Self {
        Self {
            base,
            config,
            steps: Vec::new(),
            reflection_notes: Vec::new(),
        }
    }

    pub fn base(&self) -> &AgentRunner {
        &self.base
    }

    /// 执行审议 run；配置关闭时透传基础循环并返回空审议台账
    pub async fn run_with_deliberation(&mut self, initial_prompt: &str) -> DeliberationResult {
        if !self.config.enabled {
            let run = self.base.run(initial_prompt).await;
            return self.summarize(run);
        }

        self.base.begin(initial_prompt);
        let outcome = self.deliberate(initial_prompt).await;
        let run = self.base.conclude(outcome);
        if run.success && self.config.enable_reflection {
            self.reflection_notes.push(format!(
                "run completed after {} iteration(s) with {} deliberation step(s)",
                run.iterations,
                self.steps.len()
            ));
        }
        self.summarize(run)
    }

    /// 基础循环的审议版：thought -> action -> confidence，每完成一次迭代检查取消
    async fn deliberate(&mut self, goal: &str) -> Result<String, AgentError> {
        let supports = self.base.client().supports_deliberation();
        let max = self.base.session().config.max_iterations;
        while self.base.iterations() < max {
            if supports {
                self.thought_phase(goal).await;
            }

            let outcome = self.base.step().await?;
            self.base.bump_iteration();
            self.record_action(&outcome);

            if let StepOutcome::Finished(text) = outcome {
                return Ok(text);
            }
            if let StepOutcome::ToolExecuted { ref name, success } = outcome {
                if supports && self.config.require_explanation {
                    self.confidence_phase(goal, name, success).await?;
                }
            }
            if self.base.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
        }
        Err(AgentError::IterationsExhausted(max))
    }

    /// thought 阶段：失败降级为直接行动（记日志，不致命）
    async fn thought_phase(&mut self, goal: &str) {
        let session = self.base.session();
        let thought = self
            .base
            .client()
            .generate_thought(&session.model, goal, &session.messages)
            .await;
        match thought {
            Ok(t) => {
                let mut step =
                    DeliberationStep::new(DeliberationPhase::Thought, t.content, t.confidence, true);
                if !t.suggested_action.is_empty() {
                    step.reasoning_path.push(t.suggested_action);
                }
                self.steps.push(step);
            }
            Err(e) => {
                tracing::debug!("thought generation degraded to direct action: {e}");
            }
        }
    }

    /// confidence 阶段：评分低于阈值且建议中止时，以 ConfidenceAbort 终止 run
    async fn confidence_phase(
        &mut self,
        goal: &str,
        tool_name: &str,
        success: bool,
    ) -> Result<(), AgentError> {
        let summary = format!(
            "tool call '{}' {}",
            tool_name,
            if success { "succeeded" } else { "failed" }
        );
        let model = self.base.session().model.clone();
        let assessment = match self.base.client().assess_confidence(&model, goal, &summary).await {
            Ok(a) => a,
            Err(e) => {
                // 评估失败与 thought 一样降级，不致命
                tracing::debug!("confidence assessment unavailable: {e}");
                return Ok(());
            }
        };
        let mut step = DeliberationStep::new(
            DeliberationPhase::Confidence,
            assessment.rationale.clone(),
            assessment.score,
            false,
        );
        step.metadata.insert("action".to_string(), summary);
        self.steps.push(step);

        if assessment.score < self.config.confidence_threshold
            && assessment.recommendation == ConfidenceRecommendation::Abort
        {
            return Err(AgentError::ConfidenceAbort(format!(
                "confidence {:.2} below threshold {:.2} after {}",
                assessment.score, self.config.confidence_threshold, tool_name
            )));
        }
        Ok(())
    }

    fn record_action(&mut self, outcome: &StepOutcome) {
        let content = match outcome {
            StepOutcome::Finished(_) => "final text response".to_string(),
            StepOutcome::Interim => "interim text response".to_string(),
            StepOutcome::ToolExecuted { name, success } => {
                format!("tool call '{}' ({})", name, if *success { "ok" } else { "failed" })
            }
            StepOutcome::DispatchFailed { name } => format!("tool call '{}' not dispatched", name),
        };
        self.steps
            .push(DeliberationStep::new(DeliberationPhase::Action, content, 0.0, false));
    }

    fn summarize(&mut self, run: RunResult) -> DeliberationResult {
        for note in self.reflection_notes.clone() {
            self.steps
                .push(DeliberationStep::new(DeliberationPhase::Reflect, note, 0.0, false));
        }
        let scores: Vec<f64> = self
            .steps
            .iter()
            .filter(|s| {
                matches!(s.phase, DeliberationPhase::Thought | DeliberationPhase::Confidence)
                    && s.confidence > 0.0
            })
            .map(|s| s.confidence)
            .collect();
        let average_confidence = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        DeliberationResult {
            thought_count: self
                .steps
                .iter()
                .filter(|s| s.phase == DeliberationPhase::Thought)
                .count(),
            average_confidence,
            deliberation_steps: std::mem::take(&mut self.steps),
            reflection_notes: std::mem::take(&mut self.reflection_notes),
            run,
        }
    }
}
