//! 编排主循环
//!
//! 请求推理端的下一步动作 -> 文本则做完成判定，工具调用则在截止时间内执行并按
//! 重试策略写回引导消息 -> 每次变更后持久化会话 -> 直到最终答案 / 迭代耗尽 /
//! 取消 / 运行超时。工具失败只在循环内局部恢复，run 级错误（推理失败、取消、
//! 超时、耗尽）终结本次 run 并把会话置为 failed。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::classifier::{
    final_error_message, retry_guidance, should_retry, ErrorAnalytics, ErrorHistory,
};
use crate::core::policy::{CompletionPolicy, RetryPolicy};
use crate::core::AgentError;
use crate::llm::{Action, ReasoningClient};
use crate::session::{
    Message, SessionManager, SessionState, SessionStatus, ToolCallRecord, ToolCallRequest,
    ToolCallResult,
};
use crate::tools::{ErrorCode, StandardizedError, ToolExecutor};

/// 一次 run 的返回值
#[derive(Clone, Debug)]
pub struct RunResult {
    /// 最终回复；失败时为最后一条非空 assistant 文本（尽力而为）
    pub final_response: String,
    /// 完整对话
    pub messages: Vec<Message>,
    /// 成功执行的工具调用数（失败尝试见会话的 tool_calls 审计账）
    pub tool_calls: u32,
    /// 完成的循环迭代数
    pub iterations: usize,
    pub success: bool,
    pub error: Option<String>,
    /// run 级累计重试次数
    pub tool_retries: u32,
    /// 人类可读的错误轨迹
    pub error_details: Vec<String>,
}

/// 单次迭代的结果，供审议装饰器在迭代间插入附加阶段
#[derive(Clone, Debug)]
pub enum StepOutcome {
    /// 文本且判定为最终答案
    Finished(String),
    /// 文本但未判定为最终答案，循环继续
    Interim,
    /// 执行了一次工具调用（成功或业务失败）
    ToolExecuted { name: String, success: bool },
    /// 调用无法派发（未知工具/参数非法）：不计入工具调用，也不做重试记账
    DispatchFailed { name: String },
}

/// 基础编排循环：持有推理端、工具执行器与独占的会话状态
pub struct AgentRunner {
    client: Arc<dyn ReasoningClient>,
    executor: ToolExecutor,
    sessions: Option<SessionManager>,
    session: SessionState,
    completion: CompletionPolicy,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
    history: ErrorHistory,
    deadline: Instant,
    iterations: usize,
    tool_calls: u32,
    tool_retries: u32,
    error_details: Vec<String>,
}

impl AgentRunner {
    /// session 由调用方创建（SessionManager::create_session 或恢复加载），Runner 独占持有
    pub fn new(client: Arc<dyn ReasoningClient>, executor: ToolExecutor, session: SessionState) -> Self {
        Self {
            client,
            executor,
            sessions: None,
            session,
            completion: CompletionPolicy::default(),
            retry_policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            history: ErrorHistory::new(),
            deadline: Instant::now(),
            iterations: 0,
            tool_calls: 0,
            tool_retries: 0,
            error_details: Vec::new(),
        }
    }

    /// 附加会话管理器：每次状态变更后落盘
    pub fn with_session_manager(mut self, manager: SessionManager) -> Self {
        self.sessions = Some(manager);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// 替换完成判定策略（测试可注入确定性表）
    pub fn with_completion_policy(mut self, policy: CompletionPolicy) -> Self {
        self.completion = policy;
        self
    }

    /// 替换重试策略表
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub(crate) fn client(&self) -> &Arc<dyn ReasoningClient> {
        &self.client
    }

    pub(crate) fn bump_iteration(&mut self) {
        self.iterations += 1;
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// run 级错误分析（enable_error_analysis 关闭时台账为空）
    pub fn error_analytics(&self) -> ErrorAnalytics {
        self.history.analytics()
    }

    /// 执行完整 run：初始提示进入对话后循环至终止条件
    pub async fn run(&mut self, initial_prompt: &str) -> RunResult {
        self.begin(initial_prompt);
        let outcome = self.drive().await;
        self.conclude(outcome)
    }

    /// 初始化：新会话则以 {system, user} 种子对话；恢复的会话只追加新的用户输入。
    /// 同时起算运行级截止时间。
    pub(crate) fn begin(&mut self, initial_prompt: &str) {
        self.deadline = Instant::now() + self.session.config.run_timeout();
        if self.session.messages.is_empty() {
            let system = self.session.system_prompt.clone();
            self.session.push_message(Message::system(system));
        }
        self.session.push_message(Message::user(initial_prompt));
        self.persist();
    }

    /// 基础循环：每完成一次迭代检查一次取消（不抢占进行中的调用）
    pub(crate) async fn drive(&mut self) -> Result<String, AgentError> {
        let max = self.session.config.max_iterations;
        while self.iterations < max {
            let outcome = self.step().await?;
            self.iterations += 1;
            if let StepOutcome::Finished(text) = outcome {
                return Ok(text);
            }
            if self.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
        }
        Err(AgentError::IterationsExhausted(max))
    }

    /// 单次迭代：构建可见工具集 -> 请求动作 -> 文本走完成判定，工具调用走执行与重试记账
    pub(crate) async fn step(&mut self) -> Result<StepOutcome, AgentError> {
        let remaining = self.remaining_budget()?;
        let defs = self
            .executor
            .registry()
            .definitions(&self.session.config.allowed_tools);

        let action = timeout(
            remaining,
            self.client.generate_action(
                &self.session.model,
                &self.session.system_prompt,
                &self.session.messages,
                &defs,
            ),
        )
        .await
        .map_err(|_| AgentError::DeadlineExceeded(self.session.config.timeout_secs))?
        .map_err(AgentError::Llm)?;

        match action {
            Action::Text(text) => {
                self.session.push_message(Message::assistant(text.clone()));
                self.persist();
                let is_final = !self.session.config.require_text_output
                    || self.completion.is_final(
                        &text,
                        self.iterations,
                        self.session.config.max_iterations,
                    );
                if is_final {
                    Ok(StepOutcome::Finished(text))
                } else {
                    Ok(StepOutcome::Interim)
                }
            }
            Action::ToolCall(call) => self.execute_tool_call(call).await,
        }
    }

    async fn execute_tool_call(&mut self, call: ToolCallRequest) -> Result<StepOutcome, AgentError> {
        let signature = call.signature();
        self.session.push_message(Message::assistant_tool_call(call.clone()));
        self.persist();

        let remaining = self.remaining_budget()?;
        let started = Instant::now();
        let outcome = match self.executor.execute(&call, Some(remaining)).await {
            Err(invocation) => {
                // 调用层失败：不计入工具调用数，不触发重试记账，循环继续
                let text = format!("Tool call could not be dispatched: {invocation}");
                tracing::warn!(tool = %call.name, "dispatch failed: {invocation}");
                self.error_details.push(text.clone());
                self.session
                    .push_message(Message::tool_result(&call.id, &call.name, text));
                self.persist();
                return Ok(StepOutcome::DispatchFailed { name: call.name });
            }
            Ok(outcome) => outcome,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        // 实际执行过的调用无论成败都追加审计记录
        self.session.record_tool_call(ToolCallRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            tool_name: call.name.clone(),
            parameters: call.arguments.clone(),
            result: ToolCallResult {
                success: outcome.success,
                data: outcome.data.clone(),
                error: outcome.error.clone(),
            },
            duration_ms,
            success: outcome.success,
            error: outcome.error.clone(),
            iteration: self.iterations,
        });
        self.history.record_attempt(
            &signature,
            &call.name,
            &call.arguments,
            outcome.standardized.as_ref(),
            self.session.config.enable_error_analysis,
        );

        if outcome.success {
            self.tool_calls += 1;
            self.history.clear_signature(&signature);
            self.session
                .push_message(Message::tool_result(&call.id, &call.name, outcome.render_data()));
            self.persist();
            return Ok(StepOutcome::ToolExecuted {
                name: call.name,
                success: true,
            });
        }

        let err = outcome
            .standardized
            .clone()
            .unwrap_or_else(|| StandardizedError::new(ErrorCode::ExecutionFailed, outcome.error.clone()));
        self.error_details.push(format!("{}: {}", call.name, err.message));

        let reply = if should_retry(
            &self.session.config,
            &self.retry_policy,
            &self.history,
            &signature,
            err.code,
        ) {
            self.history.bump_retry(&signature);
            self.tool_retries += 1;
            retry_guidance(
                &call.name,
                self.history.retry_count(&signature),
                self.session.config.max_tool_retries,
                &err,
            )
        } else {
            final_error_message(&call.name, &err, self.history.retry_count(&signature))
        };
        self.session
            .push_message(Message::tool_result(&call.id, &call.name, reply));
        self.persist();
        Ok(StepOutcome::ToolExecuted {
            name: call.name,
            success: false,
        })
    }

    /// 收尾：按结果迁移会话状态并组装 RunResult；失败时回填最后的 assistant 文本
    pub(crate) fn conclude(&mut self, outcome: Result<String, AgentError>) -> RunResult {
        match outcome {
            Ok(text) => {
                self.transition(SessionStatus::Completed);
                RunResult {
                    final_response: text,
                    messages: self.session.messages.clone(),
                    tool_calls: self.tool_calls,
                    iterations: self.iterations,
                    success: true,
                    error: None,
                    tool_retries: self.tool_retries,
                    error_details: self.error_details.clone(),
                }
            }
            Err(e) => {
                self.transition(SessionStatus::Failed);
                let fallback = self
                    .session
                    .last_assistant_text()
                    .unwrap_or_default()
                    .to_string();
                self.error_details.push(e.to_string());
                RunResult {
                    final_response: fallback,
                    messages: self.session.messages.clone(),
                    tool_calls: self.tool_calls,
                    iterations: self.iterations,
                    success: false,
                    error: Some(e.to_string()),
                    tool_retries: self.tool_retries,
                    error_details: self.error_details.clone(),
                }
            }
        }
    }

    /// 运行级剩余预算；已超时则返回 DeadlineExceeded
    fn remaining_budget(&self) -> Result<Duration, AgentError> {
        let now = Instant::now();
        if now >= self.deadline {
            return Err(AgentError::DeadlineExceeded(self.session.config.timeout_secs));
        }
        Ok(self.deadline - now)
    }

    /// 会话落盘为至少一次语义：失败记日志但不终止 run
    fn persist(&mut self) {
        if let Some(mgr) = &self.sessions {
            if let Err(e) = mgr.save_session(&self.session) {
                tracing::warn!(session = %self.session.session_id, error = %e, "session save failed");
            }
        }
    }

    fn transition(&mut self, next: SessionStatus) {
        self.session.transition(next);
        self.persist();
    }
}
