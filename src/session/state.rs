//! 会话状态：可恢复 run 的持久化单元
//!
//! SessionState 持有完整对话与工具调用审计账（ToolCallRecord，只追加、不修改），
//! 每次循环迭代后由 Runner 持久化；completed / failed 为终态并盖上 end_time。
//! 同一 session_id 同时只允许一个 Runner 实例持有（单写者前提，存储层不加锁）。

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::policy::RunConfig;
use crate::session::Message;

/// 发起 run 的使用场景
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Plan,
    Generate,
    Review,
    Chat,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Plan => "plan",
            Command::Generate => "generate",
            Command::Review => "review",
            Command::Chat => "chat",
        }
    }

    /// 该场景的预设 RunConfig
    pub fn preset(&self) -> RunConfig {
        match self {
            Command::Plan => RunConfig::planning(),
            Command::Generate => RunConfig::generation(),
            Command::Review => RunConfig::review(),
            Command::Chat => RunConfig::chat(),
        }
    }
}

/// 会话生命周期状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// 持久化的工具调用结果（嵌在 ToolCallRecord 中）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub success: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub error: String,
}

/// 工具调用的持久化审计记录：每次实际执行追加一条，不修改、不删除
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    /// 原始参数
    pub parameters: serde_json::Value,
    pub result: ToolCallResult,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default)]
    pub error: String,
    /// 发生时的循环迭代序号（从 0 开始）
    pub iteration: usize,
}

/// 可恢复的会话状态：一次编排 run 的全部持久化内容
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionState {
    /// 全局唯一 ID（uuid v4）
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    /// 活跃期间为 None，进入终态时盖章
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub system_prompt: String,
    pub model: String,
    pub config: RunConfig,
    /// 只追加的完整对话
    #[serde(default)]
    pub messages: Vec<Message>,
    /// 只追加的工具调用审计账
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    pub current_state: SessionStatus,
    #[serde(default)]
    pub workspace_root: PathBuf,
    pub command: Command,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl SessionState {
    pub fn new(
        system_prompt: impl Into<String>,
        model: impl Into<String>,
        command: Command,
        config: RunConfig,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            start_time: Utc::now(),
            end_time: None,
            system_prompt: system_prompt.into(),
            model: model.into(),
            config,
            messages: Vec::new(),
            tool_calls: Vec::new(),
            current_state: SessionStatus::Running,
            workspace_root,
            command,
            metadata: BTreeMap::new(),
        }
    }

    pub fn push_message(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn record_tool_call(&mut self, record: ToolCallRecord) {
        self.tool_calls.push(record);
    }

    /// 状态迁移；进入终态时盖上 end_time
    pub fn transition(&mut self, next: SessionStatus) {
        self.current_state = next;
        if next.is_terminal() {
            self.end_time = Some(Utc::now());
        }
    }

    /// 最后一条非空的 assistant 文本（迭代耗尽时的兜底回复）
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == crate::session::Role::Assistant)
            .map(|m| m.content.trim())
            .find(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionState {
        SessionState::new("sys", "test-model", Command::Chat, RunConfig::default(), PathBuf::new())
    }

    #[test]
    fn test_terminal_transition_stamps_end_time() {
        let mut s = session();
        assert!(s.end_time.is_none());
        s.transition(SessionStatus::Paused);
        assert!(s.end_time.is_none());
        s.transition(SessionStatus::Completed);
        assert!(s.end_time.is_some());
    }

    #[test]
    fn test_last_assistant_text_skips_tool_calls() {
        let mut s = session();
        s.push_message(Message::user("hi"));
        s.push_message(Message::assistant("partial answer"));
        s.push_message(Message::assistant_tool_call(crate::session::ToolCallRequest {
            name: "echo".to_string(),
            arguments: serde_json::json!({}),
            id: "c1".to_string(),
        }));
        assert_eq!(s.last_assistant_text(), Some("partial answer"));
    }

    #[test]
    fn test_unique_ids() {
        assert_ne!(session().session_id, session().session_id);
    }
}
