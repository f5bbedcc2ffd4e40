//! 会话持久化：目录下每会话一个 JSON 文件
//!
//! create / save / load / list / delete / cleanup / export；save 在编排循环的每次
//! 变更后调用（至少一次、非事务），采用先写临时文件再 rename 的方式避免写坏文件。
//! 跨进程对同一 session_id 并发写入不加锁，单写者由调用方保证。
//! 恢复契约：resume 要求 model 与 system_prompt 与持久化内容完全一致，否则硬错误；
//! paused 会话在 resume 时转回 running。

use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};

use crate::core::policy::RunConfig;
use crate::core::AgentError;
use crate::session::{Command, SessionState, SessionStatus};

/// 会话文件扩展名
const SESSION_EXT: &str = "json";

/// 会话管理器：固定目录下的文件式存储
#[derive(Clone, Debug)]
pub struct SessionManager {
    dir: PathBuf,
}

impl SessionManager {
    /// 创建管理器；目录不存在时建立
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, AgentError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{SESSION_EXT}"))
    }

    /// 新建会话：分配全局唯一 ID，初始状态 running，立即落盘
    pub fn create_session(
        &self,
        system_prompt: impl Into<String>,
        model: impl Into<String>,
        command: Command,
        config: RunConfig,
        workspace_root: PathBuf,
    ) -> Result<SessionState, AgentError> {
        let state = SessionState::new(system_prompt, model, command, config, workspace_root);
        self.save_session(&state)?;
        Ok(state)
    }

    /// 序列化整个状态并覆盖会话文件；先写 .tmp 再 rename，避免留下写了一半的文件
    pub fn save_session(&self, state: &SessionState) -> Result<(), AgentError> {
        let path = self.session_path(&state.session_id);
        let tmp = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(state)?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// 读取会话；文件不存在时返回 SessionNotFound
    pub fn load_session(&self, id: &str) -> Result<SessionState, AgentError> {
        let path = self.session_path(id);
        if !path.exists() {
            return Err(AgentError::SessionNotFound(id.to_string()));
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// 恢复会话：校验 model / system_prompt 完全一致（防止在不同推理配置下
    /// 静默续写对话），paused 转回 running。校验失败是硬错误，发生在任何推理调用之前。
    pub fn load_for_resume(
        &self,
        id: &str,
        model: &str,
        system_prompt: &str,
    ) -> Result<SessionState, AgentError> {
        let mut state = self.load_session(id)?;
        if state.model != model {
            return Err(AgentError::SessionMismatch(format!(
                "session '{}' was recorded with model '{}', resume requested '{}'",
                id, state.model, model
            )));
        }
        if state.system_prompt != system_prompt {
            return Err(AgentError::SessionMismatch(format!(
                "session '{}' system prompt differs from the persisted one",
                id
            )));
        }
        if state.current_state == SessionStatus::Paused {
            state.transition(SessionStatus::Running);
            self.save_session(&state)?;
        }
        Ok(state)
    }

    /// 枚举目录下的全部会话 ID
    pub fn list_sessions(&self) -> Result<Vec<String>, AgentError> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(SESSION_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn delete_session(&self, id: &str) -> Result<(), AgentError> {
        let path = self.session_path(id);
        if !path.exists() {
            return Err(AgentError::SessionNotFound(id.to_string()));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    /// 状态迁移并落盘；进入终态时 SessionState 盖上 end_time
    pub fn update_session_state(
        &self,
        state: &mut SessionState,
        next: SessionStatus,
    ) -> Result<(), AgentError> {
        state.transition(next);
        self.save_session(state)
    }

    /// 删除 start_time 早于 now - max_age 的会话，返回删除数
    pub fn cleanup_old_sessions(&self, max_age: Duration) -> Result<usize, AgentError> {
        let cutoff = Utc::now() - max_age;
        let mut removed = 0;
        for id in self.list_sessions()? {
            match self.load_session(&id) {
                Ok(state) if state.start_time < cutoff => {
                    self.delete_session(&id)?;
                    removed += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    // 读不出来的会话文件保留，人工处理
                    tracing::warn!(session = %id, error = %e, "skipping unreadable session during cleanup");
                }
            }
        }
        Ok(removed)
    }

    /// 将会话的 ToolCallRecord 逐条以 JSON 行导出，供离线分析
    pub fn export_session_to_jsonl(&self, id: &str, path: impl AsRef<Path>) -> Result<(), AgentError> {
        let state = self.load_session(id)?;
        let mut lines = String::new();
        for record in &state.tool_calls {
            lines.push_str(&serde_json::to_string(record)?);
            lines.push('\n');
        }
        std::fs::write(path, lines)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;

    fn manager() -> (tempfile::TempDir, SessionManager) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SessionManager::new(dir.path()).unwrap();
        (dir, mgr)
    }

    fn create(mgr: &SessionManager) -> SessionState {
        mgr.create_session("sys", "m1", Command::Chat, RunConfig::default(), PathBuf::new())
            .unwrap()
    }

    #[test]
    fn test_create_save_load_roundtrip() {
        let (_dir, mgr) = manager();
        let mut state = create(&mgr);
        state.push_message(Message::user("hello"));
        state.push_message(Message::assistant("hi"));
        mgr.save_session(&state).unwrap();

        let loaded = mgr.load_session(&state.session_id).unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.model, "m1");
        assert_eq!(loaded.current_state, SessionStatus::Running);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let (_dir, mgr) = manager();
        assert!(matches!(
            mgr.load_session("missing"),
            Err(AgentError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_resume_validates_model_and_prompt() {
        let (_dir, mgr) = manager();
        let state = create(&mgr);
        assert!(mgr.load_for_resume(&state.session_id, "m1", "sys").is_ok());
        assert!(matches!(
            mgr.load_for_resume(&state.session_id, "m2", "sys"),
            Err(AgentError::SessionMismatch(_))
        ));
        assert!(matches!(
            mgr.load_for_resume(&state.session_id, "m1", "other"),
            Err(AgentError::SessionMismatch(_))
        ));
    }

    #[test]
    fn test_resume_unpauses() {
        let (_dir, mgr) = manager();
        let mut state = create(&mgr);
        mgr.update_session_state(&mut state, SessionStatus::Paused).unwrap();
        let resumed = mgr.load_for_resume(&state.session_id, "m1", "sys").unwrap();
        assert_eq!(resumed.current_state, SessionStatus::Running);
    }

    #[test]
    fn test_list_and_delete() {
        let (_dir, mgr) = manager();
        let a = create(&mgr);
        let b = create(&mgr);
        let mut ids = mgr.list_sessions().unwrap();
        ids.sort();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.session_id));
        mgr.delete_session(&b.session_id).unwrap();
        assert_eq!(mgr.list_sessions().unwrap().len(), 1);
        assert!(matches!(
            mgr.delete_session(&b.session_id),
            Err(AgentError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_cleanup_old_sessions() {
        let (_dir, mgr) = manager();
        let mut old = create(&mgr);
        old.start_time = Utc::now() - Duration::days(30);
        mgr.save_session(&old).unwrap();
        let fresh = create(&mgr);

        let removed = mgr.cleanup_old_sessions(Duration::days(7)).unwrap();
        assert_eq!(removed, 1);
        let ids = mgr.list_sessions().unwrap();
        assert_eq!(ids, vec![fresh.session_id.clone()]);
    }

    #[test]
    fn test_export_jsonl() {
        let (dir, mgr) = manager();
        let mut state = create(&mgr);
        for i in 0..2 {
            state.record_tool_call(crate::session::ToolCallRecord {
                id: format!("r{i}"),
                timestamp: Utc::now(),
                tool_name: "echo".to_string(),
                parameters: serde_json::json!({"text": "hi"}),
                result: crate::session::ToolCallResult {
                    success: true,
                    data: serde_json::json!("hi"),
                    error: String::new(),
                },
                duration_ms: 1,
                success: true,
                error: String::new(),
                iteration: i,
            });
        }
        mgr.save_session(&state).unwrap();

        let out = dir.path().join("export.jsonl");
        mgr.export_session_to_jsonl(&state.session_id, &out).unwrap();
        let text = std::fs::read_to_string(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["tool_name"], "echo");
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let (dir, mgr) = manager();
        let state = create(&mgr);
        mgr.save_session(&state).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
