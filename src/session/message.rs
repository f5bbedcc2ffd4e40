//! 对话模型：消息与工具调用请求
//!
//! Message 是会话中的一轮（system / user / assistant / tool），由 SessionState 独占持有，
//! 只追加、不原地修改；assistant 消息的主载荷为 content 或 tool_call 二选一，
//! tool 消息必须携带 tool_call_id 与 tool_name 以对应具体的调用。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 推理端发起的一次工具调用请求
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// 工具名（对应 ToolRegistry 中的注册名）
    pub name: String,
    /// 参数（JSON 对象）
    pub arguments: serde_json::Value,
    /// 调用 ID，用于将 tool 消息关联回本次调用
    pub id: String,
}

impl ToolCallRequest {
    /// 调用签名 = 工具名 + 序列化参数，作为重试计数的键。
    /// serde_json 默认按键排序，因此相同参数得到相同签名。
    pub fn signature(&self) -> String {
        format!("{}:{}", self.name, self.arguments)
    }
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// assistant 发起工具调用时设置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRequest>,
    /// tool 消息回答的调用 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// tool 消息对应的工具名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_call: None,
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call: None,
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call: None,
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// assistant 的工具调用消息：主载荷为 tool_call，content 为空
    pub fn assistant_tool_call(call: ToolCallRequest) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_call: Some(call),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// tool 消息：回答指定调用，content 为工具输出或错误说明
    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call: None,
            tool_call_id: Some(call_id.into()),
            tool_name: Some(tool_name.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_deterministic() {
        let a = ToolCallRequest {
            name: "read_file".to_string(),
            arguments: serde_json::json!({"path": "a.txt", "limit": 10}),
            id: "c1".to_string(),
        };
        let b = ToolCallRequest {
            name: "read_file".to_string(),
            arguments: serde_json::json!({"limit": 10, "path": "a.txt"}),
            id: "c2".to_string(),
        };
        // 键序不同但签名一致（serde_json Map 按键排序）
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_tool_result_carries_call_id() {
        let m = Message::tool_result("c1", "echo", "hi");
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(m.tool_name.as_deref(), Some("echo"));
    }

    #[test]
    fn test_roundtrip_serde() {
        let m = Message::assistant_tool_call(ToolCallRequest {
            name: "echo".to_string(),
            arguments: serde_json::json!({"text": "hi"}),
            id: "c9".to_string(),
        });
        let s = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&s).unwrap();
        assert_eq!(back.tool_call.unwrap().id, "c9");
    }
}
