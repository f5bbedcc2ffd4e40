//! 工具执行结果：成功数据或结构化错误
//!
//! 业务失败通过 ToolOutcome（success=false + standardized）表达；
//! Tool::execute 的 Err 只留给调用层失败（未知工具、参数非法），由 ToolExecutor 区分处理。
//! standardized 存在时为权威错误描述，error 字段由其派生。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 稳定的工具错误码，重试策略据此判定是否可通过修正参数恢复
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCode {
    /// 文件或资源不存在
    FileNotFound,
    /// 参数非法或缺失
    InvalidParameters,
    /// 无权限
    PermissionDenied,
    /// 单次调用超时
    Timeout,
    /// 目标已存在（重复创建类错误，修正参数无法解决）
    AlreadyExists,
    /// 工具不支持该操作
    UnsupportedOperation,
    /// 工具内部错误
    InternalError,
    /// 执行失败（通用）
    ExecutionFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FileNotFound => "file_not_found",
            ErrorCode::InvalidParameters => "invalid_parameters",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::Timeout => "timeout",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::UnsupportedOperation => "unsupported_operation",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::ExecutionFailed => "execution_failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 结构化工具错误：稳定错误码 + 可读消息 + 可执行的修正建议 + 细节键值
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StandardizedError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl StandardizedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestion: String::new(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// 单次工具执行的结果
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    /// 成功时的数据载荷（字符串或 JSON）
    #[serde(default)]
    pub data: serde_json::Value,
    /// 失败时非空；standardized 存在时由其派生
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standardized: Option<StandardizedError>,
}

impl ToolOutcome {
    pub fn ok(data: impl Into<serde_json::Value>) -> Self {
        Self {
            success: true,
            data: data.into(),
            error: String::new(),
            standardized: None,
        }
    }

    pub fn fail(err: StandardizedError) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: format!("[{}] {}", err.code, err.message),
            standardized: Some(err),
        }
    }

    /// 失败但没有结构化描述时的兜底（尽量少用，重试策略只能按通用失败处理）
    pub fn fail_plain(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: error.into(),
            standardized: None,
        }
    }

    /// 工具成功输出的展示文本：字符串原样，其余转 JSON
    pub fn render_data(&self) -> String {
        match &self.data {
            serde_json::Value::String(s) => s.clone(),
            v => v.to_string(),
        }
    }

    /// 错误码；无结构化错误时按通用失败处理
    pub fn error_code(&self) -> ErrorCode {
        self.standardized
            .as_ref()
            .map(|e| e.code)
            .unwrap_or(ErrorCode::ExecutionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_derives_error_string() {
        let out = ToolOutcome::fail(
            StandardizedError::new(ErrorCode::FileNotFound, "no such file: a.txt")
                .with_suggestion("check the path"),
        );
        assert!(!out.success);
        assert!(out.error.contains("file_not_found"));
        assert_eq!(out.error_code(), ErrorCode::FileNotFound);
    }

    #[test]
    fn test_render_string_data() {
        let out = ToolOutcome::ok("plain");
        assert_eq!(out.render_data(), "plain");
        let out = ToolOutcome::ok(serde_json::json!({"n": 1}));
        assert_eq!(out.render_data(), r#"{"n":1}"#);
    }
}
