//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时上限，execute(call, remaining) 在
//! min(单次超时, 运行剩余预算) 内调用工具；超时转为普通的 Timeout 业务失败
//! （与其它工具错误走同一重试策略），Err 仅表示调用层失败（未知工具、参数非法）。
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::session::ToolCallRequest;
use crate::tools::{ErrorCode, StandardizedError, ToolOutcome, ToolRegistry};

/// 调用层失败：工具不存在或参数无法送达工具本身
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    UnknownTool(String),
    MalformedArguments(String),
}

impl std::fmt::Display for InvocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvocationError::UnknownTool(name) => write!(f, "Unknown tool: {name}"),
            InvocationError::MalformedArguments(msg) => write!(f, "Malformed arguments: {msg}"),
        }
    }
}

/// 工具执行器：对每次调用施加 min(单次超时, 剩余运行预算) 的截止时间
pub struct ToolExecutor {
    registry: ToolRegistry,
    call_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, call_timeout_secs: u64) -> Self {
        Self {
            registry,
            call_timeout: Duration::from_secs(call_timeout_secs),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 执行一次工具调用。remaining 为运行级超时的剩余预算，截止时间取二者较小值；
    /// 超时作为 Timeout 业务失败返回（Ok），调用层失败返回 Err。
    pub async fn execute(
        &self,
        call: &ToolCallRequest,
        remaining: Option<Duration>,
    ) -> Result<ToolOutcome, InvocationError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| InvocationError::UnknownTool(call.name.clone()))?;

        if !call.arguments.is_object() && !call.arguments.is_null() {
            return Err(InvocationError::MalformedArguments(format!(
                "expected a JSON object, got {}",
                call.arguments
            )));
        }

        let budget = match remaining {
            Some(r) => self.call_timeout.min(r),
            None => self.call_timeout,
        };

        let start = Instant::now();
        let result = timeout(budget, tool.execute(call.arguments.clone())).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (ok, disposition): (bool, &str) = match &result {
            Ok(Ok(outcome)) if outcome.success => (true, "ok"),
            Ok(Ok(_)) => (false, "error"),
            Ok(Err(_)) => (false, "invocation_error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": ok,
            "disposition": disposition,
            "duration_ms": duration_ms,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(InvocationError::MalformedArguments(e)),
            Err(_) => Ok(ToolOutcome::fail(
                StandardizedError::new(
                    ErrorCode::Timeout,
                    format!("tool '{}' timed out after {}s", call.name, budget.as_secs()),
                )
                .with_suggestion("retry with a smaller scope or raise the tool timeout"),
            )),
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    fn call(name: &str, args: serde_json::Value) -> ToolCallRequest {
        ToolCallRequest {
            name: name.to_string(),
            arguments: args,
            id: "t1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invocation_error() {
        let exec = ToolExecutor::new(ToolRegistry::new(), 5);
        let err = exec
            .execute(&call("nope", serde_json::json!({})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_non_object_args_rejected() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        let exec = ToolExecutor::new(reg, 5);
        let err = exec
            .execute(&call("echo", serde_json::json!([1, 2])), None)
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::MalformedArguments(_)));
    }

    #[tokio::test]
    async fn test_echo_roundtrip() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        let exec = ToolExecutor::new(reg, 5);
        let out = exec
            .execute(&call("echo", serde_json::json!({"text": "hi"})), None)
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.render_data(), "hi");
    }
}
