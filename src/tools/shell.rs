//! Shell 执行器：白名单命令，禁止危险操作
//!
//! 仅允许配置中的命令名（首词，如 ls、grep、cargo）；禁止 rm -rf、chmod 777 等子串；
//! 执行通过 sh -c / cmd /C。非零退出码作为 ExecutionFailed 业务失败返回，
//! 超时由外层 ToolExecutor 统一施加。

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::{ErrorCode, StandardizedError, Tool, ToolOutcome};

/// 禁止的命令/子串（即使白名单中有同名，也不允许带这些参数）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rm -r",
    "wget ",
    "curl | sh",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:", // fork bomb
];

/// Shell 工具：仅允许白名单内命令
pub struct ShellTool {
    allowed_commands: HashSet<String>,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        let allowed_commands = allowed_commands.into_iter().map(|s| s.to_lowercase()).collect();
        Self { allowed_commands }
    }

    /// 解析命令：只取第一个 token 作为命令名
    fn command_name<'a>(&self, raw: &'a str) -> &'a str {
        raw.split_whitespace().next().unwrap_or("")
    }

    fn check_allowed(&self, raw: &str) -> Result<(), StandardizedError> {
        let raw_lower = raw.to_lowercase();
        for forbidden in FORBIDDEN_SUBSTR {
            if raw_lower.contains(forbidden) {
                return Err(StandardizedError::new(
                    ErrorCode::PermissionDenied,
                    format!("forbidden pattern: {forbidden}"),
                )
                .with_suggestion("use a safe, read-only command"));
            }
        }
        let name = self.command_name(&raw_lower);
        if name.is_empty() {
            return Err(StandardizedError::new(
                ErrorCode::InvalidParameters,
                "empty command",
            )
            .with_detail("param", "command"));
        }
        if self.allowed_commands.contains(name) {
            return Ok(());
        }
        Err(StandardizedError::new(
            ErrorCode::PermissionDenied,
            format!("command '{name}' not in allowlist"),
        )
        .with_suggestion("use one of the allowed commands")
        .with_detail("command", name))
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a whitelisted shell command. Args: {\"command\": \"ls -la\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute (first word must be in the allowlist)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutcome, String> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if let Err(e) = self.check_allowed(&command) {
            return Ok(ToolOutcome::fail(e));
        }

        let output = if cfg!(target_os = "windows") {
            Command::new("cmd").args(["/C", &command]).output().await
        } else {
            Command::new("sh").args(["-c", &command]).output().await
        };

        let output = match output {
            Ok(o) => o,
            Err(e) => {
                return Ok(ToolOutcome::fail(
                    StandardizedError::new(
                        ErrorCode::InternalError,
                        format!("failed to spawn shell: {e}"),
                    )
                    .with_detail("command", command),
                ))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if output.status.success() {
            Ok(ToolOutcome::ok(stdout))
        } else {
            Ok(ToolOutcome::fail(
                StandardizedError::new(
                    ErrorCode::ExecutionFailed,
                    format!("command exited with {}", output.status),
                )
                .with_suggestion("inspect stderr and adjust the command")
                .with_detail("command", command)
                .with_detail("stderr", stderr.chars().take(500).collect::<String>()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> ShellTool {
        ShellTool::new(vec!["echo".to_string(), "false".to_string()])
    }

    #[tokio::test]
    async fn test_allowlisted_command_runs() {
        let out = tool()
            .execute(serde_json::json!({"command": "echo hi"}))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.render_data().trim(), "hi");
    }

    #[tokio::test]
    async fn test_unlisted_command_denied() {
        let out = tool()
            .execute(serde_json::json!({"command": "uname -a"}))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.error_code(), ErrorCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_forbidden_pattern_denied() {
        let out = tool()
            .execute(serde_json::json!({"command": "echo rm -rf /"}))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.error_code(), ErrorCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_failed() {
        let out = tool()
            .execute(serde_json::json!({"command": "false"}))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.error_code(), ErrorCode::ExecutionFailed);
    }
}
