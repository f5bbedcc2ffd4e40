//! 沙箱文件系统工具
//!
//! SafeFs 绑定 root_dir，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸）；
//! ReadFileTool / ListDirTool 基于 SafeFs 提供只读能力，失败以结构化错误码返回。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{ErrorCode, StandardizedError, Tool, ToolOutcome};

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    /// 检查路径是否在沙箱内
    fn resolve(&self, path: &str) -> Result<PathBuf, StandardizedError> {
        let path = path.trim_start_matches("./");
        let full = self.root_dir.join(path);
        let canonical = full.canonicalize().map_err(|_| {
            StandardizedError::new(ErrorCode::FileNotFound, format!("path not found: {path}"))
                .with_suggestion("list the directory first to find the correct path")
                .with_detail("path", path)
        })?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            // 如 ../../etc/passwd
            Err(
                StandardizedError::new(
                    ErrorCode::PermissionDenied,
                    format!("path escapes the workspace: {path}"),
                )
                .with_suggestion("use a path relative to the workspace root")
                .with_detail("path", path),
            )
        }
    }

    fn read_file(&self, path: &str) -> Result<String, StandardizedError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved).map_err(|e| {
            StandardizedError::new(ErrorCode::ExecutionFailed, format!("read failed: {e}"))
                .with_detail("path", path)
        })
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>, StandardizedError> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let entries = std::fs::read_dir(&base).map_err(|e| {
            StandardizedError::new(ErrorCode::ExecutionFailed, format!("list failed: {e}"))
                .with_detail("path", path)
        })?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                StandardizedError::new(ErrorCode::ExecutionFailed, e.to_string())
            })?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let suffix = if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                out.push(format!("{name}{suffix}"));
            }
        }
        out.sort();
        Ok(out)
    }
}

/// 读取文件内容（只读）
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self { fs: SafeFs::new(root_dir) }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read file contents. Args: {\"path\": \"file path relative to workspace\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path relative to the workspace root" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutcome, String> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
        if path.is_empty() {
            return Ok(ToolOutcome::fail(
                StandardizedError::new(ErrorCode::InvalidParameters, "missing 'path' argument")
                    .with_detail("param", "path"),
            ));
        }
        Ok(match self.fs.read_file(path) {
            Ok(content) => ToolOutcome::ok(content),
            Err(e) => ToolOutcome::fail(e),
        })
    }
}

/// 列出目录
pub struct ListDirTool {
    fs: SafeFs,
}

impl ListDirTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self { fs: SafeFs::new(root_dir) }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List directory entries. Args: {\"path\": \"directory relative to workspace, empty for root\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path relative to the workspace root" }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutcome, String> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
        Ok(match self.fs.list_dir(path) {
            Ok(entries) => ToolOutcome::ok(serde_json::json!(entries)),
            Err(e) => ToolOutcome::fail(e),
        })
    }
}
