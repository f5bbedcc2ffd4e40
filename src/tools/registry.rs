//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），
//! 由 ToolRegistry 按名注册与查找；ToolExecutor 在调用时加超时并输出审计日志。
//! execute 的 Err 保留给调用层失败，业务失败必须走 ToolOutcome。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolDefinition;
use crate::tools::ToolOutcome;

/// 工具 trait：名称、描述（供推理端理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（推理端调用时使用）
    fn name(&self) -> &str;

    /// 工具描述（供推理端理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供推理端生成正确的参数格式）
    /// 默认返回空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；Err 仅表示调用层失败（如参数无法解码），业务失败返回 ToolOutcome
    async fn execute(&self, args: Value) -> Result<ToolOutcome, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，支持 register / get / tool_names / definitions
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 推理端可见的工具定义；allowed 非空时按白名单过滤
    pub fn definitions(&self, allowed: &[String]) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .filter(|t| allowed.is_empty() || allowed.iter().any(|a| a == t.name()))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    #[test]
    fn test_register_and_lookup() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        assert!(reg.get("echo").is_some());
        assert!(reg.get("missing").is_none());
        assert_eq!(reg.tool_names(), vec!["echo".to_string()]);
    }

    #[test]
    fn test_definitions_filtered() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        assert_eq!(reg.definitions(&[]).len(), 1);
        assert_eq!(reg.definitions(&["other".to_string()]).len(), 0);
        assert_eq!(reg.definitions(&["echo".to_string()]).len(), 1);
    }
}
