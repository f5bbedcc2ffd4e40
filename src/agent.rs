//! Headless 组合层
//!
//! 供调用方使用的薄封装：create_components 按配置构建推理客户端、工具注册表与
//! 会话管理器；run_command 按 Command 选择预设 RunConfig，并按配置决定走基础循环
//! 还是审议装饰器（审议关闭时为纯透传）；resume_command 按恢复契约续跑已有会话。

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{
    AgentError, AgentRunner, DeliberationResult, DeliberationRunner, RunConfig,
};
use crate::llm::{OpenAiReasoningClient, ReasoningClient, ScriptedClient};
use crate::session::{Command, SessionManager};
use crate::tools::{EchoTool, ListDirTool, ReadFileTool, ShellTool, ToolExecutor, ToolRegistry};

/// 预构建的组件：推理客户端与会话管理器可多次 run 共享；
/// ToolExecutor 由每次 run 单独构建（registry 不可共享克隆）
pub struct AgentComponents {
    pub client: Arc<dyn ReasoningClient>,
    pub sessions: SessionManager,
    pub config: AppConfig,
}

/// 按配置创建组件：scripted 后端用于离线运行，其余走 OpenAI 兼容端点
pub fn create_components(config: AppConfig) -> Result<AgentComponents, AgentError> {
    let client: Arc<dyn ReasoningClient> = match config.llm.provider.as_str() {
        "scripted" => Arc::new(ScriptedClient::default()),
        _ => Arc::new(OpenAiReasoningClient::new(
            config.llm.base_url.as_deref(),
            None,
        )),
    };
    let sessions = SessionManager::new(config.session_dir())?;
    Ok(AgentComponents {
        client,
        sessions,
        config,
    })
}

/// 构建本仓库内置的工具集（echo / read_file / list_dir / shell）
pub fn build_registry(workspace: &Path, config: &AppConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    registry.register(ReadFileTool::new(workspace));
    registry.register(ListDirTool::new(workspace));
    registry.register(ShellTool::new(config.tools.shell_allowed_commands.clone()));
    registry
}

/// Command 预设之上套用配置：[tools] 的单次调用超时与 [runner] 的全局开关；
/// chat 没有专门的预算预设，完整采用 [runner] 段
fn run_config_for(command: Command, config: &AppConfig) -> RunConfig {
    let mut run_config = command.preset();
    if command == Command::Chat {
        run_config.max_iterations = config.runner.max_iterations;
        run_config.timeout_secs = config.runner.timeout_secs;
        run_config.max_tool_retries = config.runner.max_tool_retries;
        run_config.abort_on_repeated_errors = config.runner.abort_on_repeated_errors;
    }
    run_config.retry_with_modification = config.runner.retry_with_modification;
    run_config.enable_error_analysis = config.runner.enable_error_analysis;
    run_config.tool_timeout_secs = config.tools.tool_timeout_secs;
    run_config
}

/// 执行一次编排 run：新建会话，按配置选择基础循环或审议装饰器。
/// 返回 DeliberationResult——审议关闭时内嵌的 run 即基础循环结果，审议台账为空。
pub async fn run_command(
    components: &AgentComponents,
    command: Command,
    system_prompt: &str,
    prompt: &str,
    cancel: CancellationToken,
) -> Result<DeliberationResult, AgentError> {
    let workspace = components.config.workspace_root();
    let run_config = run_config_for(command, &components.config);
    let session = components.sessions.create_session(
        system_prompt,
        &components.config.llm.model,
        command,
        run_config.clone(),
        workspace.clone(),
    )?;

    let executor = ToolExecutor::new(
        build_registry(&workspace, &components.config),
        run_config.tool_timeout_secs,
    );
    let base = AgentRunner::new(components.client.clone(), executor, session)
        .with_session_manager(components.sessions.clone())
        .with_cancel_token(cancel);

    let mut runner = DeliberationRunner::new(base, components.config.deliberation.clone());
    Ok(runner.run_with_deliberation(prompt).await)
}

/// 恢复已持久化的会话并继续：model / system prompt 必须与持久化内容一致（硬错误，
/// 发生在任何推理调用之前）；paused 会话转回 running。
pub async fn resume_command(
    components: &AgentComponents,
    session_id: &str,
    system_prompt: &str,
    prompt: &str,
    cancel: CancellationToken,
) -> Result<DeliberationResult, AgentError> {
    let session = components.sessions.load_for_resume(
        session_id,
        &components.config.llm.model,
        system_prompt,
    )?;
    let workspace = session.workspace_root.clone();
    let executor = ToolExecutor::new(
        build_registry(&workspace, &components.config),
        session.config.tool_timeout_secs,
    );
    let base = AgentRunner::new(components.client.clone(), executor, session)
        .with_session_manager(components.sessions.clone())
        .with_cancel_token(cancel);

    let mut runner = DeliberationRunner::new(base, components.config.deliberation.clone());
    Ok(runner.run_with_deliberation(prompt).await)
}
