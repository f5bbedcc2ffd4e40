//! Hive - Rust 智能体编排核心
//!
//! 入口：初始化日志、加载配置、对命令行给出的单条提示跑一次编排 run 并打印结果。

use anyhow::Context;
use hive::session::Command;
use hive::{create_components, load_config, run_command};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a coding agent. Use the available tools to \
inspect the workspace and accomplish the user's goal, then reply with a final summary.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with(fmt::layer())
        .init();

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let prompt = if prompt.is_empty() {
        "List the files in the workspace and summarize what you see.".to_string()
    } else {
        prompt
    };

    let config = load_config(None).context("Failed to load config")?;
    std::fs::create_dir_all(config.workspace_root())?;
    let components = create_components(config).context("Failed to create components")?;

    // 启动时清理过期会话
    let max_age = chrono::Duration::days(components.config.session.max_age_days);
    match components.sessions.cleanup_old_sessions(max_age) {
        Ok(removed) if removed > 0 => tracing::info!(removed, "cleaned up expired sessions"),
        Ok(_) => {}
        Err(e) => tracing::warn!("session cleanup failed: {e}"),
    }

    let result = run_command(
        &components,
        Command::Chat,
        DEFAULT_SYSTEM_PROMPT,
        &prompt,
        CancellationToken::new(),
    )
    .await
    .context("Run failed")?;

    let run = &result.run;
    tracing::info!(
        success = run.success,
        iterations = run.iterations,
        tool_calls = run.tool_calls,
        tool_retries = run.tool_retries,
        "run finished"
    );
    if let Some(err) = &run.error {
        eprintln!("error: {err}");
    }
    println!("{}", run.final_response);
    Ok(())
}
