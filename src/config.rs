//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，
//! 如 `HIVE__LLM__MODEL=gpt-4o-mini`、`HIVE__DELIBERATION__ENABLED=true`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::DeliberationConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub runner: RunnerSection,
    pub deliberation: DeliberationConfig,
    pub tools: ToolsSection,
    pub session: SessionSection,
}

/// [app] 段：应用名与工作目录
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 工具沙箱根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
}

/// [llm] 段：后端与模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / scripted（scripted 用于离线运行与测试）
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        }
    }
}

/// [runner] 段：基础循环的默认预算（各 Command 预设在此之上调整）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    pub max_iterations: usize,
    pub timeout_secs: u64,
    pub max_tool_retries: u32,
    pub retry_with_modification: bool,
    pub enable_error_analysis: bool,
    pub abort_on_repeated_errors: bool,
}

impl Default for RunnerSection {
    fn default() -> Self {
        let d = crate::core::RunConfig::default();
        Self {
            max_iterations: d.max_iterations,
            timeout_secs: d.timeout_secs,
            max_tool_retries: d.max_tool_retries,
            retry_with_modification: d.retry_with_modification,
            enable_error_analysis: d.enable_error_analysis,
            abort_on_repeated_errors: d.abort_on_repeated_errors,
        }
    }
}

/// [tools] 段：单次工具调用超时与 Shell 白名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒），与运行级超时独立
    pub tool_timeout_secs: u64,
    pub shell_allowed_commands: Vec<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 60,
            shell_allowed_commands: vec![
                "ls".into(),
                "grep".into(),
                "cat".into(),
                "head".into(),
                "tail".into(),
                "wc".into(),
                "find".into(),
                "cargo".into(),
                "rustc".into(),
                "git".into(),
            ],
        }
    }
}

/// [session] 段：会话文件目录与清理窗口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// 会话文件目录；未设置时用 <workspace_root>/.hive/sessions
    pub dir: Option<PathBuf>,
    /// cleanup 删除早于该天数的会话
    pub max_age_days: i64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            dir: None,
            max_age_days: 30,
        }
    }
}

impl AppConfig {
    pub fn workspace_root(&self) -> PathBuf {
        self.app
            .workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("workspace"))
    }

    pub fn session_dir(&self) -> PathBuf {
        self.session
            .dir
            .clone()
            .unwrap_or_else(|| self.workspace_root().join(".hive").join("sessions"))
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "openai");
        assert!(!cfg.deliberation.enabled);
        assert_eq!(cfg.tools.tool_timeout_secs, 60);
        assert!(cfg.session_dir().ends_with(".hive/sessions"));
    }
}
