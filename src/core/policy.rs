//! 运行策略：RunConfig 与可注入的启发式表
//!
//! RunConfig 为每次 run 的不可变策略，随会话持久化；planning / generation / review / chat
//! 预设对应不同的迭代数、工具白名单与重试预算。
//! CompletionPolicy 与 RetryPolicy 将原实现中的硬编码字面量（完成短语表、不可重试错误码集、
//! 重复错误中止阈值、单工具 60s 超时）收敛为可替换的策略对象，默认值保持原行为，测试可注入确定性表。

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tools::ErrorCode;

/// 单次 run 的不可变策略（创建后不再修改；恢复会话时从持久化内容加载）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// 最大循环迭代数
    pub max_iterations: usize,
    /// 推理端可见的工具白名单；空 = 不限制
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// 是否要求最终答案为经完成启发式判定的文本；false 时任意文本即终止
    #[serde(default = "default_true")]
    pub require_text_output: bool,
    /// 运行级超时（秒）
    pub timeout_secs: u64,
    /// 同一调用签名的最大重试次数
    pub max_tool_retries: u32,
    /// 是否允许「提示修正后重试」；关闭时任何工具失败都不重试
    #[serde(default = "default_true")]
    pub retry_with_modification: bool,
    /// 是否记录 ToolCallAttempt 台账并提供分析
    #[serde(default = "default_true")]
    pub enable_error_analysis: bool,
    /// 同一错误码重复超过阈值后不再重试
    #[serde(default)]
    pub abort_on_repeated_errors: bool,
    /// 单次工具调用超时（秒），与运行级超时独立，取二者剩余的较小值
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            allowed_tools: Vec::new(),
            require_text_output: true,
            timeout_secs: 300,
            max_tool_retries: 3,
            retry_with_modification: true,
            enable_error_analysis: true,
            abort_on_repeated_errors: false,
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl RunConfig {
    /// planning 预设：少迭代、只读工具、短超时、低重试预算、重复错误快速中止
    pub fn planning() -> Self {
        Self {
            max_iterations: 5,
            allowed_tools: vec![
                "read_file".to_string(),
                "list_dir".to_string(),
                "echo".to_string(),
            ],
            require_text_output: true,
            timeout_secs: 120,
            max_tool_retries: 1,
            retry_with_modification: true,
            enable_error_analysis: true,
            abort_on_repeated_errors: true,
            tool_timeout_secs: 30,
        }
    }

    /// generation 预设：更多迭代、允许变更类工具、宽松的重试预算
    pub fn generation() -> Self {
        Self {
            max_iterations: 15,
            allowed_tools: Vec::new(),
            require_text_output: true,
            timeout_secs: 600,
            max_tool_retries: 3,
            retry_with_modification: true,
            enable_error_analysis: true,
            abort_on_repeated_errors: false,
            tool_timeout_secs: 60,
        }
    }

    /// review 预设：最多迭代、测试/静态检查类工具、重复错误中止以避免来回震荡
    pub fn review() -> Self {
        Self {
            max_iterations: 20,
            allowed_tools: vec![
                "read_file".to_string(),
                "list_dir".to_string(),
                "shell".to_string(),
            ],
            require_text_output: true,
            timeout_secs: 900,
            max_tool_retries: 2,
            retry_with_modification: true,
            enable_error_analysis: true,
            abort_on_repeated_errors: true,
            tool_timeout_secs: 120,
        }
    }

    /// chat 预设：任意文本即终止，不要求完成启发式
    pub fn chat() -> Self {
        Self {
            max_iterations: 8,
            require_text_output: false,
            timeout_secs: 180,
            max_tool_retries: 2,
            ..Self::default()
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// 工具是否在白名单内（空白名单 = 全部允许）
    pub fn tool_allowed(&self, name: &str) -> bool {
        self.allowed_tools.is_empty() || self.allowed_tools.iter().any(|t| t == name)
    }
}

/// 完成判定策略：文本回复何时视为最终答案
#[derive(Clone, Debug)]
pub struct CompletionPolicy {
    /// 含任一短语（小写匹配）即视为最终答案
    pub completion_phrases: Vec<String>,
    /// 超过该长度且不含犹豫短语时视为最终答案
    pub min_final_len: usize,
    /// 犹豫短语：命中则长文本也不算最终答案
    pub hedge_phrases: Vec<String>,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            completion_phrases: [
                "task completed",
                "finished",
                "done",
                "complete",
                "successfully",
                "final result",
                "conclusion",
                "summary",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            min_final_len: 100,
            hedge_phrases: vec!["need to".to_string(), "should".to_string()],
        }
    }
}

impl CompletionPolicy {
    /// 判定文本是否为最终答案：迭代数达到上限、命中完成短语、或长且不含犹豫短语
    pub fn is_final(&self, content: &str, iteration: usize, max_iterations: usize) -> bool {
        if iteration + 1 >= max_iterations {
            return true;
        }
        let lowered = content.trim().to_lowercase();
        if self.completion_phrases.iter().any(|p| lowered.contains(p)) {
            return true;
        }
        lowered.len() > self.min_final_len && !self.hedge_phrases.iter().any(|p| lowered.contains(p))
    }
}

/// 重试判定策略：不可重试错误码集合与重复错误中止阈值
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// 修正参数无法解决的错误码，直接不重试
    pub non_retriable: BTreeSet<ErrorCode>,
    /// abort_on_repeated_errors 开启时，同一错误码出现超过该次数即不再重试
    pub repeat_abort_threshold: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            non_retriable: [
                ErrorCode::UnsupportedOperation,
                ErrorCode::InternalError,
                ErrorCode::AlreadyExists,
            ]
            .into_iter()
            .collect(),
            repeat_abort_threshold: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_phrase_hit() {
        let p = CompletionPolicy::default();
        assert!(p.is_final("Task completed, all files patched.", 0, 10));
        assert!(p.is_final("  DONE  ", 0, 10));
    }

    #[test]
    fn test_completion_long_text_without_hedge() {
        let p = CompletionPolicy::default();
        let long = "x".repeat(150);
        assert!(p.is_final(&long, 0, 10));
        let hedged = format!("{} we still need to run the tests", "x".repeat(120));
        assert!(!p.is_final(&hedged, 0, 10));
    }

    #[test]
    fn test_completion_at_iteration_cap() {
        let p = CompletionPolicy::default();
        assert!(p.is_final("short", 9, 10));
        assert!(!p.is_final("short", 3, 10));
    }

    #[test]
    fn test_presets_shape() {
        assert!(RunConfig::planning().max_iterations < RunConfig::review().max_iterations);
        assert!(RunConfig::planning().abort_on_repeated_errors);
        assert!(!RunConfig::chat().require_text_output);
        assert!(RunConfig::generation().allowed_tools.is_empty());
    }

    #[test]
    fn test_tool_allowed() {
        let cfg = RunConfig::planning();
        assert!(cfg.tool_allowed("read_file"));
        assert!(!cfg.tool_allowed("shell"));
        assert!(RunConfig::default().tool_allowed("anything"));
    }
}
