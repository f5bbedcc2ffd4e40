//! 错误分类与重试判定
//!
//! 给定工具失败的错误码与该调用签名的已重试次数，按固定顺序的规则判定是否重试；
//! ErrorHistory 维护 run 级的尝试台账（ToolCallAttempt）、按签名的重试计数与按错误码的
//! 出现计数，新 run 时重置。台账只用于重复错误中止启发式与 analytics，不随会话持久化。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::policy::{RetryPolicy, RunConfig};
use crate::tools::{ErrorCode, StandardizedError};

/// 一次工具调用尝试的审计记录（run 级、临时；与持久化的 ToolCallRecord 区分）
#[derive(Clone, Debug, Serialize)]
pub struct ToolCallAttempt {
    pub tool_name: String,
    /// 同一调用签名下的第几次尝试（从 1 开始）
    pub attempt_number: u32,
    pub serialized_parameters: String,
    /// 成功时为空
    pub error_code: String,
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
}

/// run 级错误分析汇总
#[derive(Clone, Debug, Serialize)]
pub struct ErrorAnalytics {
    pub total_attempts: usize,
    pub failed_attempts: usize,
    /// failed / total；无尝试时为 0
    pub retry_rate: f64,
    pub attempts: Vec<ToolCallAttempt>,
}

/// run 级错误历史：尝试台账 + 签名重试计数 + 错误码出现计数
#[derive(Debug, Default)]
pub struct ErrorHistory {
    attempts: Vec<ToolCallAttempt>,
    retry_counts: std::collections::HashMap<String, u32>,
    code_counts: std::collections::HashMap<ErrorCode, u32>,
}

impl ErrorHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次尝试；record_ledger=false（enable_error_analysis 关闭）时只维护计数
    pub fn record_attempt(
        &mut self,
        signature: &str,
        tool_name: &str,
        parameters: &serde_json::Value,
        error: Option<&StandardizedError>,
        record_ledger: bool,
    ) {
        if let Some(err) = error {
            *self.code_counts.entry(err.code).or_insert(0) += 1;
        }
        if record_ledger {
            self.attempts.push(ToolCallAttempt {
                tool_name: tool_name.to_string(),
                attempt_number: self.retry_count(signature) + 1,
                serialized_parameters: parameters.to_string(),
                error_code: error.map(|e| e.code.as_str().to_string()).unwrap_or_default(),
                error_message: error.map(|e| e.message.clone()).unwrap_or_default(),
                timestamp: Utc::now(),
            });
        }
    }

    /// 当前签名已重试的次数
    pub fn retry_count(&self, signature: &str) -> u32 {
        self.retry_counts.get(signature).copied().unwrap_or(0)
    }

    pub fn bump_retry(&mut self, signature: &str) {
        *self.retry_counts.entry(signature.to_string()).or_insert(0) += 1;
    }

    /// 工具成功后清除该签名的重试计数
    pub fn clear_signature(&mut self, signature: &str) {
        self.retry_counts.remove(signature);
    }

    /// 该错误码在本 run 中已出现的次数
    pub fn code_count(&self, code: ErrorCode) -> u32 {
        self.code_counts.get(&code).copied().unwrap_or(0)
    }

    /// run 级错误分析：总/失败尝试数、重试率、完整台账
    pub fn analytics(&self) -> ErrorAnalytics {
        let total = self.attempts.len();
        let failed = self.attempts.iter().filter(|a| !a.error_code.is_empty()).count();
        ErrorAnalytics {
            total_attempts: total,
            failed_attempts: failed,
            retry_rate: if total == 0 { 0.0 } else { failed as f64 / total as f64 },
            attempts: self.attempts.clone(),
        }
    }
}

/// 按顺序应用重试规则：
/// 1. 签名重试次数已达上限 -> 不重试
/// 2. retry_with_modification 关闭 -> 不重试
/// 3. 错误码属于不可重试集合 -> 不重试（修正参数无法解决）
/// 4. abort_on_repeated_errors 开启且同一错误码出现超过阈值 -> 不重试
/// 5. 其余 -> 重试
pub fn should_retry(
    config: &RunConfig,
    policy: &RetryPolicy,
    history: &ErrorHistory,
    signature: &str,
    code: ErrorCode,
) -> bool {
    if history.retry_count(signature) >= config.max_tool_retries {
        return false;
    }
    if !config.retry_with_modification {
        return false;
    }
    if policy.non_retriable.contains(&code) {
        return false;
    }
    if config.abort_on_repeated_errors && history.code_count(code) > policy.repeat_abort_threshold {
        return false;
    }
    true
}

/// 重试引导消息：工具名、第几次/上限、结构化错误与细节、修正指令
pub fn retry_guidance(
    tool_name: &str,
    attempt: u32,
    max_retries: u32,
    error: &StandardizedError,
) -> String {
    let mut msg = format!(
        "Tool '{}' failed (attempt {} of {}).\nError [{}]: {}",
        tool_name, attempt, max_retries, error.code, error.message
    );
    if !error.suggestion.is_empty() {
        msg.push_str(&format!("\nSuggestion: {}", error.suggestion));
    }
    for (k, v) in &error.details {
        msg.push_str(&format!("\n  {}: {}", k, v));
    }
    msg.push_str(
        "\nPlease: (a) review the error above, (b) identify which parameter was wrong, \
         (c) resubmit a corrected call to the same tool, or (d) explain why the call \
         cannot succeed and propose an alternative approach.",
    );
    msg
}

/// 重试已耗尽或不可重试时的最终错误消息：不再要求重试，让推理端继续推进任务
pub fn final_error_message(tool_name: &str, error: &StandardizedError, retried: u32) -> String {
    let mut msg = format!(
        "Tool '{}' failed permanently after {} retr{}.\nError [{}]: {}",
        tool_name,
        retried,
        if retried == 1 { "y" } else { "ies" },
        error.code,
        error.message
    );
    if !error.suggestion.is_empty() {
        msg.push_str(&format!("\nSuggestion: {}", error.suggestion));
    }
    msg.push_str(
        "\nDo not retry this exact call. Continue with the task using the information \
         you already have, or choose a different tool.",
    );
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_retries: u32) -> RunConfig {
        RunConfig {
            max_tool_retries: max_retries,
            ..RunConfig::default()
        }
    }

    fn err(code: ErrorCode) -> StandardizedError {
        StandardizedError::new(code, "boom")
    }

    #[test]
    fn test_retry_allowed_under_budget() {
        let history = ErrorHistory::new();
        assert!(should_retry(
            &cfg(3),
            &RetryPolicy::default(),
            &history,
            "sig",
            ErrorCode::InvalidParameters
        ));
    }

    #[test]
    fn test_retry_denied_at_budget() {
        let mut history = ErrorHistory::new();
        history.bump_retry("sig");
        history.bump_retry("sig");
        assert!(!should_retry(
            &cfg(2),
            &RetryPolicy::default(),
            &history,
            "sig",
            ErrorCode::InvalidParameters
        ));
    }

    #[test]
    fn test_non_retriable_codes() {
        let history = ErrorHistory::new();
        for code in [
            ErrorCode::UnsupportedOperation,
            ErrorCode::InternalError,
            ErrorCode::AlreadyExists,
        ] {
            assert!(!should_retry(&cfg(3), &RetryPolicy::default(), &history, "sig", code));
        }
    }

    #[test]
    fn test_retry_disabled_by_config() {
        let history = ErrorHistory::new();
        let config = RunConfig {
            retry_with_modification: false,
            ..cfg(3)
        };
        assert!(!should_retry(
            &config,
            &RetryPolicy::default(),
            &history,
            "sig",
            ErrorCode::FileNotFound
        ));
    }

    #[test]
    fn test_repeated_code_abort() {
        let mut history = ErrorHistory::new();
        let config = RunConfig {
            abort_on_repeated_errors: true,
            ..cfg(10)
        };
        let e = err(ErrorCode::FileNotFound);
        for i in 0..4 {
            history.record_attempt(&format!("sig{i}"), "t", &serde_json::json!({}), Some(&e), true);
        }
        // 第 4 次出现后超过阈值 3，不再重试
        assert!(!should_retry(
            &config,
            &RetryPolicy::default(),
            &history,
            "fresh",
            ErrorCode::FileNotFound
        ));
        // 未开启开关时不受影响
        assert!(should_retry(
            &cfg(10),
            &RetryPolicy::default(),
            &history,
            "fresh",
            ErrorCode::FileNotFound
        ));
    }

    #[test]
    fn test_analytics_counts() {
        let mut history = ErrorHistory::new();
        let e = err(ErrorCode::InvalidParameters);
        history.record_attempt("s", "t", &serde_json::json!({}), Some(&e), true);
        history.bump_retry("s");
        history.record_attempt("s", "t", &serde_json::json!({}), None, true);
        let analytics = history.analytics();
        assert_eq!(analytics.total_attempts, 2);
        assert_eq!(analytics.failed_attempts, 1);
        assert!((analytics.retry_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(analytics.attempts[1].attempt_number, 2);
    }

    #[test]
    fn test_guidance_contains_parts() {
        let e = StandardizedError::new(ErrorCode::InvalidParameters, "bad path")
            .with_suggestion("use a relative path")
            .with_detail("param", "path");
        let msg = retry_guidance("read_file", 1, 3, &e);
        assert!(msg.contains("read_file"));
        assert!(msg.contains("attempt 1 of 3"));
        assert!(msg.contains("invalid_parameters"));
        assert!(msg.contains("use a relative path"));
        assert!(msg.contains("param: path"));
        assert!(msg.contains("resubmit a corrected call"));
    }
}
