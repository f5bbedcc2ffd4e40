//! 核心编排层：错误类型、策略、分类与重试、基础循环、审议装饰器

pub mod classifier;
pub mod deliberation;
pub mod error;
pub mod policy;
pub mod runner;

pub use classifier::{ErrorAnalytics, ErrorHistory, ToolCallAttempt};
pub use deliberation::{
    DeliberationConfig, DeliberationPhase, DeliberationResult, DeliberationRunner,
    DeliberationStep,
};
pub use error::AgentError;
pub use policy::{CompletionPolicy, RetryPolicy, RunConfig};
pub use runner::{AgentRunner, RunResult, StepOutcome};
