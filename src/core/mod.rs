//! 核心编排层：错误类型、并发限流、编排器、关闭信号

pub mod error;
pub mod limiter;
pub mod orchestrator;
pub mod shutdown;

pub use error::{DataError, LlmError, NotifyError, ScheduleError, StoreError};
pub use limiter::{ConcurrencyLimiter, DEFAULT_MAX_CONCURRENCY};
pub use orchestrator::{
    render_report, strip_code_fences, GenerationResult, Orchestrator, ResultKind, RunOutput,
    DEFAULT_AGENT_TIMEOUT,
};
pub use shutdown::{ShutdownManager, ShutdownReason};
