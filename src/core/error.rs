//! 错误类型
//!
//! 流水线内的错误都不致命：LlmError 在 Agent 边界内被吸收为文本，
//! StoreError / NotifyError 只影响单条提醒，ScheduleError 只影响单条指令。

use thiserror::Error;

/// LLM 后端调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 配额/限流类错误（HTTP 429、RESOURCE_EXHAUSTED），可退避重试
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// 其它后端错误，视为不可恢复
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Empty response from backend")]
    EmptyResponse,
}

impl LlmError {
    /// 将后端原始错误消息归类：含 429 / ResourceExhausted / rate limit 视为限流
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("429")
            || lower.contains("resource_exhausted")
            || lower.contains("resourceexhausted")
            || lower.contains("resource has been exhausted")
            || lower.contains("rate limit")
            || lower.contains("rate_limit")
        {
            LlmError::RateLimited(message)
        } else {
            LlmError::ApiError(message)
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited(_))
    }
}

/// 提醒存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid timestamp in store: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid reminder status: {0}")]
    InvalidStatus(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// 通知投递错误
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Notifier not configured: {0}")]
    NotConfigured(String),
}

/// 提醒时间换算错误（调度器的显式边界检查）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid time format: {0}")]
    InvalidTime(String),

    #[error("Time out of range: {hour}:{minute:02}")]
    OutOfRange { hour: u32, minute: u32 },

    /// 本地时间在该时区不存在（夏令时跳变）
    #[error("Local time does not exist in time zone: {0}")]
    NonexistentLocalTime(String),
}

/// 分类数据加载错误
#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error in {file}: {source}")]
    Json {
        file: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        assert!(LlmError::classify("status 429 Too Many Requests").is_rate_limit());
        assert!(LlmError::classify("RESOURCE_EXHAUSTED: quota").is_rate_limit());
        assert!(LlmError::classify("ResourceExhausted").is_rate_limit());
        assert!(LlmError::classify("Rate limit reached for model").is_rate_limit());
    }

    #[test]
    fn test_classify_other() {
        let err = LlmError::classify("invalid api key");
        assert!(!err.is_rate_limit());
        assert_eq!(err, LlmError::ApiError("invalid api key".to_string()));
    }

    #[test]
    fn test_schedule_error_display() {
        let err = ScheduleError::OutOfRange { hour: 25, minute: 7 };
        assert_eq!(err.to_string(), "Time out of range: 25:07");
    }
}
