//! 并发限制：生成调用的固定大小许可池
//!
//! 外部 API 有每分钟配额，生成调用既要并行又不能无限并行；每次调用先取许可，许可数即真实并发上限。

use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// 默认并发上限
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// 基于 Semaphore 的并发限制器，可廉价 clone 到各个任务中
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// 创建限制器；capacity 至少为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// 获取一个许可；许可随返回值 drop 而归还
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.semaphore.clone().acquire_owned().await
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前空闲许可数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_clamped() {
        let limiter = ConcurrencyLimiter::new(0);
        assert_eq!(limiter.capacity(), 1);
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let limiter = ConcurrencyLimiter::default();
        assert_eq!(limiter.available(), 3);
        let a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 1);
        drop(a);
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_permits() {
        let limiter = ConcurrencyLimiter::new(1);
        let other = limiter.clone();
        let _permit = limiter.acquire().await.unwrap();
        assert_eq!(other.available(), 0);
    }
}
