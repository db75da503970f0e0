//! 外部API调用闸门：全局并发上限 + 每分钟请求数限流

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::LLMConfig;
use crate::error::GenerationError;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// 每分钟请求数对应的配额，允许一分钟额度内的突发
pub fn per_minute_quota(requests_per_minute: usize) -> Quota {
    let rpm = u32::try_from(requests_per_minute)
        .ok()
        .and_then(NonZeroU32::new)
        .unwrap_or(NonZeroU32::MIN);
    Quota::per_minute(rpm)
}

/// 所有模型调用共享的闸门
pub struct ApiGate {
    permits: Arc<Semaphore>,
    limiter: DirectRateLimiter,
    ceiling: usize,
}

impl ApiGate {
    pub fn new(ceiling: usize, requests_per_minute: usize) -> Self {
        Self::with_quota(ceiling, per_minute_quota(requests_per_minute))
    }

    pub fn with_quota(ceiling: usize, quota: Quota) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            permits: Arc::new(Semaphore::new(ceiling)),
            limiter: RateLimiter::direct(quota),
            ceiling,
        }
    }

    pub fn from_config(llm_config: &LLMConfig) -> Self {
        Self::new(llm_config.max_parallels, llm_config.rate_limit_rpm)
    }

    /// 全局并发上限
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// 获取一次调用许可，许可在返回值被丢弃时归还
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, GenerationError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| GenerationError::Provider(format!("调用闸门已关闭: {}", e)))?;
        if self.limiter.check().is_err() {
            tracing::debug!("⏳ 触发限流，等待配额");
            self.limiter.until_ready().await;
        }
        Ok(permit)
    }

    /// 当前可用的并发许可数
    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
