//! Per-endpoint rate limiting for chain access
//!
//! Each endpoint gets a concurrency cap (tokio `Semaphore`), a per-second quota
//! (`governor`) and a bounded wait queue. A caller that would exceed the queue gets
//! [`NetworkError::Backpressure`] immediately; a caller that waits past the deadline
//! gets [`NetworkError::RateLimited`] with its queue position. Nobody blocks forever.

use crate::error::{NetworkError, NetworkResult};
use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota};
use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_concurrent: usize,
    pub requests_per_second: u32,
    /// Callers allowed to wait for a permit at once
    pub max_queue: usize,
    /// Upper bound on permit wait plus call duration
    pub deadline_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            requests_per_second: 25,
            max_queue: 64,
            deadline_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub granted: u64,
    pub rejected_backpressure: u64,
    pub rejected_deadline: u64,
    pub queued: usize,
}

/// Rate limiter for one endpoint
pub struct EndpointLimiter {
    name: String,
    config: RateLimitConfig,
    semaphore: Semaphore,
    quota: DefaultDirectRateLimiter,
    queued: AtomicUsize,
    granted: AtomicU64,
    rejected_backpressure: AtomicU64,
    rejected_deadline: AtomicU64,
}

/// Decrements the queue counter however the wait ends
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl EndpointLimiter {
    pub fn new(name: impl Into<String>, config: RateLimitConfig) -> Self {
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(1u32));
        Self {
            name: name.into(),
            semaphore: Semaphore::new(config.max_concurrent.max(1)),
            quota: DefaultDirectRateLimiter::direct(Quota::per_second(rps)),
            queued: AtomicUsize::new(0),
            granted: AtomicU64::new(0),
            rejected_backpressure: AtomicU64::new(0),
            rejected_deadline: AtomicU64::new(0),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.config.deadline_ms)
    }

    /// Wait for a permit, bounded by the queue limit and the deadline
    pub async fn acquire(&self) -> NetworkResult<SemaphorePermit<'_>> {
        let position = self.queued.fetch_add(1, Ordering::AcqRel);
        let _slot = QueueSlot(&self.queued);
        if position >= self.config.max_queue {
            self.rejected_backpressure.fetch_add(1, Ordering::Relaxed);
            warn!(
                endpoint = %self.name,
                queued = position,
                "endpoint queue full, shedding request"
            );
            return Err(NetworkError::Backpressure {
                endpoint: self.name.clone(),
                queued: position,
                limit: self.config.max_queue,
            });
        }

        let started = Instant::now();
        let wait = async {
            let permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|e| NetworkError::rpc(self.name.clone(), e))?;
            self.quota.until_ready().await;
            Ok::<_, NetworkError>(permit)
        };

        match tokio::time::timeout(self.deadline(), wait).await {
            Ok(Ok(permit)) => {
                self.granted.fetch_add(1, Ordering::Relaxed);
                debug!(endpoint = %self.name, waited_us = started.elapsed().as_micros() as u64, "permit granted");
                Ok(permit)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                self.rejected_deadline.fetch_add(1, Ordering::Relaxed);
                Err(NetworkError::RateLimited {
                    endpoint: self.name.clone(),
                    queued: position + 1,
                    waited_ms: self.config.deadline_ms,
                })
            }
        }
    }

    /// Run one call under a permit; the call itself is bounded by the deadline
    pub async fn run<F, T>(&self, operation: &str, call: F) -> NetworkResult<T>
    where
        F: Future<Output = NetworkResult<T>>,
    {
        let _permit = self.acquire().await?;
        tokio::time::timeout(self.deadline(), call)
            .await
            .map_err(|_| NetworkError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.config.deadline_ms,
            })?
    }

    pub fn stats(&self) -> EndpointStats {
        EndpointStats {
            granted: self.granted.load(Ordering::Relaxed),
            rejected_backpressure: self.rejected_backpressure.load(Ordering::Relaxed),
            rejected_deadline: self.rejected_deadline.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
        }
    }
}

/// Registry of endpoint limiters keyed by endpoint name
#[derive(Clone, Default)]
pub struct RateLimiter {
    endpoints: Arc<DashMap<String, Arc<EndpointLimiter>>>,
    default_config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self {
            endpoints: Arc::new(DashMap::new()),
            default_config,
        }
    }

    pub fn configure_endpoint(&self, name: &str, config: RateLimitConfig) -> Arc<EndpointLimiter> {
        let limiter = Arc::new(EndpointLimiter::new(name, config));
        self.endpoints.insert(name.to_string(), limiter.clone());
        limiter
    }

    /// Limiter for `name`, created with the default config on first use
    pub fn endpoint(&self, name: &str) -> Arc<EndpointLimiter> {
        self.endpoints
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(EndpointLimiter::new(name, self.default_config.clone())))
            .clone()
    }

    pub fn stats(&self) -> Vec<(String, EndpointStats)> {
        self.endpoints
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }
}
