//! Exponential backoff with jitter
//!
//! Used for feed reconnects and retried RPC calls. Jitter is applied symmetrically
//! around the nominal delay so a fleet of reconnecting feeds spreads out.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use types::Classify;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    /// Fraction of the nominal delay, 0.0..=1.0
    pub jitter: f64,
    /// `None` retries forever
    pub max_retries: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 250,
            max_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.2,
            max_retries: Some(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the attempt with the given index, without jitter
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = self.config.multiplier.max(1.0).powi(attempt.min(63) as i32);
        let millis = (self.config.initial_ms as f64 * factor).min(self.config.max_ms as f64);
        Duration::from_millis(millis as u64)
    }

    /// Next delay, or `None` once the retry budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_retries {
            if self.attempt >= max {
                return None;
            }
        }
        let nominal = self.nominal_delay(self.attempt);
        self.attempt += 1;

        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return Some(nominal);
        }
        let spread = rand::thread_rng().gen_range(-jitter..=jitter);
        let millis = (nominal.as_millis() as f64 * (1.0 + spread)).max(0.0);
        Some(Duration::from_millis(millis as u64))
    }

    pub fn is_exhausted(&self) -> bool {
        self.config
            .max_retries
            .map(|max| self.attempt >= max)
            .unwrap_or(false)
    }
}

/// Run `operation` until it succeeds, fails terminally, or the budget runs out
pub async fn retry<F, Fut, T, E>(config: &BackoffConfig, label: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display,
{
    let mut backoff = Backoff::new(config.clone());
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() => match backoff.next_delay() {
                Some(delay) => {
                    debug!(
                        operation = label,
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(error),
            },
            Err(error) => return Err(error),
        }
    }
}
