//! Relay registry
//!
//! Relays are tried in priority order. Each relay has its own health circuit, so one
//! relay timing out never blocks the others, and after enough resolved bundles the
//! observed inclusion rate nudges a relay up or down the order.

use crate::bundle::Bundle;
use crate::error::{RelayError, RelayResult};
use crate::relay::{BundleReceipt, InclusionStatus, PrivateRelay, SimulationOutcome};
use crate::stats::RelayStats;
use network::{HealthTracker, HealthTransition};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};
use types::Classify;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub per_relay_timeout_ms: u64,
    /// Resolved bundles needed before statistics affect ordering
    pub min_samples: u64,
    /// Priority slots gained by a perfect relay (and lost by a useless one)
    pub bias_weight: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            per_relay_timeout_ms: 1_500,
            min_samples: 20,
            bias_weight: 2.0,
        }
    }
}

struct RegisteredRelay {
    relay: Arc<dyn PrivateRelay>,
    priority: u32,
}

/// What happened during one submission round
#[derive(Debug, Clone, Default)]
pub struct SubmissionReport {
    pub receipt: Option<BundleReceipt>,
    pub failures: Vec<(String, RelayError)>,
    /// Relays whose circuit opened during this round
    pub degraded: Vec<String>,
}

impl SubmissionReport {
    pub fn into_receipt(self) -> RelayResult<BundleReceipt> {
        let attempts = self.failures.len();
        self.receipt
            .ok_or(RelayError::AllRelaysFailed { attempts })
    }
}

pub struct RelayRegistry {
    config: RwLock<RegistryConfig>,
    relays: Vec<RegisteredRelay>,
    health: Arc<HealthTracker>,
    stats: Mutex<HashMap<String, RelayStats>>,
}

impl std::fmt::Debug for RelayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayRegistry")
            .field("relays", &self.relays.iter().map(|r| r.relay.name()).collect::<Vec<_>>())
            .field("config", &*self.config.read())
            .finish()
    }
}

pub fn health_subject(relay: &str) -> String {
    format!("relay:{relay}")
}

impl RelayRegistry {
    pub fn new(config: RegistryConfig, health: Arc<HealthTracker>) -> Self {
        Self {
            config: RwLock::new(config),
            relays: Vec::new(),
            health,
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Lower priority values are tried first
    pub fn register(&mut self, relay: Arc<dyn PrivateRelay>, priority: u32) {
        info!(relay = relay.name(), priority, "relay registered");
        self.stats
            .lock()
            .entry(relay.name().to_string())
            .or_default();
        self.relays.push(RegisteredRelay { relay, priority });
    }

    /// Timeouts and ranking weights apply from the next call on
    pub fn reconfigure(&self, config: RegistryConfig) {
        *self.config.write() = config;
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    fn effective_rank(&self, entry: &RegisteredRelay, stats: &HashMap<String, RelayStats>) -> f64 {
        let base = entry.priority as f64;
        let config = self.config.read();
        match stats.get(entry.relay.name()) {
            Some(s) if s.resolved() >= config.min_samples => {
                let rate = s.inclusion_rate().unwrap_or(0.5);
                base - config.bias_weight * (rate - 0.5)
            }
            _ => base,
        }
    }

    /// Available relays, best first
    pub fn ordered(&self) -> Vec<Arc<dyn PrivateRelay>> {
        let stats = self.stats.lock().clone();
        let mut ranked: Vec<(f64, usize, &RegisteredRelay)> = self
            .relays
            .iter()
            .enumerate()
            .filter(|(_, entry)| self.health.allow(&health_subject(entry.relay.name())))
            .map(|(index, entry)| (self.effective_rank(entry, &stats), index, entry))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked
            .into_iter()
            .map(|(_, _, entry)| entry.relay.clone())
            .collect()
    }

    fn relay(&self, name: &str) -> Option<Arc<dyn PrivateRelay>> {
        self.relays
            .iter()
            .find(|entry| entry.relay.name() == name)
            .map(|entry| entry.relay.clone())
    }

    fn per_relay_timeout(&self) -> Duration {
        Duration::from_millis(self.config.read().per_relay_timeout_ms)
    }

    fn record_failure(&self, relay: &str, error: &RelayError, degraded: &mut Vec<String>) {
        if error.is_retryable() {
            let transition = self
                .health
                .record_failure(&health_subject(relay), &error.to_string());
            if transition == HealthTransition::Opened {
                warn!(relay, %error, "relay circuit opened");
                degraded.push(relay.to_string());
            }
        }
    }

    async fn bounded<T, F>(&self, relay: &str, future: F) -> RelayResult<T>
    where
        F: std::future::Future<Output = RelayResult<T>>,
    {
        match timeout(self.per_relay_timeout(), future).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout {
                relay: relay.to_string(),
                timeout_ms: self.config.read().per_relay_timeout_ms,
            }),
        }
    }

    /// Simulate on the first available relay that answers
    pub async fn simulate(&self, bundle: &Bundle, state_block: u64) -> RelayResult<SimulationOutcome> {
        let mut attempts = 0;
        let mut degraded = Vec::new();
        for relay in self.ordered() {
            attempts += 1;
            match self
                .bounded(relay.name(), relay.simulate_bundle(bundle, state_block))
                .await
            {
                Ok(outcome) => {
                    self.health.record_success(&health_subject(relay.name()));
                    return Ok(outcome);
                }
                Err(error) => {
                    debug!(relay = relay.name(), %error, "simulation failed");
                    self.record_failure(relay.name(), &error, &mut degraded);
                }
            }
        }
        Err(RelayError::AllRelaysFailed { attempts })
    }

    /// Submit to relays in order until one accepts
    pub async fn submit(&self, bundle: &Bundle) -> SubmissionReport {
        let mut report = SubmissionReport::default();
        for relay in self.ordered() {
            let name = relay.name().to_string();
            let started = Instant::now();
            let result = self.bounded(&name, relay.submit_bundle(bundle)).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(receipt) => {
                    self.health.record_success(&health_subject(&name));
                    {
                        let mut stats = self.stats.lock();
                        let entry = stats.entry(name.clone()).or_default();
                        entry.submitted += 1;
                        entry.total_latency_ms += latency_ms;
                    }
                    info!(relay = %name, bundle = ?receipt.bundle_hash, latency_ms, "bundle accepted");
                    report.receipt = Some(receipt);
                    return report;
                }
                Err(error) => {
                    warn!(relay = %name, %error, "bundle submission failed");
                    self.stats.lock().entry(name.clone()).or_default().failed += 1;
                    self.record_failure(&name, &error, &mut report.degraded);
                    report.failures.push((name, error));
                }
            }
        }
        report
    }

    pub async fn inclusion_status(
        &self,
        receipt: &BundleReceipt,
        current_block: u64,
    ) -> RelayResult<InclusionStatus> {
        let relay = self.relay(&receipt.relay).ok_or(RelayError::Unavailable {
            relay: receipt.relay.clone(),
        })?;
        self.bounded(&receipt.relay, relay.inclusion_status(receipt, current_block))
            .await
    }

    pub async fn cancel(&self, receipt: &BundleReceipt) -> RelayResult<()> {
        let relay = self.relay(&receipt.relay).ok_or(RelayError::Unavailable {
            relay: receipt.relay.clone(),
        })?;
        self.bounded(&receipt.relay, relay.cancel_bundle(receipt)).await
    }

    /// Feed the final outcome of a bundle back into ordering
    pub fn record_outcome(&self, relay: &str, included: bool) {
        let mut stats = self.stats.lock();
        let entry = stats.entry(relay.to_string()).or_default();
        if included {
            entry.included += 1;
        } else {
            entry.not_included += 1;
        }
    }

    pub fn stats(&self) -> Vec<(String, RelayStats)> {
        let mut stats: Vec<_> = self
            .stats
            .lock()
            .iter()
            .map(|(name, stats)| (name.clone(), stats.clone()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }
}
