//! Consecutive-failure circuits for venues, feeds and relays
//!
//! ```text
//!            failures >= threshold             recovery timeout
//!  Closed ──────────────────────────► Open ─────────────────────► HalfOpen
//!    ▲                                  ▲                            │
//!    │      successes >= threshold      │   failure in half-open     │
//!    └──────────────────────────────────┼────────────────────────────┘
//!                                       └────────────────────────────┘
//! ```
//!
//! Callers report outcomes per subject; the returned [`HealthTransition`] tells them
//! when to emit a degradation event. Time comes from `tokio::time` so paused-clock tests
//! can drive recovery.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing; calls are refused
    Open,
    /// Probing recovery
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub success_threshold: u32,
    pub half_open_max_failures: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            success_threshold: 2,
            half_open_max_failures: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    Unchanged,
    Opened,
    HalfOpened,
    Closed,
}

#[derive(Debug, Clone)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
    total_failures: u64,
    total_successes: u64,
    opens: u64,
    last_error: Option<String>,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at: None,
            total_failures: 0,
            total_successes: 0,
            opens: 0,
            last_error: None,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.half_open_successes = 0;
        self.opens += 1;
    }
}

/// Point-in-time view of one subject's circuit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectHealth {
    pub subject: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub opens: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct HealthTracker {
    config: HealthConfig,
    circuits: DashMap<String, Circuit>,
}

impl HealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            circuits: DashMap::new(),
        }
    }

    fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.config.recovery_timeout_ms)
    }

    /// Whether a call to `subject` should be attempted; moves Open to HalfOpen once the
    /// recovery timeout has elapsed
    pub fn allow(&self, subject: &str) -> bool {
        let Some(mut circuit) = self.circuits.get_mut(subject) else {
            return true;
        };
        let state = circuit.state;
        match state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = circuit
                    .opened_at
                    .map(|at| at.elapsed() >= self.recovery_timeout())
                    .unwrap_or(true);
                if elapsed {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.consecutive_failures = 0;
                    circuit.half_open_successes = 0;
                    info!(subject, "circuit half-open, probing recovery");
                }
                elapsed
            }
        }
    }

    pub fn record_success(&self, subject: &str) -> HealthTransition {
        let mut circuit = self
            .circuits
            .entry(subject.to_string())
            .or_insert_with(Circuit::new);
        circuit.total_successes += 1;
        let state = circuit.state;
        match state {
            CircuitState::Closed => {
                circuit.consecutive_failures = 0;
                HealthTransition::Unchanged
            }
            CircuitState::HalfOpen => {
                circuit.half_open_successes += 1;
                if circuit.half_open_successes >= self.config.success_threshold {
                    circuit.state = CircuitState::Closed;
                    circuit.consecutive_failures = 0;
                    circuit.opened_at = None;
                    info!(subject, "circuit closed after recovery");
                    HealthTransition::Closed
                } else {
                    HealthTransition::Unchanged
                }
            }
            CircuitState::Open => HealthTransition::Unchanged,
        }
    }

    pub fn record_failure(&self, subject: &str, error: &str) -> HealthTransition {
        let mut circuit = self
            .circuits
            .entry(subject.to_string())
            .or_insert_with(Circuit::new);
        circuit.total_failures += 1;
        circuit.consecutive_failures += 1;
        circuit.last_error = Some(error.to_string());

        let state = circuit.state;
        let failures = circuit.consecutive_failures;
        match state {
            CircuitState::Closed if failures >= self.config.failure_threshold => {
                circuit.open();
                warn!(
                    subject,
                    failures,
                    error,
                    "circuit opened"
                );
                HealthTransition::Opened
            }
            CircuitState::HalfOpen if failures >= self.config.half_open_max_failures => {
                circuit.open();
                warn!(subject, error, "circuit reopened from half-open");
                HealthTransition::Opened
            }
            _ => HealthTransition::Unchanged,
        }
    }

    /// Force a subject open, e.g. after a sequence gap
    pub fn trip(&self, subject: &str, reason: &str) -> HealthTransition {
        let mut circuit = self
            .circuits
            .entry(subject.to_string())
            .or_insert_with(Circuit::new);
        circuit.last_error = Some(reason.to_string());
        if circuit.state == CircuitState::Open {
            return HealthTransition::Unchanged;
        }
        circuit.open();
        warn!(subject, reason, "circuit tripped");
        HealthTransition::Opened
    }

    pub fn state(&self, subject: &str) -> CircuitState {
        self.circuits
            .get(subject)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn reset(&self, subject: &str) {
        self.circuits.remove(subject);
    }

    pub fn snapshot(&self) -> Vec<SubjectHealth> {
        let mut view: Vec<SubjectHealth> = self
            .circuits
            .iter()
            .map(|entry| {
                let c = entry.value();
                SubjectHealth {
                    subject: entry.key().clone(),
                    state: c.state,
                    consecutive_failures: c.consecutive_failures,
                    total_failures: c.total_failures,
                    total_successes: c.total_successes,
                    opens: c.opens,
                    last_error: c.last_error.clone(),
                }
            })
            .collect();
        view.sort_by(|a, b| a.subject.cmp(&b.subject));
        view
    }
}
