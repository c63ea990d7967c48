//! # Event Output - Strategy Events to External Observers
//!
//! ## Purpose
//!
//! Fan-out of [`StrategyEvent`]s from the trigger, the orchestrator and the feeds to any
//! number of observers. The bus never blocks producers: observers that fall behind lose
//! the oldest events and are told how many they missed.
//!
//! ## Integration Points
//!
//! - **Producers**: trigger (detected/triggered), orchestrator (succeeded/failed), feeds
//!   and relays (degraded)
//! - **Consumers**: [`JsonLinesWriter`] appends one JSON object per line; tests and
//!   embedding applications call [`EventBus::subscribe`]
//!
//! ## Architecture Role
//!
//! ```text
//! Trigger ───────┐
//! Orchestrator ──┼──► [EventBus] ──► broadcast ──► JsonLinesWriter ──► events.jsonl
//! Feeds/Relays ──┘                      └────────► subscribers
//! ```

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use types::StrategyEvent;

use crate::error::{StrategyError, StrategyResult};

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StrategyEvent>,
    counts: Arc<Mutex<BTreeMap<&'static str, u64>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            counts: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Publish to every current subscriber; having none is not an error
    pub fn emit(&self, event: StrategyEvent) {
        *self.counts.lock().entry(event.name()).or_insert(0) += 1;
        debug!(event = event.name(), "strategy event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StrategyEvent> {
        self.sender.subscribe()
    }

    /// Events emitted so far, by name
    pub fn counts(&self) -> BTreeMap<&'static str, u64> {
        self.counts.lock().clone()
    }

    pub fn count(&self, name: &str) -> u64 {
        self.counts.lock().get(name).copied().unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .field("counts", &self.counts())
            .finish()
    }
}

/// Appends every event on the bus to a file as JSON lines
pub struct JsonLinesWriter {
    path: PathBuf,
    receiver: broadcast::Receiver<StrategyEvent>,
}

impl JsonLinesWriter {
    pub fn new(bus: &EventBus, path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            receiver: bus.subscribe(),
        }
    }

    /// Runs until every producer has dropped the bus
    pub async fn run(mut self) -> StrategyResult<u64> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;

        let mut written = 0u64;
        loop {
            let event = match self.receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, path = %self.path.display(), "event writer lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let mut line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    warn!(event = event.name(), error = %e, "event not serializable");
                    continue;
                }
            };
            line.push('\n');
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| io_error(&self.path, e))?;
            written += 1;
        }
        file.flush().await.map_err(|e| io_error(&self.path, e))?;
        Ok(written)
    }
}

fn io_error(path: &Path, error: std::io::Error) -> StrategyError {
    StrategyError::Output {
        path: path.display().to_string(),
        reason: error.to_string(),
    }
}
