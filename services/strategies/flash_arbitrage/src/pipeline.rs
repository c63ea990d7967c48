//! # Event Stream Pipeline - Delta Filtering and Change Signals
//!
//! ## Purpose
//!
//! Single writer of the market graph. Every decoded feed delta passes the filter chain
//! below; deltas that survive are applied to the graph and, when they matter, become a
//! [`ChangeSignal`] in the bounded [`SignalQueue`] the opportunity trigger drains.
//!
//! ## Filter Chain
//!
//! ```text
//! RawDelta ─► allow-list ─► known venue ─┬─ pending swap ─► decode ─► project ─► signal (graph untouched)
//!                                        └─ state delta ──► noise floor ─► apply ─► min liquidity ─► signal
//! ```
//!
//! A delta is noise when both its spot-price move and its largest reserve move are under
//! their floors. Noise is dropped before it reaches the graph. A delta that leaves a venue
//! under the liquidity floor is applied, so the graph stays true, and raises only a
//! zero-priority invalidate-only signal so cached paths through it are dropped.
//!
//! ## Backpressure
//!
//! The queue never grows past its capacity. When full, [`DropPolicy::DropOldest`] evicts
//! the head and [`DropPolicy::DropLowestPriority`] evicts the lowest-priority signal, or
//! refuses the incoming one when it ranks lowest itself.
//!
//! ## Venue Health
//!
//! With [`Pipeline::with_health`], every rejected delta counts against a `venue:<address>`
//! circuit. An open circuit marks the venue unhealthy in the graph, which keeps it out of
//! search, invalidates its cached paths and emits `VenueDegraded`. Accepted deltas after the recovery timeout close the
//! circuit again and restore the venue.

use crate::config::{DropPolicy, PipelineConfig};
use crate::events::EventBus;
use crate::profit::whole_units;
use amm::CurveEngine;
use codec::{decode_swap, DeltaPayload, FeedDelta, PendingSwap};
use network::{HealthTracker, HealthTransition};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;
use state_market::{MarketGraph, UpsertOutcome};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use types::{Address, CurveState, Direction, ErrorClass, StrategyEvent, VenueEdge, BPS, U256};

/// A decoded delta as it left its feed
#[derive(Debug, Clone)]
pub struct RawDelta {
    pub feed: Arc<str>,
    pub delta: FeedDelta,
    pub received_at: Instant,
}

impl RawDelta {
    pub fn new(feed: impl Into<Arc<str>>, delta: FeedDelta) -> Self {
        Self {
            feed: feed.into(),
            delta,
            received_at: Instant::now(),
        }
    }
}

/// Notice that a venue changed enough to re-search paths through it
#[derive(Debug, Clone)]
pub struct ChangeSignal {
    pub venue: Address,
    /// Post-trade edge projected from a pending swap; never written to the graph
    pub projected: Option<Arc<VenueEdge>>,
    /// Size of the move in basis points; higher is more urgent
    pub priority: u64,
    /// Cached paths through the venue are stale but no search is warranted
    pub invalidate_only: bool,
    pub feed: Arc<str>,
    pub sequence: u64,
    pub received_at: Instant,
}

#[derive(Debug)]
pub struct SignalQueue {
    capacity: usize,
    policy: DropPolicy,
    items: Mutex<VecDeque<ChangeSignal>>,
    notify: Notify,
    closed: AtomicBool,
}

impl SignalQueue {
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            policy,
            items: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a signal, returning whichever signal the drop policy discarded
    pub fn push(&self, signal: ChangeSignal) -> Option<ChangeSignal> {
        let dropped = {
            let mut items = self.items.lock();
            let dropped = if items.len() < self.capacity {
                None
            } else {
                match self.policy {
                    DropPolicy::DropOldest => items.pop_front(),
                    DropPolicy::DropLowestPriority => {
                        let lowest = items
                            .iter()
                            .enumerate()
                            .min_by_key(|(index, item)| (item.priority, *index))
                            .map(|(index, item)| (index, item.priority));
                        match lowest {
                            Some((_, priority)) if signal.priority < priority => {
                                return Some(signal);
                            }
                            Some((index, _)) => items.remove(index),
                            None => None,
                        }
                    }
                }
            };
            items.push_back(signal);
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    pub fn try_pop(&self) -> Option<ChangeSignal> {
        self.items.lock().pop_front()
    }

    /// Wait for the next signal; `None` once closed and drained
    pub async fn pop(&self) -> Option<ChangeSignal> {
        loop {
            let notified = self.notify.notified();
            if let Some(signal) = self.try_pop() {
                return Some(signal);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug)]
pub struct PipelineMetrics {
    received: AtomicU64,
    filtered: AtomicU64,
    applied: AtomicU64,
    emitted: AtomicU64,
    dropped: AtomicU64,
    latency_total_us: AtomicU64,
    started: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PipelineStats {
    pub received: u64,
    pub filtered: u64,
    pub applied: u64,
    pub emitted: u64,
    pub dropped: u64,
    pub throughput_per_sec: f64,
    pub average_latency_us: u64,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            received: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            latency_total_us: AtomicU64::new(0),
            started: Instant::now(),
        }
    }
}

impl PipelineMetrics {
    /// Deltas received per second since start
    pub fn throughput(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.received.load(Ordering::Relaxed) as f64 / secs
    }

    /// Mean receive-to-enqueue latency of emitted signals
    pub fn average_latency_us(&self) -> u64 {
        let emitted = self.emitted.load(Ordering::Relaxed);
        if emitted == 0 {
            return 0;
        }
        self.latency_total_us.load(Ordering::Relaxed) / emitted
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            received: self.received.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            throughput_per_sec: self.throughput(),
            average_latency_us: self.average_latency_us(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    NotAllowed,
    UnknownVenue,
    Noise,
    UndecodablePending,
    PendingOutOfRange,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Signal enqueued; `dropped` is the venue the queue evicted to make room
    Emitted { dropped: Option<Address> },
    /// Graph updated, but the venue is below the liquidity floor; only cached paths are
    /// invalidated
    AppliedSilently,
    Filtered(FilterReason),
}

/// Filter thresholds, swapped whole on hot reload
#[derive(Debug)]
struct FilterSettings {
    config: PipelineConfig,
    allow: HashSet<Address>,
}

impl From<PipelineConfig> for FilterSettings {
    fn from(config: PipelineConfig) -> Self {
        let allow = config.allow_list.iter().copied().collect();
        Self { config, allow }
    }
}

pub struct Pipeline {
    settings: RwLock<Arc<FilterSettings>>,
    graph: Arc<MarketGraph>,
    engine: CurveEngine,
    queue: Arc<SignalQueue>,
    metrics: Arc<PipelineMetrics>,
    health: Option<(Arc<HealthTracker>, EventBus)>,
}

fn venue_subject(venue: &Address) -> String {
    format!("venue:{venue:?}")
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        graph: Arc<MarketGraph>,
        engine: CurveEngine,
        queue: Arc<SignalQueue>,
    ) -> Self {
        Self {
            settings: RwLock::new(Arc::new(config.into())),
            graph,
            engine,
            queue,
            metrics: Arc::new(PipelineMetrics::default()),
            health: None,
        }
    }

    /// Track rejected deltas per venue and take failing venues out of search
    pub fn with_health(mut self, health: Arc<HealthTracker>, events: EventBus) -> Self {
        self.health = Some((health, events));
        self
    }

    /// Apply new filter thresholds; queue capacity and policy are fixed at startup
    pub fn reconfigure(&self, config: PipelineConfig) {
        *self.settings.write() = Arc::new(config.into());
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    pub fn queue(&self) -> &Arc<SignalQueue> {
        &self.queue
    }

    pub fn process(&self, raw: RawDelta) -> ProcessOutcome {
        self.metrics.received.fetch_add(1, Ordering::Relaxed);
        let outcome = self.filter_and_apply(&raw);
        if let ProcessOutcome::Filtered(reason) = outcome {
            self.metrics.filtered.fetch_add(1, Ordering::Relaxed);
            trace!(venue = ?raw.delta.venue, ?reason, "delta filtered");
        }
        outcome
    }

    fn filter_and_apply(&self, raw: &RawDelta) -> ProcessOutcome {
        let settings = self.settings.read().clone();
        let config = &settings.config;
        let venue = raw.delta.venue;
        if !settings.allow.is_empty() && !settings.allow.contains(&venue) {
            return ProcessOutcome::Filtered(FilterReason::NotAllowed);
        }
        let Some(current) = self.graph.edge(&venue) else {
            return ProcessOutcome::Filtered(FilterReason::UnknownVenue);
        };

        if let DeltaPayload::PendingSwap { calldata, .. } = &raw.delta.payload {
            let swap = match decode_swap(calldata) {
                Ok(swap) => swap,
                Err(e) => {
                    trace!("pending calldata skipped: {}", e);
                    return ProcessOutcome::Filtered(FilterReason::UndecodablePending);
                }
            };
            return match self.project(&current, &swap, config.max_pending_impact_bps) {
                Some((projected, impact_bps)) => {
                    self.emit(raw, Some(Arc::new(projected)), impact_bps as u64)
                }
                None => ProcessOutcome::Filtered(FilterReason::PendingOutOfRange),
            };
        }

        let next = match raw.delta.apply_to(&current) {
            Ok(next) => next,
            Err(e) => {
                warn!(venue = ?venue, "delta rejected: {}", e);
                self.venue_failed(raw, &e.to_string());
                return ProcessOutcome::Filtered(FilterReason::Rejected);
            }
        };

        let price_bps = self.price_delta_bps(&current, &next);
        if !current.state.is_empty()
            && price_bps < config.min_price_delta_bps as u64
            && self.reserve_delta_bps(&current, &next) < config.min_reserve_delta_bps as u64
        {
            return ProcessOutcome::Filtered(FilterReason::Noise);
        }

        match self.graph.upsert_edge(next.clone()) {
            Ok(UpsertOutcome::Unchanged) => return ProcessOutcome::Filtered(FilterReason::Noise),
            Ok(_) => {
                self.metrics.applied.fetch_add(1, Ordering::Relaxed);
                self.venue_succeeded(&next);
            }
            Err(e) => {
                warn!(venue = ?venue, "graph rejected delta: {}", e);
                self.venue_failed(raw, &e.to_string());
                return ProcessOutcome::Filtered(FilterReason::Rejected);
            }
        }

        if !self.meets_liquidity_floor(&next, config.min_liquidity_units) {
            debug!(venue = ?venue, "venue below liquidity floor, invalidating only");
            self.invalidate(raw);
            return ProcessOutcome::AppliedSilently;
        }
        self.emit(raw, None, price_bps)
    }

    fn venue_failed(&self, raw: &RawDelta, detail: &str) {
        let Some((health, events)) = &self.health else {
            return;
        };
        let venue = raw.delta.venue;
        let subject = venue_subject(&venue);
        if health.record_failure(&subject, detail) != HealthTransition::Opened {
            return;
        }
        if let Err(e) = self.graph.mark_unhealthy(&venue) {
            warn!(venue = ?venue, "could not mark venue unhealthy: {}", e);
        }
        self.invalidate(raw);
        events.emit(StrategyEvent::VenueDegraded {
            subject,
            class: ErrorClass::Transient,
            detail: detail.to_string(),
        });
    }

    fn venue_succeeded(&self, edge: &VenueEdge) {
        let Some((health, _)) = &self.health else {
            return;
        };
        let subject = venue_subject(&edge.venue);
        if !health.allow(&subject) {
            return;
        }
        let transition = health.record_success(&subject);
        if !edge.healthy && transition == HealthTransition::Closed {
            if let Err(e) = self.graph.mark_healthy(&edge.venue) {
                warn!(venue = ?edge.venue, "could not restore venue: {}", e);
            }
        }
    }

    /// Lowest-priority signal that only evicts cached paths through the venue
    fn invalidate(&self, raw: &RawDelta) {
        let signal = ChangeSignal {
            venue: raw.delta.venue,
            projected: None,
            priority: 0,
            invalidate_only: true,
            feed: raw.feed.clone(),
            sequence: raw.delta.sequence,
            received_at: raw.received_at,
        };
        if self.queue.push(signal).is_some() {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn emit(&self, raw: &RawDelta, projected: Option<Arc<VenueEdge>>, priority: u64) -> ProcessOutcome {
        let signal = ChangeSignal {
            venue: raw.delta.venue,
            projected,
            priority,
            invalidate_only: false,
            feed: raw.feed.clone(),
            sequence: raw.delta.sequence,
            received_at: raw.received_at,
        };
        let dropped = self.queue.push(signal).map(|signal| signal.venue);
        if dropped.is_some() {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.emitted.fetch_add(1, Ordering::Relaxed);
        let latency = raw.received_at.elapsed().as_micros() as u64;
        self.metrics
            .latency_total_us
            .fetch_add(latency, Ordering::Relaxed);
        ProcessOutcome::Emitted { dropped }
    }

    /// Post-trade edge for a pending swap through `edge`, with the swap's price impact
    pub fn project(
        &self,
        edge: &VenueEdge,
        swap: &PendingSwap,
        max_impact_bps: u32,
    ) -> Option<(VenueEdge, u32)> {
        let (asset_in, asset_out) = swap.first_pair()?;
        let direction = edge.direction_from(asset_in)?;
        if edge.assets_for(direction).1 != asset_out {
            return None;
        }
        let quote = self
            .engine
            .quote(&edge.state, edge.fee_bps, swap.amount_in, direction)
            .ok()?;
        if quote.price_impact_bps > max_impact_bps || quote.amount_out.is_zero() {
            return None;
        }

        let shift = |x: U256, y: U256| -> Option<(U256, U256)> {
            match direction {
                Direction::ZeroForOne => Some((
                    x.checked_add(swap.amount_in)?,
                    y.checked_sub(quote.amount_out)?,
                )),
                Direction::OneForZero => Some((
                    x.checked_sub(quote.amount_out)?,
                    y.checked_add(swap.amount_in)?,
                )),
            }
        };
        let state = match &edge.state {
            CurveState::ConstantProduct { reserve0, reserve1 } => {
                let (reserve0, reserve1) = shift(*reserve0, *reserve1)?;
                CurveState::ConstantProduct { reserve0, reserve1 }
            }
            CurveState::StableSwap {
                balance0,
                balance1,
                amplification,
                precision0,
                precision1,
            } => {
                let (balance0, balance1) = shift(*balance0, *balance1)?;
                CurveState::StableSwap {
                    balance0,
                    balance1,
                    amplification: *amplification,
                    precision0: *precision0,
                    precision1: *precision1,
                }
            }
            // Tick crossings cannot be projected from calldata alone
            CurveState::Concentrated { .. } => return None,
        };
        Some((edge.with_state(state, types::now_ns()), quote.price_impact_bps))
    }

    fn price_delta_bps(&self, before: &VenueEdge, after: &VenueEdge) -> u64 {
        let old = self.engine.spot_rate(&before.state, 0, Direction::ZeroForOne);
        let new = self.engine.spot_rate(&after.state, 0, Direction::ZeroForOne);
        if !(old.is_finite() && old > 0.0 && new.is_finite()) {
            return u64::MAX;
        }
        ((new - old).abs() / old * BPS as f64) as u64
    }

    fn reserve_delta_bps(&self, before: &VenueEdge, after: &VenueEdge) -> u64 {
        [Direction::ZeroForOne, Direction::OneForZero]
            .into_iter()
            .map(|direction| {
                let old = self.engine.input_reserve(&before.state, direction);
                let new = self.engine.input_reserve(&after.state, direction);
                match (old, new) {
                    (Ok(old), Ok(new)) if !old.is_zero() => {
                        let diff = if new > old { new - old } else { old - new };
                        let bps = diff.full_mul(U256::from(BPS)) / old.full_mul(U256::one());
                        U256::try_from(bps).map_or(u64::MAX, |bps| {
                            if bps > U256::from(u64::MAX) {
                                u64::MAX
                            } else {
                                bps.low_u64()
                            }
                        })
                    }
                    _ => u64::MAX,
                }
            })
            .max()
            .unwrap_or(u64::MAX)
    }

    fn meets_liquidity_floor(&self, edge: &VenueEdge, min_units: Decimal) -> bool {
        if min_units <= Decimal::ZERO {
            return true;
        }
        [Direction::ZeroForOne, Direction::OneForZero]
            .into_iter()
            .all(|direction| {
                let (asset_in, _) = edge.assets_for(direction);
                let Some(asset) = self.graph.asset(&asset_in) else {
                    return false;
                };
                self.engine
                    .input_reserve(&edge.state, direction)
                    .map_or(false, |reserve| {
                        reserve >= whole_units(min_units, asset.decimals)
                    })
            })
    }

    /// Drain the ingest channel until every feed has hung up
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<RawDelta>) {
        let interval_ms = self.settings.read().config.metrics_interval_ms.max(1);
        let mut report = tokio::time::interval(Duration::from_millis(interval_ms));
        report.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(raw) => {
                        self.process(raw);
                    }
                    None => break,
                },
                _ = report.tick() => {
                    let stats = self.metrics.stats();
                    crate::log_metrics!(
                        "pipeline: received={} filtered={} applied={} emitted={} dropped={} {:.1}/s avg={}us queue={}",
                        stats.received,
                        stats.filtered,
                        stats.applied,
                        stats.emitted,
                        stats.dropped,
                        stats.throughput_per_sec,
                        stats.average_latency_us,
                        self.queue.len()
                    );
                }
            }
        }
        self.queue.close();
        debug!("pipeline stopped");
    }
}
