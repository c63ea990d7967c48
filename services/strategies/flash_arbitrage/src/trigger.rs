//! # Opportunity Trigger - From Venue Changes to Executable Opportunities
//!
//! ## Purpose
//!
//! Consumes change signals from the ingest pipeline, coalesces bursts per venue and, when
//! a venue's window closes, finds out which cycles through it are now worth executing.
//! Cached cycles touching the venue are re-validated first; a bounded fresh search through
//! the venue runs only when none of them survive.
//!
//! ## Debounce
//!
//! The first signal for a venue opens a window of `debounce_ms`. Later signals for the
//! same venue inside the window are absorbed without moving the deadline, so a venue that
//! updates continuously still fires at a steady cadence.
//!
//! ## Architecture Role
//!
//! ```text
//! SignalQueue ──► [debounce] ──► fire(venue)
//!                                   │ prune snapshot (+ projected pending edge)
//!                                   │ invalidate_by_venue → revalidate → re-cache
//!                                   │ fresh search through venue when nothing survives
//!                                   ▼
//!                 floors ──► OpportunityDetected
//!                 risk + policy gate ──► OpportunityTriggered ──► orchestrator (mpsc)
//! ```

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use state_market::{MarketGraph, PathCache};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};
use types::{
    rank_paths, risk_score, Address, CandidatePath, Opportunity, PathSummary, StrategyEvent,
    VenueEdge,
};

use crate::config::{StrategyConfig, TriggerConfig};
use crate::events::EventBus;
use crate::pathfinder::{PathFinder, SearchRequest};
use crate::pipeline::{ChangeSignal, SignalQueue};
use crate::profit::{CostSource, ProfitModel};
use crate::pruner::Pruner;
use crate::{log_profit, log_search};

/// Final say over whether a detected opportunity is handed to execution
pub trait PolicyGate: Send + Sync {
    fn permit(&self, path: &CandidatePath, risk_score: f64) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PolicyGate for AllowAll {
    fn permit(&self, _path: &CandidatePath, _risk_score: f64) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriggerStats {
    pub signals: u64,
    pub invalidations: u64,
    pub coalesced: u64,
    pub fires: u64,
    pub revalidated: u64,
    pub fresh_searches: u64,
    pub detected: u64,
    pub below_floor: u64,
    pub risk_vetoed: u64,
    pub policy_vetoed: u64,
    pub triggered: u64,
}

#[derive(Debug)]
struct PendingFire {
    deadline: Instant,
    first_received: Instant,
    projected: Option<Arc<VenueEdge>>,
}

pub struct Trigger {
    config: TriggerConfig,
    graph: Arc<MarketGraph>,
    pruner: Pruner,
    finder: PathFinder,
    profit: ProfitModel,
    costs: Arc<dyn CostSource>,
    gate: Arc<dyn PolicyGate>,
    cache: PathCache,
    pending: HashMap<Address, PendingFire>,
    events: EventBus,
    stats: TriggerStats,
}

impl Trigger {
    pub fn new(
        config: &StrategyConfig,
        graph: Arc<MarketGraph>,
        costs: Arc<dyn CostSource>,
        events: EventBus,
    ) -> Self {
        let engine = amm::CurveEngine::new(config.pricing.clone());
        Self {
            config: config.trigger.clone(),
            graph,
            pruner: Pruner::new(config.pruning.clone(), engine.clone()),
            finder: PathFinder::new(
                config.search.clone(),
                engine,
                config.sizing.to_sizing(),
                config.markets.base_assets.clone(),
            ),
            profit: ProfitModel::new(config.profit.clone()),
            costs,
            gate: Arc::new(AllowAll),
            cache: PathCache::new(config.cache.clone()),
            pending: HashMap::new(),
            events,
            stats: TriggerStats::default(),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn PolicyGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Apply hot settings; cached paths survive, pending windows keep their deadlines
    pub fn reconfigure(&mut self, config: &StrategyConfig) {
        let engine = amm::CurveEngine::new(config.pricing.clone());
        self.config = config.trigger.clone();
        self.pruner = Pruner::new(config.pruning.clone(), engine.clone());
        self.finder = PathFinder::new(
            config.search.clone(),
            engine,
            config.sizing.to_sizing(),
            config.markets.base_assets.clone(),
        );
        self.cache.reconfigure(config.cache.clone());
        info!(
            debounce_ms = self.config.debounce_ms,
            max_hops = config.search.max_hops,
            "trigger reconfigured"
        );
    }

    pub fn stats(&self) -> &TriggerStats {
        &self.stats
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    /// Seed the cache, e.g. from a startup search
    pub fn warm(&mut self, paths: impl IntoIterator<Item = CandidatePath>) -> usize {
        paths
            .into_iter()
            .filter(|path| {
                let profitable = path.is_profitable();
                self.cache.put(path.clone(), profitable)
            })
            .count()
    }

    /// Open or join the venue's debounce window
    pub fn on_signal(&mut self, signal: ChangeSignal, now: Instant) {
        if signal.invalidate_only {
            self.stats.invalidations += 1;
            let evicted = self.cache.invalidate_by_venue(&signal.venue);
            debug!(venue = ?signal.venue, evicted = evicted.len(), "cached paths invalidated");
            return;
        }
        self.stats.signals += 1;
        let debounce = Duration::from_millis(self.config.debounce_ms);
        match self.pending.get_mut(&signal.venue) {
            Some(pending) => {
                self.stats.coalesced += 1;
                if signal.projected.is_some() {
                    pending.projected = signal.projected;
                }
            }
            None => {
                self.pending.insert(
                    signal.venue,
                    PendingFire {
                        deadline: now + debounce,
                        first_received: signal.received_at,
                        projected: signal.projected,
                    },
                );
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.deadline).min()
    }

    pub fn pending_venues(&self) -> usize {
        self.pending.len()
    }

    /// Fire every venue whose window has closed, earliest first
    pub fn fire_due(&mut self, now: Instant) -> Vec<Opportunity> {
        let mut due: Vec<(Address, Instant)> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(venue, pending)| (*venue, pending.deadline))
            .collect();
        due.sort_by_key(|(_, deadline)| *deadline);

        let mut triggered = Vec::new();
        for (venue, _) in due {
            if let Some(pending) = self.pending.remove(&venue) {
                triggered.extend(self.fire(venue, pending.projected, pending.first_received));
            }
        }
        triggered
    }

    /// Re-evaluate cycles through `venue` and return the opportunities to execute
    pub fn fire(
        &mut self,
        venue: Address,
        projected: Option<Arc<VenueEdge>>,
        received_at: Instant,
    ) -> Vec<Opportunity> {
        self.stats.fires += 1;
        self.cache.purge_expired();

        let mut snapshot = self.graph.snapshot();
        if let Some(edge) = &projected {
            snapshot = snapshot.with_edge(edge.clone());
        }
        let (snapshot, prune_stats) = self.pruner.prune(&snapshot);
        let costs = self.costs.cost_model();
        let speculative = projected.is_some();

        let invalidated = self.cache.invalidate_by_venue(&venue);
        let mut survivors = Vec::new();
        for path in &invalidated {
            self.stats.revalidated += 1;
            let Some(fresh) = self.finder.revalidate(&snapshot, path, costs.as_ref()) else {
                continue;
            };
            if !fresh.is_profitable() {
                continue;
            }
            if !speculative {
                self.cache.put(fresh.clone(), true);
            }
            survivors.push(fresh);
        }

        let from_cache = !survivors.is_empty();
        if survivors.is_empty() && self.config.fresh_search {
            self.stats.fresh_searches += 1;
            let anchors = snapshot
                .edge(&venue)
                .map(|edge| vec![edge.asset0, edge.asset1])
                .unwrap_or_default();
            let mut request = SearchRequest::through_venue(venue, anchors);
            request.max_hops = Some(self.config.fresh_search_max_hops);
            let outcome = self.finder.find(&snapshot, &request, costs.as_ref());
            log_search!(
                "Fresh search through {:?}: {} profitable of {} cycles ({} venues pruned)",
                venue,
                outcome.paths.len(),
                outcome.cycles_found,
                prune_stats.venues_in.saturating_sub(prune_stats.venues_kept)
            );
            for path in outcome.paths {
                if !speculative {
                    self.cache.put(path.clone(), true);
                }
                survivors.push(path);
            }
        }
        rank_paths(&mut survivors);

        let detection_latency_us = received_at.elapsed().as_micros() as u64;
        let max_risk = self.config.max_risk_score.to_f64().unwrap_or(1.0);
        let mut triggered = Vec::new();
        for path in survivors {
            let Some(decimals) = snapshot.asset(&path.start_asset()).map(|asset| asset.decimals) else {
                continue;
            };
            if !self.profit.clears_floors(&path, decimals) {
                self.stats.below_floor += 1;
                continue;
            }
            self.stats.detected += 1;
            self.events.emit(StrategyEvent::OpportunityDetected {
                path: PathSummary::from(&path),
                trigger_venue: Some(venue),
                from_cache,
                detection_latency_us,
            });

            if triggered.len() >= self.config.max_triggered_per_fire {
                continue;
            }
            let risk = risk_score(&path, true);
            if risk > max_risk {
                self.stats.risk_vetoed += 1;
                debug!(risk, max_risk, "opportunity over risk limit");
                continue;
            }
            if !self.gate.permit(&path, risk) {
                self.stats.policy_vetoed += 1;
                continue;
            }

            let opportunity = Opportunity::new(path, risk);
            log_profit!(
                "Triggered {} via {:?}: net {} ({} bps, risk {:.2})",
                opportunity.id,
                venue,
                opportunity.path.net_profit,
                opportunity.path.net_profit_bps(),
                risk
            );
            self.events.emit(StrategyEvent::OpportunityTriggered {
                opportunity_id: opportunity.id,
                path: PathSummary::from(&opportunity.path),
                risk_score: risk,
            });
            self.stats.triggered += 1;
            triggered.push(opportunity);
        }
        triggered
    }

    /// Runs until the signal queue closes or the orchestrator hangs up
    pub async fn run(
        mut self,
        queue: Arc<SignalQueue>,
        opportunities: mpsc::Sender<Opportunity>,
        mut config: watch::Receiver<Arc<StrategyConfig>>,
    ) -> TriggerStats {
        let mut config_open = true;
        loop {
            let deadline = self.next_deadline();
            let wake = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3_600));
            tokio::select! {
                signal = queue.pop() => match signal {
                    Some(signal) => self.on_signal(signal, Instant::now()),
                    None => break,
                },
                _ = sleep_until(wake), if deadline.is_some() => {
                    for opportunity in self.fire_due(Instant::now()) {
                        if opportunities.send(opportunity).await.is_err() {
                            return self.stats;
                        }
                    }
                }
                changed = config.changed(), if config_open => match changed {
                    Ok(()) => {
                        let latest = config.borrow_and_update().clone();
                        self.reconfigure(&latest);
                    }
                    Err(_) => config_open = false,
                },
            }
        }

        // Queue closed: flush open windows before stopping
        let far = Instant::now() + Duration::from_secs(3_600);
        for opportunity in self.fire_due(far) {
            if opportunities.send(opportunity).await.is_err() {
                break;
            }
        }
        info!(fires = self.stats.fires, triggered = self.stats.triggered, "trigger stopped");
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathfinder::tests::{addr, cp_edge, triangle, E18};
    use crate::profit::FlatCosts;
    use rust_decimal_macros::dec;
    use types::{CurveState, U256};

    fn strategy_config() -> StrategyConfig {
        let mut config = StrategyConfig::default();
        config.profit.min_profit_bps = 1;
        config.profit.min_net_profit = dec!(0);
        config.trigger.max_risk_score = dec!(1);
        config.pruning.min_liquidity_units = dec!(0);
        config.pruning.min_quality = 0.0;
        config.pruning.max_impact_bps = 10_000;
        config
    }

    fn trigger(graph: Arc<MarketGraph>) -> (Trigger, EventBus) {
        let events = EventBus::new(64);
        let trigger = Trigger::new(
            &strategy_config(),
            graph,
            Arc::new(FlatCosts::default()),
            events.clone(),
        );
        (trigger, events)
    }

    fn signal(venue: Address, at: Instant) -> ChangeSignal {
        ChangeSignal {
            venue,
            projected: None,
            priority: 10,
            invalidate_only: false,
            feed: Arc::from("test"),
            sequence: 1,
            received_at: at,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_window_is_fixed_from_first_signal() {
        let (mut trigger, _) = trigger(Arc::new(triangle()));
        let start = Instant::now();
        trigger.on_signal(signal(addr(0x10), start), start);
        trigger.on_signal(signal(addr(0x10), start), start + Duration::from_millis(40));
        trigger.on_signal(signal(addr(0x11), start), start + Duration::from_millis(30));

        assert_eq!(trigger.next_deadline(), Some(start + Duration::from_millis(50)));
        assert_eq!(trigger.stats().coalesced, 1);
        assert!(trigger.fire_due(start + Duration::from_millis(49)).is_empty());
        assert_eq!(trigger.pending_venues(), 2);

        trigger.fire_due(start + Duration::from_millis(50));
        assert_eq!(trigger.pending_venues(), 1);
        assert_eq!(trigger.stats().fires, 1);
        assert_eq!(trigger.next_deadline(), Some(start + Duration::from_millis(80)));
    }

    #[tokio::test]
    async fn test_fresh_search_then_cache_revalidation() {
        let graph = Arc::new(triangle());
        let (mut trigger, events) = trigger(graph.clone());
        let mut observer = events.subscribe();

        let triggered = trigger.fire(addr(0x10), None, Instant::now());
        assert_eq!(triggered.len(), 1);
        assert_eq!(trigger.stats().fresh_searches, 1);
        assert_eq!(trigger.cache().len(), 1);
        let first = &triggered[0];
        assert!(first.path.contains_venue(addr(0x10)));

        assert!(matches!(
            observer.recv().await.unwrap(),
            StrategyEvent::OpportunityDetected { from_cache: false, .. }
        ));
        assert!(matches!(
            observer.recv().await.unwrap(),
            StrategyEvent::OpportunityTriggered { opportunity_id, .. } if opportunity_id == first.id
        ));

        // Same venue again: served from the cache, no second search
        let again = trigger.fire(addr(0x11), None, Instant::now());
        assert_eq!(again.len(), 1);
        assert_eq!(trigger.stats().fresh_searches, 1);
        assert_eq!(trigger.stats().revalidated, 1);
    }

    #[tokio::test]
    async fn test_invalidate_only_signal_evicts_without_firing() {
        let graph = Arc::new(triangle());
        let (mut trigger, _) = trigger(graph.clone());
        assert_eq!(trigger.fire(addr(0x10), None, Instant::now()).len(), 1);
        assert_eq!(trigger.cache().len(), 1);

        let now = Instant::now();
        let mut stale = signal(addr(0x11), now);
        stale.invalidate_only = true;
        stale.priority = 0;
        trigger.on_signal(stale, now);

        assert!(trigger.cache().is_empty());
        assert_eq!(trigger.pending_venues(), 0);
        assert_eq!(trigger.stats().invalidations, 1);
        assert_eq!(trigger.stats().signals, 0);
    }

    #[tokio::test]
    async fn test_dead_cycle_is_dropped_from_cache() {
        let graph = Arc::new(triangle());
        let (mut trigger, _) = trigger(graph.clone());
        assert_eq!(trigger.fire(addr(0x12), None, Instant::now()).len(), 1);

        // Close the mispricing on the C/A venue
        let flat = cp_edge(0x12, 3, 1, 1_000 * E18, 1_000 * E18);
        graph.upsert_edge(flat).unwrap();

        assert!(trigger.fire(addr(0x12), None, Instant::now()).is_empty());
        assert!(trigger.cache().is_empty());
        assert_eq!(trigger.stats().fresh_searches, 2);
    }

    #[tokio::test]
    async fn test_projected_edge_is_not_cached() {
        let graph = Arc::new(triangle());
        let (mut trigger, _) = trigger(graph.clone());

        // Flatten the triangle in the graph, then project the mispriced state back
        let flat = cp_edge(0x12, 3, 1, 1_000 * E18, 1_000 * E18);
        let projected = Arc::new(cp_edge(0x12, 3, 1, 1_000 * E18, 1_050 * E18));
        graph.upsert_edge(flat).unwrap();

        let triggered = trigger.fire(addr(0x12), Some(projected), Instant::now());
        assert_eq!(triggered.len(), 1);
        assert!(trigger.cache().is_empty());
        assert!(matches!(
            graph.edge(&addr(0x12)).unwrap().state,
            CurveState::ConstantProduct { reserve1, .. } if reserve1 == U256::from(1_000 * E18)
        ));
    }

    struct DenyAll;

    impl PolicyGate for DenyAll {
        fn permit(&self, _path: &CandidatePath, _risk_score: f64) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_floors_risk_and_policy() {
        let graph = Arc::new(triangle());
        let (trigger_base, events) = trigger(graph.clone());
        let mut denied = trigger_base.with_gate(Arc::new(DenyAll));
        assert!(denied.fire(addr(0x10), None, Instant::now()).is_empty());
        assert_eq!(denied.stats().detected, 1);
        assert_eq!(denied.stats().policy_vetoed, 1);
        assert_eq!(events.count("opportunity_triggered"), 0);

        let mut config = strategy_config();
        config.trigger.max_risk_score = dec!(0.01);
        let mut risky = Trigger::new(&config, graph.clone(), Arc::new(FlatCosts::default()), events.clone());
        assert!(risky.fire(addr(0x10), None, Instant::now()).is_empty());
        assert_eq!(risky.stats().risk_vetoed, 1);

        config.profit.min_profit_bps = 10_000;
        let mut strict = Trigger::new(&config, graph, Arc::new(FlatCosts::default()), events.clone());
        assert!(strict.fire(addr(0x10), None, Instant::now()).is_empty());
        assert_eq!(strict.stats().below_floor, 1);
        assert_eq!(events.count("opportunity_detected"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fires_after_debounce_and_reconfigures() {
        let graph = Arc::new(triangle());
        let (trigger, _) = trigger(graph);
        let queue = Arc::new(SignalQueue::new(8, crate::config::DropPolicy::DropOldest));
        let (tx, mut rx) = mpsc::channel(8);
        let (config_tx, config_rx) = watch::channel(Arc::new(strategy_config()));

        let handle = tokio::spawn(trigger.run(queue.clone(), tx, config_rx));

        let mut slower = strategy_config();
        slower.trigger.debounce_ms = 200;
        config_tx.send(Arc::new(slower)).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        queue.push(signal(addr(0x10), Instant::now()));
        let started = Instant::now();
        let opportunity = rx.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(opportunity.path.is_profitable());

        queue.close();
        let stats = handle.await.unwrap();
        assert_eq!(stats.triggered, 1);
        assert_eq!(stats.signals, 1);
    }
}
