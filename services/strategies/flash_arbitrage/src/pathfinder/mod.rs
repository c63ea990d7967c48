//! # Path Finder - Cycle Search and Route Pricing
//!
//! ## Purpose
//!
//! Finds closed cycles through the pruned market snapshot, prices each one hop by hop at
//! its net-profit-maximizing size, and returns the profitable ones ranked best-first.
//!
//! ## Strategies
//!
//! - **DFS** ([`dfs`]): exhaustive simple cycles; small graphs and venue-anchored searches
//! - **BFS** ([`bfs`]): level-wise beam over cumulative log spot rate; medium graphs
//! - **Bellman-Ford** ([`bellman_ford`]): negative cycles on `-ln(rate)`; large graphs
//!
//! `Auto` picks by the number of active assets, and always uses DFS when the search must
//! pass through a specific venue.
//!
//! ## Architecture Role
//!
//! ```text
//! GraphSnapshot ──► [enumerate cycles] ──► spot-product filter ──► rotate to base asset
//!                                                                        │
//!   ranked CandidatePaths ◄── dedup by venue set ◄── size + price ◄──────┘
//! ```
//!
//! Spot rates are floats and only decide which cycles get priced. Every amount in a
//! returned path comes from exact integer quotes.

pub mod bellman_ford;
pub mod bfs;
pub mod dfs;
pub mod pricing;

use crate::config::{SearchConfig, SearchStrategy};
use crate::profit::CostModel;
use amm::{CurveEngine, SizingConfig};
use state_market::GraphSnapshot;
use std::time::{Duration, Instant};
use tracing::debug;
use types::{now_ns, Address, CandidatePath, DirectedEdge, Direction};

/// What to search for
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Assets cycles are walked from; empty means base assets, then every active asset
    pub anchors: Vec<Address>,
    /// Every returned cycle must trade through this venue
    pub required_venue: Option<Address>,
    /// Tighter hop limit than the configured one
    pub max_hops: Option<usize>,
}

impl SearchRequest {
    pub fn through_venue(venue: Address, anchors: Vec<Address>) -> Self {
        Self {
            anchors,
            required_venue: Some(venue),
            max_hops: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub paths: Vec<CandidatePath>,
    pub strategy: SearchStrategy,
    pub cycles_found: usize,
    pub cycles_priced: usize,
    pub elapsed: Duration,
}

/// Bounds shared by every enumeration strategy
#[derive(Debug, Clone)]
pub struct CycleLimits {
    pub min_hops: usize,
    pub max_hops: usize,
    pub max_candidates: usize,
    pub min_spot_product: f64,
    pub required_venue: Option<Address>,
}

/// Rotation-independent identity of a directed cycle
pub(crate) fn canonical_key(edges: &[DirectedEdge]) -> Vec<(Address, bool)> {
    let mut key: Vec<(Address, bool)> = edges
        .iter()
        .map(|e| (e.venue(), e.direction == Direction::ZeroForOne))
        .collect();
    key.sort();
    key
}

/// Product of post-fee marginal rates around a cycle
pub fn spot_product(engine: &CurveEngine, edges: &[DirectedEdge]) -> f64 {
    edges.iter().fold(1.0, |product, e| {
        product * engine.spot_rate(&e.edge.state, e.edge.fee_bps, e.direction)
    })
}

#[derive(Debug, Clone)]
pub struct PathFinder {
    config: SearchConfig,
    engine: CurveEngine,
    sizing: SizingConfig,
    base_assets: Vec<Address>,
}

impl PathFinder {
    pub fn new(
        config: SearchConfig,
        engine: CurveEngine,
        sizing: SizingConfig,
        base_assets: Vec<Address>,
    ) -> Self {
        Self {
            config,
            engine,
            sizing,
            base_assets,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn engine(&self) -> &CurveEngine {
        &self.engine
    }

    pub fn resolve_strategy(&self, snapshot: &GraphSnapshot, request: &SearchRequest) -> SearchStrategy {
        match self.config.strategy {
            SearchStrategy::Auto => {
                let assets = snapshot.asset_count();
                if request.required_venue.is_some() || assets <= self.config.dfs_max_assets {
                    SearchStrategy::Dfs
                } else if assets <= self.config.bfs_max_assets {
                    SearchStrategy::Bfs
                } else {
                    SearchStrategy::BellmanFord
                }
            }
            explicit => explicit,
        }
    }

    fn anchors(&self, snapshot: &GraphSnapshot, request: &SearchRequest) -> Vec<Address> {
        if !request.anchors.is_empty() {
            return request.anchors.clone();
        }
        if let Some((asset0, asset1)) = request
            .required_venue
            .and_then(|venue| snapshot.edge(&venue))
            .map(|edge| (edge.asset0, edge.asset1))
        {
            return vec![asset0, asset1];
        }
        if !self.base_assets.is_empty() {
            return self.base_assets.clone();
        }
        snapshot.active_assets()
    }

    pub fn find(
        &self,
        snapshot: &GraphSnapshot,
        request: &SearchRequest,
        costs: &dyn CostModel,
    ) -> SearchOutcome {
        let started = Instant::now();
        let strategy = self.resolve_strategy(snapshot, request);
        let limits = CycleLimits {
            min_hops: self.config.min_hops.max(2),
            max_hops: request
                .max_hops
                .map_or(self.config.max_hops, |hops| hops.min(self.config.max_hops)),
            max_candidates: self.config.max_candidates,
            min_spot_product: self.config.min_spot_product,
            required_venue: request.required_venue,
        };

        let anchors = self.anchors(snapshot, request);
        let cycles = match strategy {
            SearchStrategy::Bfs => {
                bfs::enumerate(snapshot, &self.engine, &anchors, &limits, self.config.beam_width)
            }
            SearchStrategy::BellmanFord => bellman_ford::enumerate(snapshot, &self.engine, &limits),
            SearchStrategy::Dfs | SearchStrategy::Auto => {
                dfs::enumerate(snapshot, &self.engine, &anchors, &limits)
            }
        };

        let priced_at = now_ns();
        let priced: Vec<CandidatePath> = cycles
            .iter()
            .filter_map(|cycle| pricing::rotate_to_base(cycle, &self.base_assets))
            .filter_map(|cycle| {
                pricing::price_cycle(&self.engine, &self.sizing, snapshot, &cycle, costs, priced_at)
            })
            .collect();
        let cycles_priced = priced.len();

        let mut paths: Vec<CandidatePath> = pricing::dedup_by_signature(priced)
            .into_iter()
            .filter(CandidatePath::is_profitable)
            .collect();
        paths.truncate(self.config.max_results);

        let elapsed = started.elapsed();
        debug!(
            "{:?} search: {} cycles, {} priced, {} profitable in {}us",
            strategy,
            cycles.len(),
            cycles_priced,
            paths.len(),
            elapsed.as_micros()
        );
        SearchOutcome {
            paths,
            strategy,
            cycles_found: cycles.len(),
            cycles_priced,
            elapsed,
        }
    }

    /// Re-size and re-price a known route against current state.
    ///
    /// `None` when a venue has left the snapshot or the route no longer prices; the
    /// returned path may be unprofitable.
    pub fn revalidate(
        &self,
        snapshot: &GraphSnapshot,
        path: &CandidatePath,
        costs: &dyn CostModel,
    ) -> Option<CandidatePath> {
        let edges: Option<Vec<DirectedEdge>> = path
            .hops
            .iter()
            .map(|hop| {
                let edge = snapshot.edge(&hop.venue)?;
                let directed = DirectedEdge::new(edge.clone(), hop.direction);
                (directed.asset_in() == hop.asset_in).then_some(directed)
            })
            .collect();
        pricing::price_cycle(&self.engine, &self.sizing, snapshot, &edges?, costs, now_ns())
    }
}
