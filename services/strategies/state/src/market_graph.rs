//! Market Graph
//!
//! Assets are nodes, venues are edges. Every venue contributes one [`DirectedEdge`] per
//! trade direction, so parallel venues over the same pair are ordinary parallel edges.
//!
//! ## Concurrency
//!
//! The ingest task is the only writer. Edges are stored as `Arc<VenueEdge>` and replaced
//! whole on every upsert, so a reader holding an edge never observes a torn write.
//! [`MarketGraph::neighbors`] copies the adjacency out instead of lending a live view,
//! and [`MarketGraph::snapshot`] freezes a consistent searchable view for one search.
//!
//! ```text
//! assets:      Address ──► Asset
//! edges:       venue   ──► Arc<VenueEdge>          (replace-on-write)
//! adjacency:   asset   ──► [venue, …]              (O(degree) neighbors)
//! venue_index: venue   ──► (asset0, asset1)        (cheap cache invalidation)
//! ```

use crate::error::{StateError, StateResult};
use crate::validator::EdgeValidator;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::{Address, Asset, DirectedEdge, Direction, VenueEdge};

/// Result of an upsert
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Inserted,
    /// State changed; the previous edge is returned for delta comparisons
    Replaced { previous: Arc<VenueEdge> },
    /// Identical state and flags; nothing was written
    Unchanged,
}

impl UpsertOutcome {
    pub fn is_material(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub assets: usize,
    pub venues: usize,
    pub unhealthy_venues: usize,
    pub upserts: u64,
    pub unchanged_upserts: u64,
    pub version: u64,
}

#[derive(Debug, Default)]
pub struct MarketGraph {
    assets: DashMap<Address, Asset>,
    edges: DashMap<Address, Arc<VenueEdge>>,
    adjacency: DashMap<Address, Vec<Address>>,
    venue_index: DashMap<Address, (Address, Address)>,
    validator: EdgeValidator,
    version: AtomicU64,
    upserts: AtomicU64,
    unchanged_upserts: AtomicU64,
}

impl MarketGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validator(validator: EdgeValidator) -> Self {
        Self {
            validator,
            ..Self::default()
        }
    }

    /// Register an asset; returns false when it was already present
    pub fn add_asset(&self, asset: Asset) -> StateResult<bool> {
        self.validator.validate_asset(&asset)?;
        if self.assets.contains_key(&asset.id) {
            return Ok(false);
        }
        debug!(asset = ?asset.id, decimals = asset.decimals, "asset registered");
        self.assets.insert(asset.id, asset);
        Ok(true)
    }

    pub fn asset(&self, id: &Address) -> Option<Asset> {
        self.assets.get(id).map(|a| a.clone())
    }

    pub fn contains_asset(&self, id: &Address) -> bool {
        self.assets.contains_key(id)
    }

    /// Atomically replace the edge for `edge.venue`.
    ///
    /// Both assets must already be registered, and a venue can never change its asset pair.
    pub fn upsert_edge(&self, edge: VenueEdge) -> StateResult<UpsertOutcome> {
        self.validator.validate_edge(&edge)?;
        for asset in [edge.asset0, edge.asset1] {
            if !self.assets.contains_key(&asset) {
                return Err(StateError::UnknownAsset {
                    asset,
                    venue: edge.venue,
                });
            }
        }

        let venue = edge.venue;
        let previous = self.edges.get(&venue).map(|e| e.clone());
        let outcome = match previous {
            Some(previous) => {
                if (previous.asset0, previous.asset1) != (edge.asset0, edge.asset1) {
                    return Err(StateError::InvalidEdge {
                        venue,
                        reason: "asset pair changed".to_string(),
                    });
                }
                if previous.state == edge.state
                    && previous.healthy == edge.healthy
                    && previous.fee_bps == edge.fee_bps
                {
                    self.unchanged_upserts.fetch_add(1, Ordering::Relaxed);
                    return Ok(UpsertOutcome::Unchanged);
                }
                self.edges.insert(venue, Arc::new(edge));
                UpsertOutcome::Replaced { previous }
            }
            None => {
                for asset in [edge.asset0, edge.asset1] {
                    self.adjacency.entry(asset).or_default().push(venue);
                }
                self.venue_index.insert(venue, (edge.asset0, edge.asset1));
                info!(
                    venue = ?venue,
                    protocol = ?edge.protocol,
                    asset0 = ?edge.asset0,
                    asset1 = ?edge.asset1,
                    "venue added to market graph"
                );
                self.edges.insert(venue, Arc::new(edge));
                UpsertOutcome::Inserted
            }
        };

        self.upserts.fetch_add(1, Ordering::Relaxed);
        self.version.fetch_add(1, Ordering::AcqRel);
        Ok(outcome)
    }

    pub fn edge(&self, venue: &Address) -> Option<Arc<VenueEdge>> {
        self.edges.get(venue).map(|e| e.clone())
    }

    /// Assets a venue touches
    pub fn venue_assets(&self, venue: &Address) -> Option<(Address, Address)> {
        self.venue_index.get(venue).map(|pair| *pair)
    }

    /// Outgoing edges of `asset`, healthy or not, copied out of the graph
    pub fn neighbors(&self, asset: &Address) -> Vec<DirectedEdge> {
        let venues = match self.adjacency.get(asset) {
            Some(venues) => venues.clone(),
            None => return Vec::new(),
        };
        venues
            .into_iter()
            .filter_map(|venue| {
                let edge = self.edges.get(&venue)?.clone();
                let direction = edge.direction_from(*asset)?;
                Some(DirectedEdge::new(edge, direction))
            })
            .collect()
    }

    fn set_health(&self, venue: &Address, healthy: bool) -> StateResult<bool> {
        let current = self
            .edge(venue)
            .ok_or(StateError::UnknownVenue { venue: *venue })?;
        if current.healthy == healthy {
            return Ok(false);
        }
        let mut next = (*current).clone();
        next.healthy = healthy;
        self.edges.insert(*venue, Arc::new(next));
        self.version.fetch_add(1, Ordering::AcqRel);
        Ok(true)
    }

    /// Exclude a venue from search without removing it; returns true if it changed
    pub fn mark_unhealthy(&self, venue: &Address) -> StateResult<bool> {
        let changed = self.set_health(venue, false)?;
        if changed {
            warn!(venue = ?venue, "venue marked unhealthy");
        }
        Ok(changed)
    }

    pub fn mark_healthy(&self, venue: &Address) -> StateResult<bool> {
        let changed = self.set_health(venue, true)?;
        if changed {
            info!(venue = ?venue, "venue healthy again");
        }
        Ok(changed)
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Freeze the searchable part of the graph: healthy venues with priceable state
    pub fn snapshot(&self) -> GraphSnapshot {
        let version = self.version();
        let assets: HashMap<Address, Asset> = self
            .assets
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        let edges: HashMap<Address, Arc<VenueEdge>> = self
            .edges
            .iter()
            .filter(|entry| entry.healthy && !entry.state.is_empty())
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        GraphSnapshot::build(version, assets, edges)
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            assets: self.assets.len(),
            venues: self.edges.len(),
            unhealthy_venues: self.edges.iter().filter(|e| !e.healthy).count(),
            upserts: self.upserts.load(Ordering::Relaxed),
            unchanged_upserts: self.unchanged_upserts.load(Ordering::Relaxed),
            version: self.version(),
        }
    }
}

/// Immutable searchable view of the market graph
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    version: u64,
    assets: HashMap<Address, Asset>,
    edges: HashMap<Address, Arc<VenueEdge>>,
    adjacency: HashMap<Address, Vec<DirectedEdge>>,
}

impl GraphSnapshot {
    fn build(
        version: u64,
        assets: HashMap<Address, Asset>,
        edges: HashMap<Address, Arc<VenueEdge>>,
    ) -> Self {
        let mut adjacency: HashMap<Address, Vec<DirectedEdge>> = HashMap::new();
        let mut ordered: Vec<&Arc<VenueEdge>> = edges.values().collect();
        // Deterministic neighbor order keeps searches reproducible
        ordered.sort_by_key(|edge| edge.venue);
        for edge in ordered {
            adjacency
                .entry(edge.asset0)
                .or_default()
                .push(DirectedEdge::new(edge.clone(), Direction::ZeroForOne));
            adjacency
                .entry(edge.asset1)
                .or_default()
                .push(DirectedEdge::new(edge.clone(), Direction::OneForZero));
        }
        Self {
            version,
            assets,
            edges,
            adjacency,
        }
    }

    /// Snapshot with a subset of venues removed, used by pruning
    pub fn retain_venues<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&VenueEdge) -> bool,
    {
        let edges = self
            .edges
            .iter()
            .filter(|(_, edge)| keep(edge))
            .map(|(venue, edge)| (*venue, edge.clone()))
            .collect();
        Self::build(self.version, self.assets.clone(), edges)
    }

    /// Snapshot with one venue's edge replaced, e.g. by a projected pending-swap state.
    ///
    /// The edge is dropped instead when it is unhealthy or cannot price.
    pub fn with_edge(&self, edge: Arc<VenueEdge>) -> Self {
        let mut edges = self.edges.clone();
        let priceable = edge.healthy
            && !edge.state.is_empty()
            && self.assets.contains_key(&edge.asset0)
            && self.assets.contains_key(&edge.asset1);
        if priceable {
            edges.insert(edge.venue, edge);
        } else {
            edges.remove(&edge.venue);
        }
        Self::build(self.version, self.assets.clone(), edges)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn neighbors(&self, asset: &Address) -> &[DirectedEdge] {
        self.adjacency
            .get(asset)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn edge(&self, venue: &Address) -> Option<&Arc<VenueEdge>> {
        self.edges.get(venue)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Arc<VenueEdge>> {
        self.edges.values()
    }

    pub fn asset(&self, id: &Address) -> Option<&Asset> {
        self.assets.get(id)
    }

    /// Assets with at least one searchable edge, sorted
    pub fn active_assets(&self) -> Vec<Address> {
        let mut assets: Vec<Address> = self.adjacency.keys().copied().collect();
        assets.sort();
        assets
    }

    pub fn asset_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn directed_edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    pub fn average_degree(&self) -> f64 {
        if self.adjacency.is_empty() {
            return 0.0;
        }
        self.directed_edge_count() as f64 / self.adjacency.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{CurveState, VenueProtocol, U256};

    fn asset(byte: u8) -> Asset {
        Asset::new(Address::repeat_byte(byte), 18, 137)
    }

    fn edge(venue: u8, a: u8, b: u8, r0: u64, r1: u64) -> VenueEdge {
        VenueEdge {
            venue: Address::repeat_byte(venue),
            protocol: VenueProtocol::UniswapV2,
            asset0: Address::repeat_byte(a),
            asset1: Address::repeat_byte(b),
            state: CurveState::ConstantProduct {
                reserve0: U256::from(r0),
                reserve1: U256::from(r1),
            },
            fee_bps: 30,
            gas_estimate: 120_000,
            last_update_ns: 0,
            healthy: true,
        }
    }

    fn graph() -> MarketGraph {
        let graph = MarketGraph::new();
        for byte in 1..=3 {
            graph.add_asset(asset(byte)).unwrap();
        }
        graph
    }

    #[test]
    fn test_upsert_requires_known_assets() {
        let graph = graph();
        let result = graph.upsert_edge(edge(0x10, 1, 9, 100, 100));
        assert!(matches!(result, Err(StateError::UnknownAsset { .. })));
        assert_eq!(graph.stats().venues, 0);
    }

    #[test]
    fn test_upsert_replaces_whole_edge() {
        let graph = graph();
        assert_eq!(
            graph.upsert_edge(edge(0x10, 1, 2, 100, 200)).unwrap(),
            UpsertOutcome::Inserted
        );
        let before = graph.edge(&Address::repeat_byte(0x10)).unwrap();

        let outcome = graph.upsert_edge(edge(0x10, 1, 2, 150, 150)).unwrap();
        assert!(matches!(outcome, UpsertOutcome::Replaced { .. }));

        // Reader's Arc still sees the old state
        assert_eq!(
            before.state.reserves(),
            Some((U256::from(100u64), U256::from(200u64)))
        );
        assert_eq!(
            graph.edge(&Address::repeat_byte(0x10)).unwrap().state.reserves(),
            Some((U256::from(150u64), U256::from(150u64)))
        );
        assert_eq!(
            graph.upsert_edge(edge(0x10, 1, 2, 150, 150)).unwrap(),
            UpsertOutcome::Unchanged
        );
    }

    #[test]
    fn test_pair_cannot_change() {
        let graph = graph();
        graph.upsert_edge(edge(0x10, 1, 2, 100, 200)).unwrap();
        assert!(matches!(
            graph.upsert_edge(edge(0x10, 1, 3, 100, 200)),
            Err(StateError::InvalidEdge { .. })
        ));
    }

    #[test]
    fn test_parallel_edges_and_neighbors() {
        let graph = graph();
        graph.upsert_edge(edge(0x10, 1, 2, 100, 200)).unwrap();
        graph.upsert_edge(edge(0x11, 1, 2, 300, 500)).unwrap();
        graph.upsert_edge(edge(0x12, 2, 3, 100, 100)).unwrap();

        let from_one = graph.neighbors(&Address::repeat_byte(1));
        assert_eq!(from_one.len(), 2);
        assert!(from_one
            .iter()
            .all(|d| d.asset_out() == Address::repeat_byte(2)));

        let from_two = graph.neighbors(&Address::repeat_byte(2));
        assert_eq!(from_two.len(), 3);
        assert_eq!(
            graph.venue_assets(&Address::repeat_byte(0x12)),
            Some((Address::repeat_byte(2), Address::repeat_byte(3)))
        );
    }

    #[test]
    fn test_unhealthy_edges_stay_but_leave_snapshots() {
        let graph = graph();
        graph.upsert_edge(edge(0x10, 1, 2, 100, 200)).unwrap();
        graph.upsert_edge(edge(0x11, 2, 3, 100, 200)).unwrap();

        assert!(graph.mark_unhealthy(&Address::repeat_byte(0x10)).unwrap());
        assert!(!graph.mark_unhealthy(&Address::repeat_byte(0x10)).unwrap());

        assert_eq!(graph.neighbors(&Address::repeat_byte(1)).len(), 1);
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.edge_count(), 1);
        assert!(snapshot.neighbors(&Address::repeat_byte(1)).is_empty());
        assert_eq!(graph.stats().unhealthy_venues, 1);

        assert!(graph.mark_healthy(&Address::repeat_byte(0x10)).unwrap());
        assert_eq!(graph.snapshot().edge_count(), 2);
        assert!(matches!(
            graph.mark_unhealthy(&Address::repeat_byte(0x99)),
            Err(StateError::UnknownVenue { .. })
        ));
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let graph = graph();
        graph.upsert_edge(edge(0x10, 1, 2, 100, 200)).unwrap();
        let snapshot = graph.snapshot();
        graph.upsert_edge(edge(0x11, 2, 3, 100, 200)).unwrap();

        assert_eq!(snapshot.edge_count(), 1);
        assert!(snapshot.version() < graph.version());
        assert_eq!(snapshot.directed_edge_count(), 2);
    }

    #[test]
    fn test_snapshot_skips_empty_state() {
        let graph = graph();
        graph.upsert_edge(edge(0x10, 1, 2, 0, 200)).unwrap();
        assert_eq!(graph.snapshot().edge_count(), 0);
        assert_eq!(graph.stats().venues, 1);
    }

    #[test]
    fn test_with_edge_overrides_one_venue() {
        let graph = graph();
        graph.upsert_edge(edge(0x10, 1, 2, 100, 200)).unwrap();
        graph.upsert_edge(edge(0x11, 2, 3, 100, 200)).unwrap();
        let snapshot = graph.snapshot();

        let projected = snapshot.with_edge(Arc::new(edge(0x10, 1, 2, 150, 134)));
        assert_eq!(
            projected.edge(&Address::repeat_byte(0x10)).unwrap().state.reserves(),
            Some((U256::from(150u64), U256::from(134u64)))
        );
        assert_eq!(projected.edge_count(), 2);
        // the base snapshot is untouched
        assert_eq!(
            snapshot.edge(&Address::repeat_byte(0x10)).unwrap().state.reserves(),
            Some((U256::from(100u64), U256::from(200u64)))
        );

        let drained = snapshot.with_edge(Arc::new(edge(0x10, 1, 2, 0, 200)));
        assert_eq!(drained.edge_count(), 1);
    }
}
