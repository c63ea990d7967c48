//! # Market State - Graph, Snapshots and Path Cache
//!
//! ## Purpose
//!
//! Owns the live view of every tracked liquidity venue and the short-lived memory of
//! paths that were recently profitable across them.
//!
//! ## Integration Points
//!
//! - **Writer**: the ingest task, the only caller of [`MarketGraph::upsert_edge`]
//! - **Readers**: path search works on a [`GraphSnapshot`]; execution re-validates against
//!   live edges via [`MarketGraph::edge`]
//! - **Trigger**: owns the [`PathCache`] and drives venue invalidation
//! - **Feeds**: one [`SequenceTracker`] per connection for gap detection
//!
//! ## Architecture Role
//!
//! ```text
//! FeedDelta ──► [EdgeValidator] ──► MarketGraph ──snapshot()──► Path Finder
//!                                       │                           │
//!                                  mark_unhealthy              profitable paths
//!                                       ▲                           ▼
//!                                 health tracker ◄── trigger ──► PathCache
//! ```
//!
//! ## Consistency Model
//!
//! Single writer, many readers. Edges are immutable `Arc`s replaced on write, so a
//! snapshot taken at version `n` stays internally consistent for a whole search even as
//! the live graph moves on.

pub mod error;
pub mod market_graph;
pub mod path_cache;
pub mod sequence;
pub mod validator;

pub use error::{StateError, StateResult};
pub use market_graph::{GraphSnapshot, GraphStats, MarketGraph, UpsertOutcome};
pub use path_cache::{PathCache, PathCacheConfig, PathCacheStats};
pub use sequence::{SequenceCheck, SequenceTracker};
pub use validator::{EdgeValidator, MAX_DECIMALS};
