//! # Ouro Domain Types
//!
//! Shared vocabulary for every crate in the workspace: assets, venue edges with their
//! curve state, candidate paths, the opportunity lifecycle, emitted events and the error
//! classification used to separate retryable infrastructure failures from terminal ones.
//!
//! ## Design Philosophy
//!
//! - **Exact Amounts**: All on-chain quantities are `U256` in native token units
//! - **Closed Curve Set**: Curve families are a closed enum, matched exhaustively
//! - **Immutable Derived Data**: Paths are rebuilt, never patched in place
//! - **Explicit Failure Classes**: Every error maps onto an [`ErrorClass`]
//!
//! ## Integration Points
//!
//! - **Producers**: Codec (feed deltas), state-market (graph, cache), strategy runtime
//! - **Consumers**: Curve pricing engine, path finder, execution orchestrator, observers
//!
//! ## Architecture Role
//!
//! ```text
//! Feed Deltas → [VenueEdge / CurveState] → [CandidatePath] → [Opportunity] → [StrategyEvent]
//!      ↓                 ↓                        ↓                 ↓               ↓
//! Codec crate      Market Graph            Path Finder       Orchestrator     Observers
//! ```

pub mod asset;
pub mod curve;
pub mod error;
pub mod events;
pub mod opportunity;
pub mod path;
pub mod venue;

pub use asset::Asset;
pub use curve::{CurveKind, CurveState, Direction};
pub use error::{Classify, ErrorClass, TypesError};
pub use events::{PathSummary, StrategyEvent};
pub use opportunity::{risk_score, ArbitrageKind, Opportunity, OpportunityStatus, ReasonCode};
pub use path::{rank_paths, CandidatePath, Hop, PathKey};
pub use venue::{DirectedEdge, VenueEdge, VenueProtocol};

pub use ethers_core::types::{Address, Bytes, H256, I256, U256, U512};

/// Basis-point denominator used by fee and threshold arithmetic
pub const BPS: u32 = 10_000;

/// Nanoseconds since the unix epoch, saturating at zero on clock skew
pub fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
