//! # Ouro Network Resources
//!
//! ## Purpose
//!
//! Shared, bounded access to external resources: per-endpoint rate limiting with
//! backpressure, chain reads through a [`ChainReader`] seam, exponential backoff with
//! jitter, and consecutive-failure health circuits for venues, feeds and relays.
//!
//! ## Integration Points
//!
//! - **Strategy runtime**: gas oracle, nonce manager and public submission read the chain
//!   through a [`RateLimitedChainReader`]
//! - **Feeds**: reconnect schedule from [`Backoff`], degradation from [`HealthTracker`]
//! - **Relays**: availability from [`HealthTracker`]
//!
//! ## Architecture Role
//!
//! ```text
//! strategy tasks ──► [RateLimiter] ──► ChainReader ──► node (JSON-RPC)
//!        │                 │
//!        │                 └── Backpressure / RateLimited instead of blocking
//!        └──────────► [HealthTracker] ──► VenueDegraded events
//! ```

pub mod backoff;
pub mod error;
pub mod health;
pub mod rate_limit;
pub mod rpc;

pub use backoff::{retry, Backoff, BackoffConfig};
pub use error::{NetworkError, NetworkResult};
pub use health::{CircuitState, HealthConfig, HealthTracker, HealthTransition, SubjectHealth};
pub use rate_limit::{EndpointLimiter, EndpointStats, RateLimitConfig, RateLimiter};
pub use rpc::{
    decode_reserves, ChainReader, EthersChainReader, GasSample, RateLimitedChainReader,
    ReceiptStatus, StaticChainReader, GET_RESERVES_SELECTOR,
};
