//! # Ouro MEV - Private Bundle Submission
//!
//! ## Purpose
//!
//! Keeps arbitrage transactions out of the public mempool. Signed transactions are
//! wrapped in a [`Bundle`], simulated through a relay, then submitted to private relays
//! in priority order through the [`RelayRegistry`].
//!
//! ## Integration Points
//!
//! - **Input**: signed EIP-1559 transactions from the execution orchestrator
//! - **Output**: [`BundleReceipt`]s tracked until inclusion or expiry
//! - **Health**: each relay owns a circuit in the shared `network::HealthTracker`
//!
//! ## Architecture Role
//!
//! ```text
//! Orchestrator ──► BundleBuilder ──► RelayRegistry ──► [relay A] ──► builders
//!                                        │  ordered by  [relay B]
//!                                        │  priority +  [relay C]
//!                                        └─ inclusion rate, skipping open circuits
//! ```
//!
//! Public mempool fallback is not decided here; the orchestrator owns that policy.

pub mod bundle;
pub mod error;
pub mod flashbots;
pub mod registry;
pub mod relay;
pub mod stats;

pub use bundle::{Bundle, BundleBuilder, CallBundleParams, SendBundleParams};
pub use error::{RelayError, RelayResult};
pub use flashbots::{FlashbotsRelay, SIGNATURE_HEADER};
pub use registry::{health_subject, RegistryConfig, RelayRegistry, SubmissionReport};
pub use relay::{BundleReceipt, InclusionStatus, PrivateRelay, ScriptedRelay, SimulationOutcome};
pub use stats::RelayStats;
