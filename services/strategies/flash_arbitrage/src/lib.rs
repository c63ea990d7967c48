//! # Ouro Flash Arbitrage - Cycle Arbitrage Runtime
//!
//! ## Purpose
//!
//! Finds closed trading cycles across AMM venues whose output exceeds their input after
//! fees, gas and flash-loan cost, and executes them atomically through a private relay.
//! Venue state arrives as feed deltas; only deltas that move a price past the noise floor
//! reach path search, and every opportunity is re-priced on a fresh snapshot before a
//! transaction is signed.
//!
//! ## Integration Points
//!
//! - **Input Sources**: websocket feeds carrying binary or JSON venue deltas and pending swaps
//! - **State**: single-writer [`state_market::MarketGraph`] with immutable snapshots
//! - **Capital**: flash-loan providers tried in priority order ([`capital::CapitalSelector`])
//! - **Output**: bundles via [`mev::RelayRegistry`], optional public mempool fallback
//! - **Events**: [`events::EventBus`] broadcast plus an optional JSON-lines file
//!
//! ## Architecture Role
//!
//! ```text
//! feeds ──► pipeline ──► signal queue ──► trigger ──► orchestrator ──► relays
//!   │          │          (bounded,        │  prune     │ revalidate
//!   │          │           drop policy)    │  search    │ capital + nonce
//!   │          └─► MarketGraph ◄───────────┘  price     │ sign, simulate
//!   └─► HealthTracker                                   └─► track inclusion
//! ```
//!
//! [`StrategyEngine`] owns every task and channel; shutdown drains them in pipeline order
//! and returns an [`EngineReport`].
//!
//! ## Performance Profile
//!
//! - **Noise filtering**: state deltas below `pipeline.min_price_delta_bps` never leave the pipeline
//! - **Search**: cycles bounded by `search.max_hops` and `search.max_paths` per trigger
//! - **Backpressure**: the signal queue never holds more than `pipeline.queue_capacity` entries
//! - **Execution**: at most `execution.max_in_flight` opportunities submitted at once
//!
//! ## Examples
//!
//! ```rust,no_run
//! use flash_arbitrage::{StrategyConfig, StrategyEngine};
//! use tokio::sync::watch;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let engine = StrategyEngine::dry_run(StrategyConfig::default())?;
//! let (stop, shutdown) = watch::channel(false);
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     let _ = stop.send(true);
//! });
//! let report = engine.run(shutdown).await?;
//! println!("{} opportunities executed", report.orchestrator.received);
//! # Ok(())
//! # }
//! ```

pub mod capital;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod feed;
pub mod gas_price;
pub mod logging;
pub mod market_loader;
pub mod nonce;
pub mod orchestrator;
pub mod pathfinder;
pub mod pipeline;
pub mod profit;
pub mod pruner;
pub mod strategy_engine;
pub mod trigger;

pub use capital::{CapitalQuote, CapitalSelector, CapitalSource, FlashLoanProvider};
pub use crate::config::{DropPolicy, StrategyConfig};
pub use error::{StrategyError, StrategyResult};
pub use events::{EventBus, JsonLinesWriter};
pub use executor::{ArbParams, ExecutionPlan, PlanBuilder};
pub use feed::{FeedClient, FeedStats};
pub use gas_price::{GasOracle, GasQuote};
pub use market_loader::{load_markets, LoadReport};
pub use nonce::{NonceLease, NonceManager};
pub use orchestrator::{ExecutionContext, ExecutionReport, Orchestrator, OrchestratorStats};
pub use pathfinder::{PathFinder, SearchOutcome, SearchRequest};
pub use pipeline::{ChangeSignal, Pipeline, PipelineStats, RawDelta, SignalQueue};
pub use profit::{CostSource, FlatCosts, LiveCosts, ProfitModel};
pub use pruner::Pruner;
pub use strategy_engine::{EngineReport, StrategyEngine};
pub use trigger::{Trigger, TriggerStats};

/// Re-export key types
pub use rust_decimal::Decimal;
