//! # Ouro AMM Library - Exact Curve Pricing Engine
//!
//! ## Purpose
//!
//! Integer-exact pricing for every curve family the engine trades through. Given a
//! venue's curve state, an input amount and a direction, the [`CurveEngine`] returns the
//! output amount, the price impact against the pre-trade marginal price, and whether the
//! trade is too large relative to the venue's reserves to be executed safely.
//!
//! ## Integration Points
//!
//! - **Input Sources**: `CurveState` snapshots from the market graph
//! - **Output Destinations**: Pruner probes, path finder hop-by-hop pricing, trade sizing,
//!   execution re-validation
//! - **Curve Families**: Constant product (Uniswap V2 style), two-coin stable swap (Curve
//!   style), concentrated liquidity within the active tick (Uniswap V3 style)
//! - **Precision**: `U256` amounts with `U512` intermediates; floating point only in
//!   [`CurveEngine::spot_rate`], which feeds search heuristics and never settlement
//!
//! ## Architecture Role
//!
//! ```text
//! CurveState ──→ [CurveEngine::quote] ──→ Quote { amount_out, price_impact_bps, is_unsafe }
//!                      │
//!         ┌────────────┼──────────────┐
//!         ↓            ↓              ↓
//!  constant_product  stable_swap  concentrated
//!
//! Route pricing closure ──→ [TradeSizer::maximize] ──→ SizedTrade
//! ```
//!
//! ## Performance Profile
//!
//! - **Constant Product**: a handful of 256-bit multiplies per quote
//! - **Stable Swap**: two bounded Newton solves (typically < 10 iterations each)
//! - **Concentrated**: one sqrt-price step, no tick traversal
//! - **Sizing**: O(log range) route evaluations

pub mod concentrated;
pub mod constant_product;
pub mod engine;
pub mod error;
pub mod math;
pub mod sizing;
pub mod stable_swap;

pub use concentrated::ConcentratedPool;
pub use constant_product::ConstantProductPool;
pub use engine::{CurveEngine, PricingConfig, Quote};
pub use error::{AmmError, AmmResult};
pub use sizing::{SizedTrade, SizingConfig, TradeSizer};
pub use stable_swap::StableSwapPool;
