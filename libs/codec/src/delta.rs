//! Feed deltas and their mapping onto venue edges
//!
//! A [`FeedDelta`] is the venue-keyed unit every feed produces. State-bearing payloads
//! convert to and from [`CurveState`] without loss, so a delta applied to an edge and read
//! back yields the same amounts bit for bit.

use crate::amount;
use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use types::{Address, Bytes, CurveKind, CurveState, VenueEdge, H256, U256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeltaPayload {
    Reserves {
        #[serde(with = "amount")]
        reserve0: U256,
        #[serde(with = "amount")]
        reserve1: U256,
    },
    StableBalances {
        #[serde(with = "amount")]
        balance0: U256,
        #[serde(with = "amount")]
        balance1: U256,
        #[serde(with = "amount")]
        amplification: U256,
        #[serde(with = "amount")]
        precision0: U256,
        #[serde(with = "amount")]
        precision1: U256,
    },
    Concentrated {
        #[serde(with = "amount")]
        sqrt_price_x96: U256,
        #[serde(with = "amount::liquidity")]
        liquidity: u128,
        tick: i32,
        #[serde(with = "amount")]
        sqrt_price_lower_x96: U256,
        #[serde(with = "amount")]
        sqrt_price_upper_x96: U256,
    },
    /// Raw pending transaction; decoded into a projected delta downstream
    PendingSwap { tx_hash: H256, calldata: Bytes },
}

impl DeltaPayload {
    pub fn is_pending(&self) -> bool {
        matches!(self, DeltaPayload::PendingSwap { .. })
    }

    /// Curve family the payload describes; `None` for pending transactions
    pub fn curve_kind(&self) -> Option<CurveKind> {
        match self {
            DeltaPayload::Reserves { .. } => Some(CurveKind::ConstantProduct),
            DeltaPayload::StableBalances { .. } => Some(CurveKind::StableSwap),
            DeltaPayload::Concentrated { .. } => Some(CurveKind::Concentrated),
            DeltaPayload::PendingSwap { .. } => None,
        }
    }

    pub fn to_curve_state(&self) -> Option<CurveState> {
        match self.clone() {
            DeltaPayload::Reserves { reserve0, reserve1 } => {
                Some(CurveState::ConstantProduct { reserve0, reserve1 })
            }
            DeltaPayload::StableBalances {
                balance0,
                balance1,
                amplification,
                precision0,
                precision1,
            } => Some(CurveState::StableSwap {
                balance0,
                balance1,
                amplification,
                precision0,
                precision1,
            }),
            DeltaPayload::Concentrated {
                sqrt_price_x96,
                liquidity,
                tick,
                sqrt_price_lower_x96,
                sqrt_price_upper_x96,
            } => Some(CurveState::Concentrated {
                sqrt_price_x96,
                liquidity,
                tick,
                sqrt_price_lower_x96,
                sqrt_price_upper_x96,
            }),
            DeltaPayload::PendingSwap { .. } => None,
        }
    }

    pub fn from_curve_state(state: &CurveState) -> Self {
        match state.clone() {
            CurveState::ConstantProduct { reserve0, reserve1 } => {
                DeltaPayload::Reserves { reserve0, reserve1 }
            }
            CurveState::StableSwap {
                balance0,
                balance1,
                amplification,
                precision0,
                precision1,
            } => DeltaPayload::StableBalances {
                balance0,
                balance1,
                amplification,
                precision0,
                precision1,
            },
            CurveState::Concentrated {
                sqrt_price_x96,
                liquidity,
                tick,
                sqrt_price_lower_x96,
                sqrt_price_upper_x96,
            } => DeltaPayload::Concentrated {
                sqrt_price_x96,
                liquidity,
                tick,
                sqrt_price_lower_x96,
                sqrt_price_upper_x96,
            },
        }
    }
}

/// Venue-keyed state change observed on one feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDelta {
    pub venue: Address,
    /// Per-feed sequence number, starting at 1
    pub sequence: u64,
    #[serde(default)]
    pub block_number: u64,
    #[serde(default)]
    pub observed_at_ns: u64,
    #[serde(flatten)]
    pub payload: DeltaPayload,
}

impl FeedDelta {
    /// Snapshot an edge's current state as a delta
    pub fn from_edge(edge: &VenueEdge, sequence: u64, block_number: u64) -> Self {
        Self {
            venue: edge.venue,
            sequence,
            block_number,
            observed_at_ns: edge.last_update_ns,
            payload: DeltaPayload::from_curve_state(&edge.state),
        }
    }

    /// New edge carrying this delta's state; the input edge is left untouched
    pub fn apply_to(&self, edge: &VenueEdge) -> CodecResult<VenueEdge> {
        if edge.venue != self.venue {
            return Err(CodecError::VenueMismatch {
                delta: self.venue,
                edge: edge.venue,
            });
        }
        let state = self
            .payload
            .to_curve_state()
            .ok_or(CodecError::MissingField {
                field: "curve state",
            })?;
        if state.kind() != edge.curve_kind() {
            return Err(CodecError::CurveMismatch {
                delta: state.kind(),
                edge: edge.curve_kind(),
            });
        }
        Ok(edge.with_state(state, self.observed_at_ns))
    }
}
