//! Curve families and their on-chain state
//!
//! The set of supported curves is closed. Pricing code dispatches over [`CurveState`]
//! with a single exhaustive `match`, so adding a family is a compile-visible change.

use ethers_core::types::U256;
use serde::{Deserialize, Serialize};

/// Pricing formula class of a venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    ConstantProduct,
    StableSwap,
    Concentrated,
}

/// Trade direction relative to the venue's ordered asset pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// asset0 in, asset1 out
    ZeroForOne,
    /// asset1 in, asset0 out
    OneForZero,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::ZeroForOne => Direction::OneForZero,
            Direction::OneForZero => Direction::ZeroForOne,
        }
    }
}

/// Full replaceable state of a venue's curve.
///
/// Amounts are raw token units. Stable-swap balances are scaled to a common precision
/// by `precision0`/`precision1` (e.g. `10^12` for a 6-decimal token against 18).
/// Concentrated state only covers the active tick range: `sqrt_price_lower_x96` and
/// `sqrt_price_upper_x96` bound the prices reachable without crossing a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveState {
    ConstantProduct {
        reserve0: U256,
        reserve1: U256,
    },
    StableSwap {
        balance0: U256,
        balance1: U256,
        amplification: U256,
        precision0: U256,
        precision1: U256,
    },
    Concentrated {
        sqrt_price_x96: U256,
        liquidity: u128,
        tick: i32,
        sqrt_price_lower_x96: U256,
        sqrt_price_upper_x96: U256,
    },
}

impl CurveState {
    pub fn kind(&self) -> CurveKind {
        match self {
            CurveState::ConstantProduct { .. } => CurveKind::ConstantProduct,
            CurveState::StableSwap { .. } => CurveKind::StableSwap,
            CurveState::Concentrated { .. } => CurveKind::Concentrated,
        }
    }

    /// Raw reserves as (asset0, asset1). Concentrated venues report no direct reserves.
    pub fn reserves(&self) -> Option<(U256, U256)> {
        match self {
            CurveState::ConstantProduct { reserve0, reserve1 } => Some((*reserve0, *reserve1)),
            CurveState::StableSwap {
                balance0, balance1, ..
            } => Some((*balance0, *balance1)),
            CurveState::Concentrated { .. } => None,
        }
    }

    /// True when the state cannot price any trade
    pub fn is_empty(&self) -> bool {
        match self {
            CurveState::ConstantProduct { reserve0, reserve1 } => {
                reserve0.is_zero() || reserve1.is_zero()
            }
            CurveState::StableSwap {
                balance0, balance1, ..
            } => balance0.is_zero() || balance1.is_zero(),
            CurveState::Concentrated {
                sqrt_price_x96,
                liquidity,
                ..
            } => sqrt_price_x96.is_zero() || *liquidity == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_reserves() {
        let cp = CurveState::ConstantProduct {
            reserve0: U256::from(10u64),
            reserve1: U256::from(20u64),
        };
        assert_eq!(cp.kind(), CurveKind::ConstantProduct);
        assert_eq!(cp.reserves(), Some((U256::from(10u64), U256::from(20u64))));
        assert!(!cp.is_empty());

        let drained = CurveState::ConstantProduct {
            reserve0: U256::zero(),
            reserve1: U256::from(20u64),
        };
        assert!(drained.is_empty());
    }

    #[test]
    fn test_direction_reverse() {
        assert_eq!(Direction::ZeroForOne.reverse(), Direction::OneForZero);
        assert_eq!(Direction::OneForZero.reverse(), Direction::ZeroForOne);
    }
}
