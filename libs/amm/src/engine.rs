//! Curve Pricing Engine
//!
//! Single entry point for pricing a trade against any venue. Dispatch over the closed
//! [`CurveState`] enum happens in one `match` per operation; each arm delegates to the
//! curve module that owns the formula.
//!
//! Every quote carries an `is_unsafe` flag. A trade is unsafe when
//! `amount_in · 10000 ≥ input_reserve · max_reserve_fraction_bps`, so a trade sized
//! exactly at the threshold is unsafe and one unit below is not. Unsafe quotes are
//! returned, not hidden, and callers must treat them as non-executable.

use crate::concentrated::ConcentratedPool;
use crate::constant_product::ConstantProductPool;
use crate::error::{AmmError, AmmResult};
use crate::math::{self, BPS_DENOMINATOR};
use crate::stable_swap::{StableSwapPool, MAX_ITERATIONS};
use serde::{Deserialize, Serialize};
use types::{CurveState, Direction, U256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Fraction of the input-side reserve above which a trade is unsafe (1000 = 10%)
    pub max_reserve_fraction_bps: u32,
    /// Newton iteration cap for stable-swap solves
    pub stable_max_iterations: usize,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            max_reserve_fraction_bps: 1_000,
            stable_max_iterations: MAX_ITERATIONS,
        }
    }
}

/// Result of pricing one trade against one venue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub amount_out: U256,
    pub price_impact_bps: u32,
    pub is_unsafe: bool,
}

impl Quote {
    pub fn is_executable(&self) -> bool {
        !self.is_unsafe && !self.amount_out.is_zero()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurveEngine {
    config: PricingConfig,
}

/// A curve state bound to its fee, ready for direction-specific pricing
enum Priced {
    ConstantProduct(ConstantProductPool),
    StableSwap(StableSwapPool, usize),
    Concentrated(ConcentratedPool, bool),
}

impl CurveEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    fn bind(&self, state: &CurveState, fee_bps: u32, direction: Direction) -> Priced {
        let zero_for_one = direction == Direction::ZeroForOne;
        match state {
            CurveState::ConstantProduct { reserve0, reserve1 } => {
                let (reserve_in, reserve_out) = if zero_for_one {
                    (*reserve0, *reserve1)
                } else {
                    (*reserve1, *reserve0)
                };
                Priced::ConstantProduct(ConstantProductPool::new(reserve_in, reserve_out, fee_bps))
            }
            CurveState::StableSwap {
                balance0,
                balance1,
                amplification,
                precision0,
                precision1,
            } => Priced::StableSwap(
                StableSwapPool::new(
                    [*balance0, *balance1],
                    [*precision0, *precision1],
                    *amplification,
                    fee_bps,
                )
                .with_max_iterations(self.config.stable_max_iterations),
                if zero_for_one { 0 } else { 1 },
            ),
            CurveState::Concentrated {
                sqrt_price_x96,
                liquidity,
                sqrt_price_lower_x96,
                sqrt_price_upper_x96,
                ..
            } => Priced::Concentrated(
                ConcentratedPool {
                    sqrt_price_x96: *sqrt_price_x96,
                    liquidity: U256::from(*liquidity),
                    sqrt_price_lower_x96: *sqrt_price_lower_x96,
                    sqrt_price_upper_x96: *sqrt_price_upper_x96,
                    fee_bps,
                },
                zero_for_one,
            ),
        }
    }

    /// Price `amount_in` through a venue in `direction`
    pub fn quote(
        &self,
        state: &CurveState,
        fee_bps: u32,
        amount_in: U256,
        direction: Direction,
    ) -> AmmResult<Quote> {
        let reserve_in = self.input_reserve(state, direction)?;
        let (amount_out, price_impact_bps) = match self.bind(state, fee_bps, direction) {
            Priced::ConstantProduct(pool) => {
                let out = pool.output_amount(amount_in)?;
                (out, pool.price_impact_bps(amount_in, out)?)
            }
            Priced::StableSwap(pool, i) => {
                let out = pool.output_amount(i, amount_in)?;
                (out, pool.price_impact_bps(i, amount_in, out)?)
            }
            Priced::Concentrated(pool, zero_for_one) => {
                let out = pool.output_amount(zero_for_one, amount_in)?;
                (out, pool.price_impact_bps(zero_for_one, amount_in, out)?)
            }
        };

        Ok(Quote {
            amount_out,
            price_impact_bps,
            is_unsafe: self.exceeds_safe_fraction(amount_in, reserve_in),
        })
    }

    /// Reserve of the input token; virtual in-range reserve for concentrated venues
    pub fn input_reserve(&self, state: &CurveState, direction: Direction) -> AmmResult<U256> {
        let zero_for_one = direction == Direction::ZeroForOne;
        match self.bind(state, 0, direction) {
            Priced::ConstantProduct(pool) => Ok(pool.reserve_in),
            Priced::StableSwap(pool, i) => Ok(pool.balances[i]),
            Priced::Concentrated(pool, _) => {
                let (reserve0, reserve1) = pool.virtual_reserves()?;
                Ok(if zero_for_one { reserve0 } else { reserve1 })
            }
        }
    }

    /// Reserve of the output token; virtual in-range reserve for concentrated venues
    pub fn output_reserve(&self, state: &CurveState, direction: Direction) -> AmmResult<U256> {
        self.input_reserve(state, direction.reverse())
    }

    pub fn exceeds_safe_fraction(&self, amount_in: U256, reserve_in: U256) -> bool {
        let lhs = amount_in.full_mul(U256::from(BPS_DENOMINATOR));
        let rhs = reserve_in.full_mul(U256::from(self.config.max_reserve_fraction_bps));
        lhs >= rhs
    }

    /// Largest input that is not flagged unsafe, or zero if none exists
    pub fn max_safe_input(&self, state: &CurveState, direction: Direction) -> AmmResult<U256> {
        let reserve_in = self.input_reserve(state, direction)?;
        let threshold = math::mul_div_up(
            reserve_in,
            U256::from(self.config.max_reserve_fraction_bps),
            U256::from(BPS_DENOMINATOR),
            "safe input threshold",
        )?;
        Ok(threshold.saturating_sub(U256::one()))
    }

    /// Required input for `amount_out`, where the curve supports exact inversion
    pub fn reverse_quote(
        &self,
        state: &CurveState,
        fee_bps: u32,
        amount_out: U256,
        direction: Direction,
    ) -> AmmResult<U256> {
        match self.bind(state, fee_bps, direction) {
            Priced::ConstantProduct(pool) => pool.input_amount(amount_out),
            Priced::StableSwap(..) | Priced::Concentrated(..) => {
                Err(AmmError::InsufficientLiquidity {
                    requested: amount_out.to_string(),
                    available: "reverse quote unsupported for this curve".to_string(),
                })
            }
        }
    }

    /// Marginal post-fee exchange rate in raw units; search heuristics only
    pub fn spot_rate(&self, state: &CurveState, fee_bps: u32, direction: Direction) -> f64 {
        match self.bind(state, fee_bps, direction) {
            Priced::ConstantProduct(pool) => pool.spot_rate(),
            Priced::StableSwap(pool, i) => pool.spot_rate(i),
            Priced::Concentrated(pool, zero_for_one) => pool.spot_rate(zero_for_one),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concentrated::q96;

    fn cp(reserve0: u64, reserve1: u64) -> CurveState {
        CurveState::ConstantProduct {
            reserve0: U256::from(reserve0),
            reserve1: U256::from(reserve1),
        }
    }

    #[test]
    fn test_unsafe_boundary_is_inclusive() {
        let engine = CurveEngine::default();
        let state = cp(1_000_000, 1_000_000);

        let at = engine
            .quote(&state, 30, U256::from(100_000u64), Direction::ZeroForOne)
            .unwrap();
        assert!(at.is_unsafe);
        assert!(!at.is_executable());

        let below = engine
            .quote(&state, 30, U256::from(99_999u64), Direction::ZeroForOne)
            .unwrap();
        assert!(!below.is_unsafe);
        assert!(below.is_executable());
    }

    #[test]
    fn test_max_safe_input_sits_one_below_threshold() {
        let engine = CurveEngine::default();
        let state = cp(1_000_000, 5);
        let max = engine.max_safe_input(&state, Direction::ZeroForOne).unwrap();
        assert_eq!(max, U256::from(99_999u64));
        assert!(!engine.exceeds_safe_fraction(max, U256::from(1_000_000u64)));
        assert!(engine.exceeds_safe_fraction(max + 1, U256::from(1_000_000u64)));

        // non-divisible reserve: threshold is ceil(1_000_005 / 10) = 100_001
        let state = cp(1_000_005, 5);
        let max = engine.max_safe_input(&state, Direction::ZeroForOne).unwrap();
        assert_eq!(max, U256::from(100_000u64));
        assert!(!engine.exceeds_safe_fraction(max, U256::from(1_000_005u64)));
        assert!(engine.exceeds_safe_fraction(max + 1, U256::from(1_000_005u64)));
    }

    #[test]
    fn test_direction_selects_input_reserve() {
        let engine = CurveEngine::default();
        let state = cp(1_000, 2_000);
        assert_eq!(
            engine.input_reserve(&state, Direction::OneForZero).unwrap(),
            U256::from(2_000u64)
        );
        assert_eq!(
            engine.output_reserve(&state, Direction::OneForZero).unwrap(),
            U256::from(1_000u64)
        );

        let forward = engine
            .quote(&state, 30, U256::from(10u64), Direction::ZeroForOne)
            .unwrap();
        let backward = engine
            .quote(&state, 30, U256::from(10u64), Direction::OneForZero)
            .unwrap();
        assert!(forward.amount_out > backward.amount_out);
    }

    #[test]
    fn test_dispatch_covers_every_curve() {
        let engine = CurveEngine::default();
        let unit = U256::exp10(18);
        let states = [
            cp(1_000_000_000, 1_000_000_000),
            CurveState::StableSwap {
                balance0: unit * U256::from(1_000_000u64),
                balance1: unit * U256::from(1_000_000u64),
                amplification: U256::from(100u64),
                precision0: U256::one(),
                precision1: U256::one(),
            },
            CurveState::Concentrated {
                sqrt_price_x96: q96(),
                liquidity: 1_000_000_000_000_000_000_000,
                tick: 0,
                sqrt_price_lower_x96: q96() * U256::from(99u64) / U256::from(100u64),
                sqrt_price_upper_x96: q96() * U256::from(101u64) / U256::from(100u64),
            },
        ];
        for state in states.iter() {
            let quote = engine
                .quote(state, 30, U256::from(1_000_000u64), Direction::ZeroForOne)
                .unwrap();
            assert!(quote.amount_out > U256::zero());
            assert!(!quote.is_unsafe);
            assert!(engine.spot_rate(state, 30, Direction::ZeroForOne) > 0.0);
        }
    }

    #[test]
    fn test_concentrated_safety_uses_virtual_reserve() {
        let engine = CurveEngine::default();
        let state = CurveState::Concentrated {
            sqrt_price_x96: q96(),
            liquidity: 1_000_000,
            tick: 0,
            sqrt_price_lower_x96: q96() / U256::from(2u64),
            sqrt_price_upper_x96: q96() * U256::from(2u64),
        };
        let quote = engine
            .quote(&state, 30, U256::from(100_000u64), Direction::ZeroForOne)
            .unwrap();
        assert!(quote.is_unsafe);
    }
}
