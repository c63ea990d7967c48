//! Constant-product (x·y=k) pricing with exact integer arithmetic
//!
//! The fee is deducted from the input before the multiply, matching the Uniswap V2
//! router: `out = in·(10000−fee)·R_out / (R_in·10000 + in·(10000−fee))`.

use crate::error::{AmmError, AmmResult};
use crate::math::{self, BPS_DENOMINATOR};
use types::{CurveKind, U256, U512};

/// Pool reserves oriented by trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantProductPool {
    pub reserve_in: U256,
    pub reserve_out: U256,
    pub fee_bps: u32,
}

impl ConstantProductPool {
    pub fn new(reserve_in: U256, reserve_out: U256, fee_bps: u32) -> Self {
        Self {
            reserve_in,
            reserve_out,
            fee_bps,
        }
    }

    fn check(&self) -> AmmResult<()> {
        if self.reserve_in.is_zero() || self.reserve_out.is_zero() {
            return Err(AmmError::EmptyReserves {
                curve: CurveKind::ConstantProduct,
            });
        }
        math::check_fee(self.fee_bps)
    }

    /// Exact output for `amount_in`, rounded down
    pub fn output_amount(&self, amount_in: U256) -> AmmResult<U256> {
        if amount_in.is_zero() {
            return Err(AmmError::ZeroInput);
        }
        self.check()?;

        let fee_factor = U256::from(BPS_DENOMINATOR - self.fee_bps as u64);
        let amount_in_with_fee = math::mul(amount_in, fee_factor, "fee multiply")?;
        let numerator = amount_in_with_fee.full_mul(self.reserve_out);
        let denominator = self.reserve_in.full_mul(U256::from(BPS_DENOMINATOR))
            + U512::from(amount_in_with_fee);

        math::narrow(numerator / denominator, "constant product output")
    }

    /// Minimum input producing at least `amount_out`, rounded up
    pub fn input_amount(&self, amount_out: U256) -> AmmResult<U256> {
        if amount_out.is_zero() {
            return Err(AmmError::ZeroInput);
        }
        self.check()?;
        if amount_out >= self.reserve_out {
            return Err(AmmError::InsufficientLiquidity {
                requested: amount_out.to_string(),
                available: self.reserve_out.to_string(),
            });
        }

        let numerator = math::mul(self.reserve_in, amount_out, "reverse numerator")?;
        let denominator = math::mul(
            self.reserve_out - amount_out,
            U256::from(BPS_DENOMINATOR - self.fee_bps as u64),
            "reverse denominator",
        )?;
        let quotient = math::mul_div(
            numerator,
            U256::from(BPS_DENOMINATOR),
            denominator,
            "constant product input",
        )?;
        math::add(quotient, U256::one(), "constant product input")
    }

    /// Output at the pre-trade marginal price (fee applied, no curvature)
    pub fn spot_output(&self, amount_in: U256) -> AmmResult<U256> {
        self.check()?;
        let with_fee = math::after_fee(amount_in, self.fee_bps)?;
        math::mul_div(with_fee, self.reserve_out, self.reserve_in, "spot output")
    }

    /// Execution shortfall versus the spot price, in basis points
    pub fn price_impact_bps(&self, amount_in: U256, amount_out: U256) -> AmmResult<u32> {
        Ok(math::shortfall_bps(self.spot_output(amount_in)?, amount_out))
    }

    /// Marginal exchange rate after fee, for search heuristics
    pub fn spot_rate(&self) -> f64 {
        if self.reserve_in.is_zero() {
            return 0.0;
        }
        let fee = 1.0 - self.fee_bps as f64 / BPS_DENOMINATOR as f64;
        math::to_f64(self.reserve_out) / math::to_f64(self.reserve_in) * fee
    }
}
