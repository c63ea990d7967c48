//! Concentrated-liquidity pricing within the active tick range
//!
//! Uses Q64.96 square-root prices as Uniswap V3 does. Only the liquidity of the current
//! tick range is considered: a trade that would move the price past
//! `sqrt_price_lower_x96` or `sqrt_price_upper_x96` is rejected with
//! [`AmmError::ExceedsTickLiquidity`] instead of being priced against liquidity we do
//! not model.

use crate::error::{AmmError, AmmResult};
use crate::math::{self, BPS_DENOMINATOR};
use types::{CurveKind, U256};

pub fn q96() -> U256 {
    U256::one() << 96
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcentratedPool {
    pub sqrt_price_x96: U256,
    pub liquidity: U256,
    pub sqrt_price_lower_x96: U256,
    pub sqrt_price_upper_x96: U256,
    pub fee_bps: u32,
}

impl ConcentratedPool {
    fn check(&self) -> AmmResult<()> {
        if self.liquidity.is_zero() || self.sqrt_price_x96.is_zero() {
            return Err(AmmError::EmptyReserves {
                curve: CurveKind::Concentrated,
            });
        }
        if self.sqrt_price_x96 < self.sqrt_price_lower_x96
            || self.sqrt_price_x96 > self.sqrt_price_upper_x96
        {
            return Err(AmmError::ExceedsTickLiquidity);
        }
        math::check_fee(self.fee_bps)
    }

    /// Next sqrt price after `amount` (post-fee) enters the pool
    fn next_sqrt_price(&self, zero_for_one: bool, amount: U256) -> AmmResult<U256> {
        let q96 = q96();
        if zero_for_one {
            // token0 in: price moves down, rounded up so the pool never gives away extra
            let numerator = self.liquidity << 96;
            let product = math::mul(amount, self.sqrt_price_x96, "sqrt price step")?;
            let denominator = math::add(numerator, product, "sqrt price step")?;
            let next = math::mul_div_up(numerator, self.sqrt_price_x96, denominator, "sqrt price step")?;
            if next < self.sqrt_price_lower_x96 {
                return Err(AmmError::ExceedsTickLiquidity);
            }
            Ok(next)
        } else {
            let delta = math::mul_div(amount, q96, self.liquidity, "sqrt price step")?;
            let next = math::add(self.sqrt_price_x96, delta, "sqrt price step")?;
            if next > self.sqrt_price_upper_x96 {
                return Err(AmmError::ExceedsTickLiquidity);
            }
            Ok(next)
        }
    }

    pub fn output_amount(&self, zero_for_one: bool, amount_in: U256) -> AmmResult<U256> {
        if amount_in.is_zero() {
            return Err(AmmError::ZeroInput);
        }
        self.check()?;
        let amount = math::after_fee(amount_in, self.fee_bps)?;
        let next = self.next_sqrt_price(zero_for_one, amount)?;

        if zero_for_one {
            math::mul_div(
                self.liquidity,
                self.sqrt_price_x96 - next,
                q96(),
                "token1 output",
            )
        } else {
            let scaled = math::mul_div(
                self.liquidity << 96,
                next - self.sqrt_price_x96,
                next,
                "token0 output",
            )?;
            Ok(scaled / self.sqrt_price_x96)
        }
    }

    /// In-range virtual reserves as (token0, token1)
    pub fn virtual_reserves(&self) -> AmmResult<(U256, U256)> {
        self.check()?;
        let q96 = q96();
        Ok((
            math::mul_div(self.liquidity, q96, self.sqrt_price_x96, "virtual reserve0")?,
            math::mul_div(self.liquidity, self.sqrt_price_x96, q96, "virtual reserve1")?,
        ))
    }

    pub fn spot_output(&self, zero_for_one: bool, amount_in: U256) -> AmmResult<U256> {
        self.check()?;
        let amount = math::after_fee(amount_in, self.fee_bps)?;
        let (q96, sqrt) = (q96(), self.sqrt_price_x96);
        if zero_for_one {
            let half = math::mul_div(amount, sqrt, q96, "spot output")?;
            math::mul_div(half, sqrt, q96, "spot output")
        } else {
            let half = math::mul_div(amount, q96, sqrt, "spot output")?;
            math::mul_div(half, q96, sqrt, "spot output")
        }
    }

    pub fn price_impact_bps(
        &self,
        zero_for_one: bool,
        amount_in: U256,
        amount_out: U256,
    ) -> AmmResult<u32> {
        Ok(math::shortfall_bps(
            self.spot_output(zero_for_one, amount_in)?,
            amount_out,
        ))
    }

    pub fn spot_rate(&self, zero_for_one: bool) -> f64 {
        let ratio = math::to_f64(self.sqrt_price_x96) / math::to_f64(q96());
        let price = ratio * ratio;
        if price == 0.0 {
            return 0.0;
        }
        let fee = 1.0 - self.fee_bps as f64 / BPS_DENOMINATOR as f64;
        if zero_for_one {
            price * fee
        } else {
            fee / price
        }
    }
}
