//! Two-coin stable-swap pricing (Curve invariant)
//!
//! Balances are scaled to a common precision before solving. Both the invariant `D` and
//! the post-trade balance `y` are found by Newton iteration, capped at
//! [`MAX_ITERATIONS`]; iteration stops once successive estimates differ by at most
//! [`CONVERGENCE_TOLERANCE`] units. Failing to converge is an error, never a guess.
//! The fee is charged on the output, as the Curve pools do.

use crate::error::{AmmError, AmmResult};
use crate::math::{self, BPS_DENOMINATOR};
use types::{CurveKind, U256};

pub const N_COINS: u64 = 2;
pub const MAX_ITERATIONS: usize = 255;
pub const CONVERGENCE_TOLERANCE: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StableSwapPool {
    pub balances: [U256; 2],
    pub precisions: [U256; 2],
    pub amplification: U256,
    pub fee_bps: u32,
    pub max_iterations: usize,
}

impl StableSwapPool {
    pub fn new(
        balances: [U256; 2],
        precisions: [U256; 2],
        amplification: U256,
        fee_bps: u32,
    ) -> Self {
        Self {
            balances,
            precisions,
            amplification,
            fee_bps,
            max_iterations: MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn check(&self) -> AmmResult<()> {
        if self.balances.iter().any(|b| b.is_zero())
            || self.precisions.iter().any(|p| p.is_zero())
            || self.amplification.is_zero()
        {
            return Err(AmmError::EmptyReserves {
                curve: CurveKind::StableSwap,
            });
        }
        math::check_fee(self.fee_bps)
    }

    fn scaled_balances(&self) -> AmmResult<[U256; 2]> {
        Ok([
            math::mul(self.balances[0], self.precisions[0], "scale balance")?,
            math::mul(self.balances[1], self.precisions[1], "scale balance")?,
        ])
    }

    fn ann(&self) -> AmmResult<U256> {
        math::mul(self.amplification, U256::from(N_COINS), "amplification")
    }

    /// Invariant `D` for scaled balances `xp`
    pub fn invariant(&self, xp: [U256; 2]) -> AmmResult<U256> {
        let sum = math::add(xp[0], xp[1], "balance sum")?;
        if sum.is_zero() {
            return Ok(U256::zero());
        }
        let ann = self.ann()?;
        let n = U256::from(N_COINS);

        let mut d = sum;
        for _ in 0..self.max_iterations {
            let mut d_product = d;
            for x in xp.iter() {
                let denominator = math::mul(*x, n, "invariant product")?;
                d_product = math::mul_div(d_product, d, denominator, "invariant product")?;
            }
            let previous = d;
            let numerator = math::add(
                math::mul(ann, sum, "invariant numerator")?,
                math::mul(d_product, n, "invariant numerator")?,
                "invariant numerator",
            )?;
            let denominator = math::add(
                math::mul(ann - U256::one(), d, "invariant denominator")?,
                math::mul(n + U256::one(), d_product, "invariant denominator")?,
                "invariant denominator",
            )?;
            d = math::mul_div(numerator, d, denominator, "invariant step")?;
            if within_tolerance(d, previous) {
                return Ok(d);
            }
        }
        Err(AmmError::NoConvergence {
            stage: "invariant",
            iterations: self.max_iterations,
        })
    }

    /// Scaled balance of the other coin once one coin's balance becomes `x`
    fn solve_balance(&self, x: U256, d: U256) -> AmmResult<U256> {
        let ann = self.ann()?;
        let n = U256::from(N_COINS);

        let c = math::mul_div(d, d, math::mul(x, n, "balance solve")?, "balance solve")?;
        let c = math::mul_div(c, d, math::mul(ann, n, "balance solve")?, "balance solve")?;
        let b = math::add(x, d / ann, "balance solve")?;

        let mut y = d;
        for _ in 0..self.max_iterations {
            let previous = y;
            let numerator = math::add(math::mul(y, y, "balance step")?, c, "balance step")?;
            let denominator = math::sub(
                math::add(math::mul(y, U256::from(2u64), "balance step")?, b, "balance step")?,
                d,
                "balance step",
            )?;
            if denominator.is_zero() {
                return Err(AmmError::DivisionByZero {
                    operation: "balance step",
                });
            }
            y = numerator / denominator;
            if within_tolerance(y, previous) {
                return Ok(y);
            }
        }
        Err(AmmError::NoConvergence {
            stage: "balance",
            iterations: self.max_iterations,
        })
    }

    /// Output of coin `j` for `amount_in` of coin `i`, fee deducted from the output
    pub fn output_amount(&self, i: usize, amount_in: U256) -> AmmResult<U256> {
        if amount_in.is_zero() {
            return Err(AmmError::ZeroInput);
        }
        self.check()?;
        let j = 1 - i;

        let xp = self.scaled_balances()?;
        let d = self.invariant(xp)?;
        let x = math::add(
            xp[i],
            math::mul(amount_in, self.precisions[i], "scale input")?,
            "scale input",
        )?;
        let y = self.solve_balance(x, d)?;
        if y >= xp[j] {
            return Err(AmmError::InsufficientLiquidity {
                requested: amount_in.to_string(),
                available: self.balances[j].to_string(),
            });
        }
        // one unit held back against rounding in the pool's favour
        let dy = xp[j] - y - U256::one();
        let fee = math::mul_div(
            dy,
            U256::from(self.fee_bps),
            U256::from(BPS_DENOMINATOR),
            "output fee",
        )?;
        Ok((dy - fee) / self.precisions[j])
    }

    /// Marginal-rate output estimated from a probe trade
    pub fn spot_output(&self, i: usize, amount_in: U256) -> AmmResult<U256> {
        let probe = probe_size(self.balances[i]);
        let probe_out = self.output_amount(i, probe)?;
        math::mul_div(amount_in, probe_out, probe, "stable spot output")
    }

    pub fn price_impact_bps(&self, i: usize, amount_in: U256, amount_out: U256) -> AmmResult<u32> {
        Ok(math::shortfall_bps(self.spot_output(i, amount_in)?, amount_out))
    }

    /// Marginal raw-unit exchange rate, for search heuristics
    pub fn spot_rate(&self, i: usize) -> f64 {
        let probe = probe_size(self.balances[i]);
        match self.output_amount(i, probe) {
            Ok(out) => math::to_f64(out) / math::to_f64(probe),
            Err(_) => 0.0,
        }
    }
}

fn probe_size(balance: U256) -> U256 {
    (balance / U256::from(1_000_000u64)).max(U256::one())
}

fn within_tolerance(a: U256, b: U256) -> bool {
    let diff = if a > b { a - b } else { b - a };
    diff <= U256::from(CONVERGENCE_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e18(n: u64) -> U256 {
        U256::from(n) * U256::exp10(18)
    }

    fn balanced() -> StableSwapPool {
        StableSwapPool::new(
            [e18(1_000_000), e18(1_000_000)],
            [U256::one(), U256::one()],
            U256::from(100u64),
            4,
        )
    }

    #[test]
    fn test_balanced_pool_trades_near_par() {
        let pool = balanced();
        let out = pool.output_amount(0, e18(1_000)).unwrap();
        // near 1:1 minus the 4 bps fee
        assert!(out > e18(999) * U256::from(995u64) / U256::from(1_000u64));
        assert!(out < e18(1_000));
    }

    #[test]
    fn test_invariant_of_balanced_pool_is_sum() {
        let pool = balanced();
        let d = pool.invariant([e18(1_000_000), e18(1_000_000)]).unwrap();
        let expected = e18(2_000_000);
        let diff = if d > expected { d - expected } else { expected - d };
        assert!(diff <= U256::from(2u64));
    }

    #[test]
    fn test_mixed_precision_output_units() {
        // coin0 has 18 decimals, coin1 has 6 decimals scaled by 10^12
        let pool = StableSwapPool::new(
            [e18(1_000_000), U256::from(1_000_000u64) * U256::exp10(6)],
            [U256::one(), U256::exp10(12)],
            U256::from(200u64),
            4,
        );
        let out = pool.output_amount(0, e18(100)).unwrap();
        // roughly 100 units of a 6-decimal token
        assert!(out > U256::from(99_000_000u64));
        assert!(out < U256::from(100_000_000u64));
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let pool = StableSwapPool::new(
            [e18(1_000_000), e18(1)],
            [U256::one(), U256::one()],
            U256::from(100u64),
            4,
        )
        .with_max_iterations(1);
        assert!(matches!(
            pool.output_amount(0, e18(10)),
            Err(AmmError::NoConvergence { .. })
        ));
    }

    #[test]
    fn test_impact_small_for_balanced_pool() {
        let pool = balanced();
        let amount = e18(10_000);
        let out = pool.output_amount(0, amount).unwrap();
        let impact = pool.price_impact_bps(0, amount, out).unwrap();
        assert!(impact < 5);
    }
}
