//! Trade sizing
//!
//! Finds the input amount that maximizes net profit of a priced route. Gross output of a
//! chain of curves is concave in the input, and costs are flat or linear, so net profit
//! is unimodal and an integer ternary search converges on the optimum.

use types::{I256, U256};

#[derive(Debug, Clone)]
pub struct SizingConfig {
    /// Upper bound on search iterations
    pub max_iterations: u32,
    /// Smallest amount worth evaluating
    pub min_amount: U256,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 192,
            min_amount: U256::one(),
        }
    }
}

/// Best input found and its net profit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedTrade {
    pub amount_in: U256,
    pub net_profit: I256,
    pub evaluations: u32,
}

pub struct TradeSizer {
    config: SizingConfig,
}

impl TradeSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Maximize `profit(amount)` over `[min_amount, max_amount]`.
    ///
    /// `profit` returns `None` when an amount cannot be priced (unsafe, exceeds a tick,
    /// etc.); such points rank below every priced point.
    pub fn maximize<F>(&self, max_amount: U256, mut profit: F) -> Option<SizedTrade>
    where
        F: FnMut(U256) -> Option<I256>,
    {
        let mut lo = self.config.min_amount;
        let mut hi = max_amount;
        if hi < lo {
            return None;
        }

        let mut evaluations = 0u32;
        let mut best: Option<SizedTrade> = None;
        let mut eval = |amount: U256, best: &mut Option<SizedTrade>, evaluations: &mut u32| {
            *evaluations += 1;
            let value = profit(amount);
            if let Some(net) = value {
                if best.map_or(true, |b| net > b.net_profit) {
                    *best = Some(SizedTrade {
                        amount_in: amount,
                        net_profit: net,
                        evaluations: 0,
                    });
                }
            }
            value
        };

        let three = U256::from(3u64);
        let mut iterations = 0;
        while hi - lo > U256::from(2u64) && iterations < self.config.max_iterations {
            iterations += 1;
            let third = (hi - lo) / three;
            let m1 = lo + third;
            let m2 = hi - third;
            let f1 = eval(m1, &mut best, &mut evaluations);
            let f2 = eval(m2, &mut best, &mut evaluations);
            match (f1, f2) {
                (Some(a), Some(b)) if a < b => lo = m1,
                (Some(_), Some(_)) => hi = m2,
                (None, Some(_)) => lo = m1,
                (Some(_), None) => hi = m2,
                // both unpriceable: shrink towards smaller trades, which price more often
                (None, None) => hi = m1,
            }
        }

        if hi - lo <= U256::from(2u64) {
            let mut amount = lo;
            while amount <= hi {
                eval(amount, &mut best, &mut evaluations);
                amount += U256::one();
            }
        } else {
            // iteration cap hit before the bracket closed
            for amount in [lo, lo + (hi - lo) / U256::from(2u64), hi] {
                eval(amount, &mut best, &mut evaluations);
            }
        }

        best.map(|b| SizedTrade { evaluations, ..b })
    }
}

impl Default for TradeSizer {
    fn default() -> Self {
        Self::new(SizingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_product::ConstantProductPool;

    fn to_i256(v: U256) -> I256 {
        I256::from_raw(v)
    }

    #[test]
    fn test_finds_peak_of_concave_profit() {
        // profit(x) = -(x - 7000)^2, peak at 7000
        let sizer = TradeSizer::default();
        let result = sizer
            .maximize(U256::from(1_000_000u64), |x| {
                let d = x.low_u64() as i64 - 7_000;
                Some(I256::from(-(d * d)))
            })
            .unwrap();
        assert_eq!(result.amount_in, U256::from(7_000u64));
        assert_eq!(result.net_profit, I256::zero());
    }

    #[test]
    fn test_two_pool_round_trip_sizing() {
        let unit = U256::exp10(18);
        let buy = ConstantProductPool::new(unit * U256::from(10_000u64), unit * U256::from(20_000u64), 30);
        let sell = ConstantProductPool::new(unit * U256::from(19_000u64), unit * U256::from(10_500u64), 30);
        let cap = unit * U256::from(1_000u64);

        let result = TradeSizer::default()
            .maximize(cap, |x| {
                let mid = buy.output_amount(x).ok()?;
                let out = sell.output_amount(mid).ok()?;
                Some(to_i256(out) - to_i256(x))
            })
            .unwrap();

        assert!(result.net_profit > I256::zero());
        assert!(result.amount_in <= cap);
        // neighbours are no better
        let probe = |x: U256| {
            let mid = buy.output_amount(x).unwrap();
            to_i256(sell.output_amount(mid).unwrap()) - to_i256(x)
        };
        let step = unit / U256::from(100u64);
        assert!(probe(result.amount_in + step) <= result.net_profit);
        assert!(probe(result.amount_in - step) <= result.net_profit);
    }

    #[test]
    fn test_unpriceable_everywhere_yields_none() {
        let result = TradeSizer::default().maximize(U256::from(1_000u64), |_| None);
        assert!(result.is_none());
    }

    #[test]
    fn test_empty_range() {
        let sizer = TradeSizer::new(SizingConfig {
            max_iterations: 10,
            min_amount: U256::from(10u64),
        });
        assert!(sizer.maximize(U256::from(5u64), |_| Some(I256::from(1))).is_none());
    }
}
