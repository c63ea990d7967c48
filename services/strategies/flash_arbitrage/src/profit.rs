//! Profit model
//!
//! Turns a priced route into net profit in start-asset units:
//!
//! ```text
//! gas units  = (base + flash loan + Σ hop gas) × buffer
//! gas cost   = gas units × (base fee + priority fee × multiplier)   [wei → start asset]
//! fee cost   = flash-loan fee(amount_in) + leakage × max(gross, 0)
//! net        = gross − gas cost − fee cost
//! ```
//!
//! Everything settles in `U256`; the `Decimal` factors are applied with integer
//! multiply-then-divide so no amount ever passes through a float.

use crate::capital::CapitalSelector;
use crate::config::{GasConversionPolicy, ProfitConfig};
use crate::gas_price::{GasOracle, GasQuote};
use amm::CurveEngine;
use rust_decimal::Decimal;
use state_market::GraphSnapshot;
use std::sync::Arc;
use types::{Address, CandidatePath, Hop, I256, U256, U512};

/// `value × factor`, rounded down; negative factors yield zero
pub fn scale(value: U256, factor: Decimal) -> U256 {
    if factor <= Decimal::ZERO || value.is_zero() {
        return U256::zero();
    }
    let mantissa = U256::from(factor.mantissa().unsigned_abs());
    let divisor = U256::exp10(factor.scale() as usize);
    let product = value.full_mul(mantissa) / divisor.full_mul(U256::one());
    U256::try_from(product).unwrap_or(U256::MAX)
}

/// Whole-unit decimal amount as raw token units
pub fn whole_units(value: Decimal, decimals: u8) -> U256 {
    scale(U256::exp10(decimals as usize), value)
}

/// `amount × fee_bps / 10000`, rounded up so the repayment is never short
pub fn fee_for(amount: U256, fee_bps: u32) -> U256 {
    if fee_bps == 0 || amount.is_zero() {
        return U256::zero();
    }
    let numerator = amount.full_mul(U256::from(fee_bps));
    let denominator = U256::from(types::BPS).full_mul(U256::one());
    let mut fee = numerator / denominator;
    if !(numerator % denominator).is_zero() {
        fee = fee + U512::one();
    }
    U256::try_from(fee).unwrap_or(U256::MAX)
}

#[derive(Debug, Clone)]
pub struct ProfitModel {
    config: ProfitConfig,
}

impl ProfitModel {
    pub fn new(config: ProfitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProfitConfig {
        &self.config
    }

    /// Buffered gas units for a route
    pub fn gas_units(&self, hops: &[Hop], flash_loan: bool) -> u64 {
        let swaps: u64 = hops
            .iter()
            .map(|hop| {
                if hop.gas_estimate == 0 {
                    self.config.per_swap_gas
                } else {
                    hop.gas_estimate
                }
            })
            .sum();
        let loan = if flash_loan {
            self.config.flash_loan_gas
        } else {
            0
        };
        let raw = U256::from(self.config.base_gas + loan + swaps);
        scale(raw, self.config.gas_buffer).low_u64()
    }

    /// Gas price paid per unit under EIP-1559 with the priority multiplier applied
    pub fn effective_gas_price(&self, quote: &GasQuote) -> U256 {
        quote
            .base_fee
            .saturating_add(scale(quote.priority_fee, self.config.priority_multiplier))
    }

    pub fn gas_cost_wei(&self, units: u64, quote: &GasQuote) -> U256 {
        self.effective_gas_price(quote)
            .saturating_mul(U256::from(units))
    }

    /// Allowance for value lost to competing searchers
    pub fn mev_allowance(&self, gross_profit: I256) -> U256 {
        if gross_profit <= I256::zero() {
            return U256::zero();
        }
        scale(gross_profit.unsigned_abs(), self.config.mev_leakage)
    }

    /// The loan can be repaid out of the final output
    pub fn is_repayable(&self, final_output: U256, principal: U256, fee: U256) -> bool {
        principal
            .checked_add(fee)
            .map_or(false, |owed| final_output >= owed)
    }

    /// Clears the relative and absolute floors; `decimals` of the start asset
    pub fn clears_floors(&self, path: &CandidatePath, decimals: u8) -> bool {
        if !path.is_profitable() || path.net_profit_bps() < self.config.min_profit_bps {
            return false;
        }
        let floor = whole_units(self.config.min_net_profit, decimals);
        path.net_profit.unsigned_abs() >= floor
    }
}

/// Execution costs of a route, in start-asset units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathCosts {
    pub gas_cost: U256,
    pub fee_cost: U256,
}

/// Prices the non-swap costs of a route at a given size
pub trait CostModel: Send + Sync {
    /// `None` when the route cannot be funded or costed
    fn costs(&self, snapshot: &GraphSnapshot, hops: &[Hop]) -> Option<PathCosts>;
}

/// Fixed gas cost plus a flat capital fee; dry runs and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatCosts {
    pub gas_cost: U256,
    pub fee_bps: u32,
}

impl CostModel for FlatCosts {
    fn costs(&self, _snapshot: &GraphSnapshot, hops: &[Hop]) -> Option<PathCosts> {
        let amount_in = hops.first()?.amount_in;
        Some(PathCosts {
            gas_cost: self.gas_cost,
            fee_cost: fee_for(amount_in, self.fee_bps),
        })
    }
}

/// Live costs: current gas quote, cheapest capital source and leakage allowance
pub struct ExecutionCosts {
    model: ProfitModel,
    gas: GasQuote,
    capital: CapitalSelector,
    engine: CurveEngine,
    native_asset: Address,
}

impl ExecutionCosts {
    pub fn new(
        model: ProfitModel,
        gas: GasQuote,
        capital: CapitalSelector,
        engine: CurveEngine,
        native_asset: Address,
    ) -> Self {
        Self {
            model,
            gas,
            capital,
            engine,
            native_asset,
        }
    }

    pub fn model(&self) -> &ProfitModel {
        &self.model
    }
}

impl CostModel for ExecutionCosts {
    fn costs(&self, snapshot: &GraphSnapshot, hops: &[Hop]) -> Option<PathCosts> {
        let first = hops.first()?;
        let last = hops.last()?;
        let start = first.asset_in;

        let units = self.model.gas_units(hops, true);
        let wei = self.model.gas_cost_wei(units, &self.gas);
        let gas_cost = match convert_native(snapshot, &self.engine, self.native_asset, start, wei)
        {
            Some(cost) => cost,
            None => match self.model.config.gas_conversion {
                GasConversionPolicy::Reject => return None,
                GasConversionPolicy::Ignore => U256::zero(),
            },
        };

        let fee_bps = self.capital.cheapest_fee_bps(start, first.amount_in)?;
        let gross = I256::from_raw(last.amount_out).saturating_sub(I256::from_raw(first.amount_in));
        let fee_cost = fee_for(first.amount_in, fee_bps).saturating_add(self.model.mev_allowance(gross));

        Some(PathCosts { gas_cost, fee_cost })
    }
}

/// Hands out a cost model reflecting conditions at the moment of the call
pub trait CostSource: Send + Sync {
    fn cost_model(&self) -> Arc<dyn CostModel>;
}

impl CostSource for FlatCosts {
    fn cost_model(&self) -> Arc<dyn CostModel> {
        Arc::new(*self)
    }
}

/// Builds [`ExecutionCosts`] from the latest gas quote on every call
pub struct LiveCosts {
    model: ProfitModel,
    oracle: Arc<GasOracle>,
    capital: CapitalSelector,
    engine: CurveEngine,
    native_asset: Address,
}

impl LiveCosts {
    pub fn new(
        model: ProfitModel,
        oracle: Arc<GasOracle>,
        capital: CapitalSelector,
        engine: CurveEngine,
        native_asset: Address,
    ) -> Self {
        Self {
            model,
            oracle,
            capital,
            engine,
            native_asset,
        }
    }
}

impl CostSource for LiveCosts {
    fn cost_model(&self) -> Arc<dyn CostModel> {
        Arc::new(ExecutionCosts::new(
            self.model.clone(),
            self.oracle.quote(),
            self.capital.clone(),
            self.engine.clone(),
            self.native_asset,
        ))
    }
}

/// Value a native-asset amount in `target` through the deepest direct venue
pub fn convert_native(
    snapshot: &GraphSnapshot,
    engine: &CurveEngine,
    native: Address,
    target: Address,
    amount: U256,
) -> Option<U256> {
    if target == native || amount.is_zero() {
        return Some(amount);
    }
    snapshot
        .neighbors(&native)
        .iter()
        .filter(|directed| directed.asset_out() == target)
        .filter_map(|directed| {
            engine
                .quote(
                    &directed.edge.state,
                    directed.edge.fee_bps,
                    amount,
                    directed.direction,
                )
                .ok()
                .map(|quote| quote.amount_out)
        })
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use types::{Direction, VenueProtocol};

    fn hop(amount_in: u64, amount_out: u64, gas: u64) -> Hop {
        Hop {
            venue: Address::repeat_byte(0xa1),
            protocol: VenueProtocol::UniswapV2,
            asset_in: Address::repeat_byte(1),
            asset_out: Address::repeat_byte(1),
            direction: Direction::ZeroForOne,
            amount_in: U256::from(amount_in),
            amount_out: U256::from(amount_out),
            fee_bps: 30,
            gas_estimate: gas,
            price_impact_bps: 0,
        }
    }

    #[test]
    fn test_scale_and_units() {
        assert_eq!(scale(U256::from(1_000u64), dec!(1.2)), U256::from(1_200u64));
        assert_eq!(scale(U256::from(999u64), dec!(0.1)), U256::from(99u64));
        assert_eq!(scale(U256::from(5u64), dec!(-1)), U256::zero());
        assert_eq!(whole_units(dec!(0.5), 6), U256::from(500_000u64));
    }

    #[test]
    fn test_fee_rounds_up() {
        assert_eq!(fee_for(U256::from(10_000u64), 5), U256::from(5u64));
        assert_eq!(fee_for(U256::from(10_001u64), 5), U256::from(6u64));
        assert_eq!(fee_for(U256::from(10_001u64), 0), U256::zero());
    }

    #[test]
    fn test_gas_units_follow_formula() {
        let model = ProfitModel::new(ProfitConfig::default());
        // (100k + 150k + 2 × 120k) × 1.2
        let hops = [hop(1, 1, 0), hop(1, 1, 120_000)];
        assert_eq!(model.gas_units(&hops, true), 588_000);
        assert_eq!(model.gas_units(&hops, false), 408_000);
    }

    #[test]
    fn test_eip1559_cost_uses_priority_multiplier() {
        let model = ProfitModel::new(ProfitConfig::default());
        let quote = GasQuote {
            base_fee: U256::from(100u64),
            priority_fee: U256::from(10u64),
            ..GasQuote::default()
        };
        assert_eq!(model.effective_gas_price(&quote), U256::from(115u64));
        assert_eq!(model.gas_cost_wei(1_000, &quote), U256::from(115_000u64));
    }

    #[test]
    fn test_leakage_and_repayability() {
        let model = ProfitModel::new(ProfitConfig::default());
        assert_eq!(model.mev_allowance(I256::from(1_000)), U256::from(100u64));
        assert_eq!(model.mev_allowance(I256::from(-1_000)), U256::zero());

        assert!(model.is_repayable(U256::from(105u64), U256::from(100u64), U256::from(5u64)));
        assert!(!model.is_repayable(U256::from(104u64), U256::from(100u64), U256::from(5u64)));
        assert!(!model.is_repayable(U256::MAX, U256::MAX, U256::one()));
    }

    #[test]
    fn test_profit_floors() {
        let model = ProfitModel::new(ProfitConfig {
            min_net_profit: dec!(0.0001),
            ..ProfitConfig::default()
        });
        // 60 bps net on a 1e6 input
        let good = CandidatePath::from_hops(
            vec![hop(1_000_000, 1_006_000, 0)],
            U256::zero(),
            U256::zero(),
            0,
        )
        .unwrap();
        assert!(model.clears_floors(&good, 6));
        // absolute floor of 0.0001 units at 18 decimals is 1e14 raw
        assert!(!model.clears_floors(&good, 18));

        let thin = CandidatePath::from_hops(
            vec![hop(1_000_000, 1_004_000, 0)],
            U256::zero(),
            U256::zero(),
            0,
        )
        .unwrap();
        assert!(!model.clears_floors(&thin, 6));
    }
}
