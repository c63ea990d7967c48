//! # Gas Oracle - EIP-1559 Cost Inputs
//!
//! ## Purpose
//!
//! Tracks the fee market of recent blocks and produces the [`GasQuote`] the profit model
//! prices routes with. The quote carries the latest base fee, a priority fee scaled up
//! under congestion, and the observed trend so callers can see which way fees move.
//!
//! ## Integration Points
//!
//! - **Chain reads**: [`GasOracle::refresh`] samples the latest block through any
//!   [`ChainReader`]; the runtime hands it the rate-limited reader
//! - **Profit model**: [`GasQuote`] feeds `ProfitModel::effective_gas_price`
//! - **Executor**: `max_fee_per_gas` and `priority_fee` become the EIP-1559 fields
//!
//! ## Congestion
//!
//! ```text
//! congestion = ½ × block utilization + ½ × trend component
//! trend      = mean(newer half) vs mean(older half), ± threshold
//! priority   = sampled priority × (1 + congestion)
//! ```

use crate::config::GasOracleConfig;
use network::{ChainReader, GasSample, NetworkResult};
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use types::U256;

const GWEI: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GasTrend {
    Rising,
    Falling,
    #[default]
    Stable,
}

/// Fee inputs for one pricing pass
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GasQuote {
    pub block_number: u64,
    pub base_fee: U256,
    pub priority_fee: U256,
    /// 0.0 (idle) ..= 1.0 (saturated)
    pub congestion: f64,
    pub trend: GasTrend,
}

impl GasQuote {
    /// Cap that survives one full base-fee doubling
    pub fn max_fee_per_gas(&self) -> U256 {
        self.base_fee
            .saturating_mul(U256::from(2u8))
            .saturating_add(self.priority_fee)
    }
}

pub struct GasOracle {
    config: GasOracleConfig,
    history: RwLock<VecDeque<GasSample>>,
}

impl GasOracle {
    pub fn new(config: GasOracleConfig) -> Self {
        Self {
            history: RwLock::new(VecDeque::with_capacity(config.history_blocks.max(1))),
            config,
        }
    }

    /// Add a block sample; repeats of the latest block replace it
    pub fn record(&self, sample: GasSample) {
        let mut history = self.history.write();
        if history
            .back()
            .map_or(false, |last| last.block_number == sample.block_number)
        {
            history.pop_back();
        }
        history.push_back(sample);
        while history.len() > self.config.history_blocks.max(1) {
            history.pop_front();
        }
    }

    pub fn samples(&self) -> usize {
        self.history.read().len()
    }

    pub fn trend(&self) -> GasTrend {
        let history = self.history.read();
        if history.len() < 2 {
            return GasTrend::Stable;
        }
        let half = history.len() / 2;
        let older = mean_base_fee(history.iter().take(half));
        let newer = mean_base_fee(history.iter().skip(half));
        if older <= 0.0 {
            return GasTrend::Stable;
        }

        let threshold = self.config.trend_threshold.to_f64().unwrap_or(0.10);
        let change = (newer - older) / older;
        if change > threshold {
            GasTrend::Rising
        } else if change < -threshold {
            GasTrend::Falling
        } else {
            GasTrend::Stable
        }
    }

    /// Blend of latest utilization and trend, clamped to 0..=1
    pub fn congestion(&self) -> f64 {
        let utilization = self
            .history
            .read()
            .back()
            .map_or(0.0, |sample| sample.utilization());
        let trend = match self.trend() {
            GasTrend::Rising => 1.0,
            GasTrend::Stable => 0.5,
            GasTrend::Falling => 0.0,
        };
        (0.5 * utilization + 0.5 * trend).clamp(0.0, 1.0)
    }

    pub fn quote(&self) -> GasQuote {
        let latest = self.history.read().back().copied().unwrap_or_default();
        let congestion = self.congestion();

        let sampled = if latest.priority_fee.is_zero() {
            U256::from(self.config.default_priority_fee_gwei).saturating_mul(U256::from(GWEI))
        } else {
            latest.priority_fee
        };
        // Per-mille factor keeps the scaling in integers
        let factor = 1_000 + (congestion * 1_000.0).round() as u64;
        let priority_fee = sampled.saturating_mul(U256::from(factor)) / U256::from(1_000u64);

        GasQuote {
            block_number: latest.block_number,
            base_fee: latest.base_fee,
            priority_fee,
            congestion,
            trend: self.trend(),
        }
    }

    pub async fn refresh(&self, reader: &dyn ChainReader) -> NetworkResult<GasQuote> {
        let sample = reader.gas_sample().await?;
        self.record(sample);
        let quote = self.quote();
        crate::log_gas!(
            "block {} base={} priority={} congestion={:.2} trend={:?}",
            quote.block_number,
            quote.base_fee,
            quote.priority_fee,
            quote.congestion,
            quote.trend
        );
        Ok(quote)
    }

    /// Sample the chain every `refresh_ms` until the task is dropped
    pub async fn run(self: Arc<Self>, reader: Arc<dyn ChainReader>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.refresh_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = self.refresh(reader.as_ref()).await {
                warn!("Gas sample failed, keeping last quote: {}", e);
            }
        }
    }
}

fn mean_base_fee<'a>(samples: impl Iterator<Item = &'a GasSample>) -> f64 {
    let (sum, count) = samples.fold((0.0, 0usize), |(sum, count), sample| {
        (sum + amm::math::to_f64(sample.base_fee), count + 1)
    });
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

impl std::fmt::Debug for GasOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GasOracle")
            .field("samples", &self.samples())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use network::StaticChainReader;

    fn sample(block_number: u64, base_gwei: u64, used: u64) -> GasSample {
        GasSample {
            block_number,
            base_fee: U256::from(base_gwei * GWEI),
            priority_fee: U256::from(2 * GWEI),
            gas_used: U256::from(used),
            gas_limit: U256::from(100u64),
        }
    }

    #[test]
    fn test_history_is_bounded_and_deduplicated() {
        let oracle = GasOracle::new(GasOracleConfig {
            history_blocks: 3,
            ..GasOracleConfig::default()
        });
        for block in 1..=5 {
            oracle.record(sample(block, 30, 50));
        }
        oracle.record(sample(5, 31, 50));
        assert_eq!(oracle.samples(), 3);
        assert_eq!(oracle.quote().base_fee, U256::from(31 * GWEI));
    }

    #[test]
    fn test_trend_detection() {
        let oracle = GasOracle::new(GasOracleConfig::default());
        for (block, base) in [(1, 30), (2, 30), (3, 40), (4, 40)] {
            oracle.record(sample(block, base, 50));
        }
        assert_eq!(oracle.trend(), GasTrend::Rising);

        let falling = GasOracle::new(GasOracleConfig::default());
        for (block, base) in [(1, 40), (2, 40), (3, 30), (4, 30)] {
            falling.record(sample(block, base, 50));
        }
        assert_eq!(falling.trend(), GasTrend::Falling);
    }

    #[test]
    fn test_priority_scales_with_congestion() {
        let oracle = GasOracle::new(GasOracleConfig::default());
        oracle.record(sample(1, 30, 100));
        oracle.record(sample(2, 30, 100));
        // full blocks, stable trend: congestion 0.75
        let quote = oracle.quote();
        assert!((quote.congestion - 0.75).abs() < 1e-9);
        assert_eq!(quote.priority_fee, U256::from(3_500_000_000u64));
        assert_eq!(quote.max_fee_per_gas(), U256::from(63_500_000_000u64));
    }

    #[test]
    fn test_empty_history_uses_default_priority() {
        let oracle = GasOracle::new(GasOracleConfig::default());
        let quote = oracle.quote();
        assert_eq!(quote.base_fee, U256::zero());
        assert_eq!(quote.trend, GasTrend::Stable);
        // 30 gwei default, idle blocks, stable trend
        assert_eq!(quote.priority_fee, U256::from(37_500_000_000u64));
    }

    #[tokio::test]
    async fn test_refresh_reads_chain() {
        let reader = StaticChainReader::new();
        reader.set_gas(sample(42, 50, 20));
        let oracle = GasOracle::new(GasOracleConfig::default());
        let quote = oracle.refresh(&reader).await.unwrap();
        assert_eq!(quote.block_number, 42);
        assert_eq!(quote.base_fee, U256::from(50 * GWEI));
    }
}
