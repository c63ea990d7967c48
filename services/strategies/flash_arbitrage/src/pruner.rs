//! Venue pruning ahead of path search
//!
//! A venue survives when, in both directions, it holds enough liquidity, a probe trade
//! moves its price less than the impact ceiling, and the fee-and-impact quality score
//! clears the floor. Pruning works on a snapshot copy; the market graph is untouched.

use crate::config::PruneConfig;
use crate::profit::{scale, whole_units};
use amm::CurveEngine;
use rust_decimal::Decimal;
use state_market::GraphSnapshot;
use tracing::debug;
use types::{Direction, VenueEdge, BPS, U256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneVerdict {
    Keep,
    LowLiquidity,
    HighImpact,
    LowQuality,
    Unpriceable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub venues_in: usize,
    pub venues_kept: usize,
    pub low_liquidity: usize,
    pub high_impact: usize,
    pub low_quality: usize,
    pub unpriceable: usize,
}

impl PruneStats {
    fn record(&mut self, verdict: PruneVerdict) {
        self.venues_in += 1;
        match verdict {
            PruneVerdict::Keep => self.venues_kept += 1,
            PruneVerdict::LowLiquidity => self.low_liquidity += 1,
            PruneVerdict::HighImpact => self.high_impact += 1,
            PruneVerdict::LowQuality => self.low_quality += 1,
            PruneVerdict::Unpriceable => self.unpriceable += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pruner {
    config: PruneConfig,
    engine: CurveEngine,
}

impl Pruner {
    pub fn new(config: PruneConfig, engine: CurveEngine) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &PruneConfig {
        &self.config
    }

    pub fn prune(&self, snapshot: &GraphSnapshot) -> (GraphSnapshot, PruneStats) {
        let mut stats = PruneStats::default();
        let pruned = snapshot.retain_venues(|edge| {
            let verdict = self.evaluate(snapshot, edge);
            stats.record(verdict);
            verdict == PruneVerdict::Keep
        });
        debug!(
            "Pruned {} of {} venues (liquidity={} impact={} quality={} unpriceable={})",
            stats.venues_in - stats.venues_kept,
            stats.venues_in,
            stats.low_liquidity,
            stats.high_impact,
            stats.low_quality,
            stats.unpriceable
        );
        (pruned, stats)
    }

    pub fn evaluate(&self, snapshot: &GraphSnapshot, edge: &VenueEdge) -> PruneVerdict {
        [Direction::ZeroForOne, Direction::OneForZero]
            .into_iter()
            .map(|direction| self.evaluate_direction(snapshot, edge, direction))
            .find(|verdict| *verdict != PruneVerdict::Keep)
            .unwrap_or(PruneVerdict::Keep)
    }

    fn evaluate_direction(
        &self,
        snapshot: &GraphSnapshot,
        edge: &VenueEdge,
        direction: Direction,
    ) -> PruneVerdict {
        if !edge.healthy || edge.state.is_empty() {
            return PruneVerdict::Unpriceable;
        }
        let (asset_in, _) = edge.assets_for(direction);
        let Some(decimals) = snapshot.asset(&asset_in).map(|asset| asset.decimals) else {
            return PruneVerdict::Unpriceable;
        };
        let Ok(reserve_in) = self.engine.input_reserve(&edge.state, direction) else {
            return PruneVerdict::Unpriceable;
        };

        if reserve_in < whole_units(self.config.min_liquidity_units, decimals) {
            return PruneVerdict::LowLiquidity;
        }

        let probe = scale(
            reserve_in,
            Decimal::new(self.config.probe_fraction_bps as i64, 4),
        )
        .max(U256::one());
        let Ok(quote) = self.engine.quote(&edge.state, edge.fee_bps, probe, direction) else {
            return PruneVerdict::Unpriceable;
        };
        if quote.amount_out.is_zero() {
            return PruneVerdict::Unpriceable;
        }
        if quote.price_impact_bps > self.config.max_impact_bps {
            return PruneVerdict::HighImpact;
        }

        let bps = BPS as f64;
        let quality = (1.0 - edge.fee_bps as f64 / bps) * (1.0 - quote.price_impact_bps as f64 / bps);
        if quality < self.config.min_quality {
            return PruneVerdict::LowQuality;
        }
        PruneVerdict::Keep
    }
}
