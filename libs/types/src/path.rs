//! Candidate paths
//!
//! A [`CandidatePath`] is a priced closed walk. It is derived data: re-pricing at a
//! different input amount or against newer venue state builds a new path.

use crate::curve::Direction;
use crate::error::TypesError;
use crate::opportunity::ArbitrageKind;
use crate::venue::VenueProtocol;
use ethers_core::types::{Address, I256, U256};
use std::cmp::Ordering;

/// One priced swap through a venue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub venue: Address,
    pub protocol: VenueProtocol,
    pub asset_in: Address,
    pub asset_out: Address,
    pub direction: Direction,
    pub amount_in: U256,
    pub amount_out: U256,
    pub fee_bps: u32,
    pub gas_estimate: u64,
    pub price_impact_bps: u32,
}

/// Identity of a path independent of its pricing: start asset plus ordered venues
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey {
    pub start_asset: Address,
    pub venues: Vec<Address>,
}

/// Priced closed walk starting and ending at the same asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePath {
    pub hops: Vec<Hop>,
    pub amount_in: U256,
    pub gross_output: U256,
    pub gross_profit: I256,
    /// Sum of per-hop price impact
    pub slippage_bps: u32,
    pub gas_units: u64,
    /// Gas cost expressed in start-asset units
    pub gas_cost: U256,
    /// Capital fee and execution allowances in start-asset units
    pub fee_cost: U256,
    pub net_profit: I256,
    /// Net profit per million units of input; higher is better
    pub score: i64,
    pub priced_at_ns: u64,
}

impl CandidatePath {
    /// Build a path from priced hops, checking closure and hop continuity
    pub fn from_hops(
        hops: Vec<Hop>,
        gas_cost: U256,
        fee_cost: U256,
        priced_at_ns: u64,
    ) -> Result<Self, TypesError> {
        let (first, last) = match (hops.first(), hops.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(TypesError::EmptyPath),
        };
        if first.asset_in != last.asset_out {
            return Err(TypesError::OpenPath {
                start: first.asset_in,
                end: last.asset_out,
            });
        }
        for (index, pair) in hops.windows(2).enumerate() {
            if pair[0].asset_out != pair[1].asset_in || pair[0].amount_out != pair[1].amount_in
            {
                return Err(TypesError::BrokenContinuity { hop: index + 1 });
            }
        }

        let amount_in = first.amount_in;
        let gross_output = last.amount_out;
        let gross_profit = signed(gross_output)?
            .checked_sub(signed(amount_in)?)
            .ok_or(TypesError::AmountOverflow)?;
        let costs = gas_cost
            .checked_add(fee_cost)
            .ok_or(TypesError::AmountOverflow)?;
        let net_profit = gross_profit
            .checked_sub(signed(costs)?)
            .ok_or(TypesError::AmountOverflow)?;

        let slippage_bps = hops
            .iter()
            .fold(0u32, |acc, hop| acc.saturating_add(hop.price_impact_bps));
        let gas_units = hops.iter().map(|hop| hop.gas_estimate).sum();
        let score = per_million(net_profit, amount_in);

        Ok(Self {
            hops,
            amount_in,
            gross_output,
            gross_profit,
            slippage_bps,
            gas_units,
            gas_cost,
            fee_cost,
            net_profit,
            score,
            priced_at_ns,
        })
    }

    /// Same route priced with a different capital and allowance cost
    pub fn with_fee_cost(&self, fee_cost: U256) -> Result<Self, TypesError> {
        let costs = self
            .gas_cost
            .checked_add(fee_cost)
            .ok_or(TypesError::AmountOverflow)?;
        let net_profit = self
            .gross_profit
            .checked_sub(signed(costs)?)
            .ok_or(TypesError::AmountOverflow)?;
        Ok(Self {
            fee_cost,
            net_profit,
            score: per_million(net_profit, self.amount_in),
            ..self.clone()
        })
    }

    pub fn start_asset(&self) -> Address {
        self.hops[0].asset_in
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Venues in hop order
    pub fn venues(&self) -> Vec<Address> {
        self.hops.iter().map(|hop| hop.venue).collect()
    }

    /// Sorted, deduplicated venue set; equal for rotations and reversals of one cycle
    pub fn venue_signature(&self) -> Vec<Address> {
        let mut venues = self.venues();
        venues.sort();
        venues.dedup();
        venues
    }

    pub fn key(&self) -> PathKey {
        PathKey {
            start_asset: self.start_asset(),
            venues: self.venues(),
        }
    }

    pub fn contains_venue(&self, venue: Address) -> bool {
        self.hops.iter().any(|hop| hop.venue == venue)
    }

    pub fn is_profitable(&self) -> bool {
        self.net_profit > I256::zero()
    }

    /// Net profit in basis points of the input amount
    pub fn net_profit_bps(&self) -> i64 {
        self.score / 100
    }

    pub fn kind(&self) -> ArbitrageKind {
        ArbitrageKind::from_hop_count(self.hop_count())
    }

    /// Ranking order: higher score first, then fewer hops, then lower slippage
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| self.hop_count().cmp(&other.hop_count()))
            .then_with(|| self.slippage_bps.cmp(&other.slippage_bps))
    }
}

/// Sort paths best-first
pub fn rank_paths(paths: &mut [CandidatePath]) {
    paths.sort_by(|a, b| a.rank_cmp(b));
}

pub(crate) fn signed(value: U256) -> Result<I256, TypesError> {
    if value.bit(255) {
        return Err(TypesError::AmountOverflow);
    }
    Ok(I256::from_raw(value))
}

fn per_million(value: I256, base: U256) -> i64 {
    if base.is_zero() {
        return 0;
    }
    let magnitude = value.unsigned_abs().full_mul(U256::from(1_000_000u64)) / base.full_mul(U256::one());
    let clamped = if magnitude > ethers_core::types::U512::from(i64::MAX as u64) {
        i64::MAX
    } else {
        magnitude.low_u64() as i64
    };
    if value.is_negative() {
        -clamped
    } else {
        clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hop(venue: u8, asset_in: u8, asset_out: u8, amount_in: u64, amount_out: u64) -> Hop {
        Hop {
            venue: Address::repeat_byte(venue),
            protocol: VenueProtocol::UniswapV2,
            asset_in: Address::repeat_byte(asset_in),
            asset_out: Address::repeat_byte(asset_out),
            direction: Direction::ZeroForOne,
            amount_in: U256::from(amount_in),
            amount_out: U256::from(amount_out),
            fee_bps: 30,
            gas_estimate: 100_000,
            price_impact_bps: 10,
        }
    }

    #[test]
    fn test_profit_accounting() {
        let path = CandidatePath::from_hops(
            vec![
                hop(0xa1, 1, 2, 1_000, 2_000),
                hop(0xa2, 2, 3, 2_000, 500),
                hop(0xa3, 3, 1, 500, 1_100),
            ],
            U256::from(30u64),
            U256::from(20u64),
            0,
        )
        .unwrap();

        assert_eq!(path.gross_output, U256::from(1_100u64));
        assert_eq!(path.gross_profit, I256::from(100));
        assert_eq!(path.net_profit, I256::from(50));
        assert_eq!(path.score, 50_000);
        assert_eq!(path.net_profit_bps(), 500);
        assert_eq!(path.slippage_bps, 30);
        assert_eq!(path.gas_units, 300_000);
        assert_eq!(path.kind(), ArbitrageKind::Triangular);
        assert!(path.is_profitable());

        let pricier = path.with_fee_cost(U256::from(70u64)).unwrap();
        assert_eq!(pricier.net_profit, I256::zero());
        assert_eq!(pricier.score, 0);
        assert_eq!(pricier.gross_output, path.gross_output);
        assert!(!pricier.is_profitable());
    }

    #[test]
    fn test_losing_path_has_negative_score() {
        let path = CandidatePath::from_hops(
            vec![hop(0xa1, 1, 2, 1_000, 900), hop(0xa2, 2, 1, 900, 990)],
            U256::zero(),
            U256::zero(),
            0,
        )
        .unwrap();
        assert_eq!(path.net_profit, I256::from(-10));
        assert!(path.score < 0);
        assert!(!path.is_profitable());
    }

    #[test]
    fn test_rejects_open_and_broken_paths() {
        let open = CandidatePath::from_hops(
            vec![hop(0xa1, 1, 2, 1_000, 2_000)],
            U256::zero(),
            U256::zero(),
            0,
        );
        assert!(matches!(open, Err(TypesError::OpenPath { .. })));

        let broken = CandidatePath::from_hops(
            vec![hop(0xa1, 1, 2, 1_000, 2_000), hop(0xa2, 2, 1, 1_999, 1_100)],
            U256::zero(),
            U256::zero(),
            0,
        );
        assert!(matches!(broken, Err(TypesError::BrokenContinuity { hop: 1 })));

        assert!(matches!(
            CandidatePath::from_hops(vec![], U256::zero(), U256::zero(), 0),
            Err(TypesError::EmptyPath)
        ));
    }

    #[test]
    fn test_rank_tie_breaks() {
        let short = CandidatePath::from_hops(
            vec![hop(0xa1, 1, 2, 1_000, 2_000), hop(0xa2, 2, 1, 2_000, 1_100)],
            U256::zero(),
            U256::zero(),
            0,
        )
        .unwrap();
        let long = CandidatePath::from_hops(
            vec![
                hop(0xb1, 1, 2, 1_000, 2_000),
                hop(0xb2, 2, 3, 2_000, 500),
                hop(0xb3, 3, 1, 500, 1_100),
            ],
            U256::zero(),
            U256::zero(),
            0,
        )
        .unwrap();
        assert_eq!(short.score, long.score);

        let mut paths = vec![long.clone(), short.clone()];
        rank_paths(&mut paths);
        assert_eq!(paths[0], short);

        let mut smoother = short.clone();
        smoother.slippage_bps = 1;
        let mut paths = vec![short.clone(), smoother.clone()];
        rank_paths(&mut paths);
        assert_eq!(paths[0], smoother);
    }

    #[test]
    fn test_venue_signature_ignores_rotation() {
        let a = CandidatePath::from_hops(
            vec![hop(0xa2, 1, 2, 10, 10), hop(0xa1, 2, 1, 10, 10)],
            U256::zero(),
            U256::zero(),
            0,
        )
        .unwrap();
        let b = CandidatePath::from_hops(
            vec![hop(0xa1, 2, 1, 10, 10), hop(0xa2, 1, 2, 10, 10)],
            U256::zero(),
            U256::zero(),
            0,
        )
        .unwrap();
        assert_eq!(a.venue_signature(), b.venue_signature());
        assert_ne!(a.key(), b.key());
    }
}
