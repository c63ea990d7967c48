//! Edge and asset sanity checks
//!
//! Applied before anything enters the market graph. Checks are structural only; whether
//! an edge is worth searching is the pruner's call.

use crate::error::{StateError, StateResult};
use types::{Asset, CurveState, VenueEdge, BPS};

/// Decimals above this are treated as corrupt metadata
pub const MAX_DECIMALS: u8 = 30;

#[derive(Debug, Clone)]
pub struct EdgeValidator {
    /// Fees at or above this are rejected
    pub max_fee_bps: u32,
}

impl Default for EdgeValidator {
    fn default() -> Self {
        Self { max_fee_bps: 1_000 }
    }
}

impl EdgeValidator {
    pub fn validate_asset(&self, asset: &Asset) -> StateResult<()> {
        if asset.id.is_zero() {
            return Err(StateError::InvalidAsset {
                asset: asset.id,
                reason: "zero address".to_string(),
            });
        }
        if asset.decimals > MAX_DECIMALS {
            return Err(StateError::InvalidAsset {
                asset: asset.id,
                reason: format!("{} decimals", asset.decimals),
            });
        }
        Ok(())
    }

    pub fn validate_edge(&self, edge: &VenueEdge) -> StateResult<()> {
        let invalid = |reason: String| StateError::InvalidEdge {
            venue: edge.venue,
            reason,
        };

        if edge.venue.is_zero() {
            return Err(invalid("zero venue address".to_string()));
        }
        if edge.asset0 == edge.asset1 {
            return Err(invalid("identical assets".to_string()));
        }
        if edge.fee_bps >= self.max_fee_bps.min(BPS) {
            return Err(invalid(format!("fee {} bps", edge.fee_bps)));
        }
        if edge.protocol.curve_kind() != edge.curve_kind() {
            return Err(invalid(format!(
                "{:?} venue carries {:?} state",
                edge.protocol,
                edge.curve_kind()
            )));
        }

        match &edge.state {
            CurveState::ConstantProduct { .. } => Ok(()),
            CurveState::StableSwap {
                amplification,
                precision0,
                precision1,
                ..
            } => {
                if amplification.is_zero() {
                    return Err(invalid("zero amplification".to_string()));
                }
                if precision0.is_zero() || precision1.is_zero() {
                    return Err(invalid("zero precision multiplier".to_string()));
                }
                Ok(())
            }
            CurveState::Concentrated {
                sqrt_price_x96,
                sqrt_price_lower_x96,
                sqrt_price_upper_x96,
                ..
            } => {
                if sqrt_price_lower_x96 > sqrt_price_upper_x96 {
                    return Err(invalid("inverted tick range".to_string()));
                }
                if sqrt_price_x96 < sqrt_price_lower_x96 || sqrt_price_x96 > sqrt_price_upper_x96 {
                    return Err(invalid("price outside active tick range".to_string()));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{Address, VenueProtocol, U256};

    fn edge(state: CurveState, protocol: VenueProtocol) -> VenueEdge {
        VenueEdge {
            venue: Address::repeat_byte(0x10),
            protocol,
            asset0: Address::repeat_byte(0x01),
            asset1: Address::repeat_byte(0x02),
            state,
            fee_bps: 30,
            gas_estimate: 120_000,
            last_update_ns: 0,
            healthy: true,
        }
    }

    #[test]
    fn test_accepts_well_formed_edges() {
        let validator = EdgeValidator::default();
        let cp = edge(
            CurveState::ConstantProduct {
                reserve0: U256::from(1u64),
                reserve1: U256::from(1u64),
            },
            VenueProtocol::UniswapV2,
        );
        assert!(validator.validate_edge(&cp).is_ok());
    }

    #[test]
    fn test_rejects_malformed_edges() {
        let validator = EdgeValidator::default();

        let mut same_assets = edge(
            CurveState::ConstantProduct {
                reserve0: U256::one(),
                reserve1: U256::one(),
            },
            VenueProtocol::UniswapV2,
        );
        same_assets.asset1 = same_assets.asset0;
        assert!(validator.validate_edge(&same_assets).is_err());

        let wrong_family = edge(
            CurveState::ConstantProduct {
                reserve0: U256::one(),
                reserve1: U256::one(),
            },
            VenueProtocol::UniswapV3,
        );
        assert!(validator.validate_edge(&wrong_family).is_err());

        let outside = edge(
            CurveState::Concentrated {
                sqrt_price_x96: U256::from(10u64),
                liquidity: 1,
                tick: 0,
                sqrt_price_lower_x96: U256::from(20u64),
                sqrt_price_upper_x96: U256::from(30u64),
            },
            VenueProtocol::UniswapV3,
        );
        assert!(validator.validate_edge(&outside).is_err());

        let mut expensive = same_assets.clone();
        expensive.asset1 = Address::repeat_byte(0x02);
        expensive.fee_bps = 1_000;
        assert!(validator.validate_edge(&expensive).is_err());
    }

    #[test]
    fn test_asset_checks() {
        let validator = EdgeValidator::default();
        assert!(validator
            .validate_asset(&Asset::new(Address::repeat_byte(1), 18, 137))
            .is_ok());
        assert!(validator
            .validate_asset(&Asset::new(Address::zero(), 18, 137))
            .is_err());
        assert!(validator
            .validate_asset(&Asset::new(Address::repeat_byte(1), 31, 137))
            .is_err());
    }
}
