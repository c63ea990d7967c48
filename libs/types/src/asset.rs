//! Fungible asset identity

use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A token on a specific chain. Immutable once registered in the market graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub id: Address,
    pub decimals: u8,
    pub chain_id: u64,
    #[serde(default)]
    pub symbol: Option<String>,
}

impl Asset {
    pub fn new(id: Address, decimals: u8, chain_id: u64) -> Self {
        Self {
            id,
            decimals,
            chain_id,
            symbol: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// `10^decimals`, the raw-unit size of one whole token
    pub fn unit(&self) -> U256 {
        U256::exp10(self.decimals as usize)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{}", symbol),
            None => write!(f, "0x{}", hex::encode(self.id.as_bytes())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_scales_with_decimals() {
        let usdc = Asset::new(Address::repeat_byte(0x11), 6, 137);
        assert_eq!(usdc.unit(), U256::from(1_000_000u64));

        let weth = Asset::new(Address::repeat_byte(0x22), 18, 137).with_symbol("WETH");
        assert_eq!(weth.unit(), U256::exp10(18));
        assert_eq!(weth.to_string(), "WETH");
    }
}
