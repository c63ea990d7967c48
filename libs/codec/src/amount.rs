//! Lossless JSON representation of on-chain amounts
//!
//! Amounts are written as decimal strings. Decimal strings, `0x` hex strings and plain
//! JSON integers are all accepted when reading.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;
use types::U256;

pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    deserializer.deserialize_any(AmountVisitor)
}

/// Parse a decimal or `0x`-prefixed hex amount
pub fn parse(value: &str) -> Result<U256, String> {
    let trimmed = value.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        U256::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        U256::from_dec_str(trimmed).map_err(|e| e.to_string())
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = U256;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal string, 0x hex string or unsigned integer")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<U256, E> {
        parse(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<U256, E> {
        Ok(U256::from(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<U256, E> {
        u64::try_from(value)
            .map(U256::from)
            .map_err(|_| E::custom("negative amount"))
    }
}

/// Same representation for `u128` liquidity values
pub mod liquidity {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let wide = deserializer.deserialize_any(AmountVisitor)?;
        if wide > U256::from(u128::MAX) {
            return Err(de::Error::custom("liquidity exceeds u128"));
        }
        Ok(wide.as_u128())
    }
}
