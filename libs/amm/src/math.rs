//! 256-bit helpers with 512-bit intermediates

use crate::error::{AmmError, AmmResult};
use types::{U256, U512};

pub const BPS_DENOMINATOR: u64 = 10_000;

/// `floor(a * b / denominator)` without intermediate overflow
pub fn mul_div(a: U256, b: U256, denominator: U256, operation: &'static str) -> AmmResult<U256> {
    if denominator.is_zero() {
        return Err(AmmError::DivisionByZero { operation });
    }
    narrow(a.full_mul(b) / U512::from(denominator), operation)
}

/// `ceil(a * b / denominator)` without intermediate overflow
pub fn mul_div_up(
    a: U256,
    b: U256,
    denominator: U256,
    operation: &'static str,
) -> AmmResult<U256> {
    if denominator.is_zero() {
        return Err(AmmError::DivisionByZero { operation });
    }
    let product = a.full_mul(b);
    let denominator = U512::from(denominator);
    let mut quotient = product / denominator;
    if !(product % denominator).is_zero() {
        quotient += U512::one();
    }
    narrow(quotient, operation)
}

pub fn narrow(value: U512, operation: &'static str) -> AmmResult<U256> {
    U256::try_from(value).map_err(|_| AmmError::Overflow { operation })
}

pub fn add(a: U256, b: U256, operation: &'static str) -> AmmResult<U256> {
    a.checked_add(b).ok_or(AmmError::Overflow { operation })
}

pub fn sub(a: U256, b: U256, operation: &'static str) -> AmmResult<U256> {
    a.checked_sub(b).ok_or(AmmError::Overflow { operation })
}

pub fn mul(a: U256, b: U256, operation: &'static str) -> AmmResult<U256> {
    a.checked_mul(b).ok_or(AmmError::Overflow { operation })
}

/// `amount * (10000 - fee_bps) / 10000`
pub fn after_fee(amount: U256, fee_bps: u32) -> AmmResult<U256> {
    check_fee(fee_bps)?;
    mul_div(
        amount,
        U256::from(BPS_DENOMINATOR - fee_bps as u64),
        U256::from(BPS_DENOMINATOR),
        "fee deduction",
    )
}

pub fn check_fee(fee_bps: u32) -> AmmResult<()> {
    if fee_bps as u64 >= BPS_DENOMINATOR {
        return Err(AmmError::InvalidFee { fee_bps });
    }
    Ok(())
}

/// Shortfall of `actual` against `ideal`, in basis points
pub fn shortfall_bps(ideal: U256, actual: U256) -> u32 {
    if ideal.is_zero() || actual >= ideal {
        return 0;
    }
    let gap = ideal - actual;
    match mul_div(gap, U256::from(BPS_DENOMINATOR), ideal, "impact") {
        Ok(bps) if bps <= U256::from(BPS_DENOMINATOR) => bps.low_u32(),
        _ => BPS_DENOMINATOR as u32,
    }
}

/// Lossy conversion for search heuristics only; never used for settlement amounts
pub fn to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_survives_wide_products() {
        let big = U256::MAX / U256::from(2u64);
        let out = mul_div(big, U256::from(4u64), U256::from(8u64), "test").unwrap();
        assert_eq!(out, big / U256::from(2u64));
    }

    #[test]
    fn test_mul_div_rounding() {
        let down = mul_div(U256::from(10u64), U256::from(1u64), U256::from(3u64), "t").unwrap();
        let up = mul_div_up(U256::from(10u64), U256::from(1u64), U256::from(3u64), "t").unwrap();
        assert_eq!(down, U256::from(3u64));
        assert_eq!(up, U256::from(4u64));
        assert!(mul_div(U256::one(), U256::one(), U256::zero(), "t").is_err());
    }

    #[test]
    fn test_after_fee_and_shortfall() {
        assert_eq!(after_fee(U256::from(10_000u64), 30).unwrap(), U256::from(9_970u64));
        assert!(after_fee(U256::one(), 10_000).is_err());
        assert_eq!(shortfall_bps(U256::from(1_000u64), U256::from(990u64)), 100);
        assert_eq!(shortfall_bps(U256::from(1_000u64), U256::from(1_010u64)), 0);
    }

    #[test]
    fn test_to_f64() {
        assert_eq!(to_f64(U256::from(12345u64)), 12345.0);
        let e18 = to_f64(U256::exp10(18));
        assert!((e18 - 1e18).abs() / 1e18 < 1e-12);
    }
}
