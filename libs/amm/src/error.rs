//! Curve pricing errors

use thiserror::Error;
use types::{Classify, CurveKind, ErrorClass};

pub type AmmResult<T> = std::result::Result<T, AmmError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmmError {
    #[error("Input amount must be positive")]
    ZeroInput,

    #[error("{curve:?} venue has no usable liquidity")]
    EmptyReserves { curve: CurveKind },

    #[error("Fee {fee_bps} bps is not below 10000")]
    InvalidFee { fee_bps: u32 },

    #[error("Arithmetic overflow in {operation}")]
    Overflow { operation: &'static str },

    #[error("Division by zero in {operation}")]
    DivisionByZero { operation: &'static str },

    #[error("Stable-swap {stage} did not converge within {iterations} iterations")]
    NoConvergence {
        stage: &'static str,
        iterations: usize,
    },

    #[error("Trade exhausts the active tick range")]
    ExceedsTickLiquidity,

    #[error("Requested output {requested} exceeds available {available}")]
    InsufficientLiquidity { requested: String, available: String },
}

impl Classify for AmmError {
    fn class(&self) -> ErrorClass {
        match self {
            AmmError::Overflow { .. } | AmmError::DivisionByZero { .. } => ErrorClass::Invariant,
            _ => ErrorClass::Validation,
        }
    }
}
