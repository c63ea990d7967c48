//! Error classification shared by all crates
//!
//! Every crate-level error maps onto one [`ErrorClass`]. Only `Transient` failures may be
//! retried; the other classes are terminal for the operation that produced them.

use crate::opportunity::OpportunityStatus;
use ethers_core::types::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Feed disconnects, RPC timeouts, rate-limit rejections
    Transient,
    /// Stale or unsafe pricing, profit below floor
    Validation,
    /// Simulated or on-chain revert, relay rejection
    Execution,
    /// A broken internal invariant; indicates a bug
    Invariant,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// Implemented by every error enum in the workspace
pub trait Classify {
    fn class(&self) -> ErrorClass;

    fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("Path has no hops")]
    EmptyPath,

    #[error("Path does not close: starts at {start:?}, ends at {end:?}")]
    OpenPath { start: Address, end: Address },

    #[error("Path continuity broken at hop {hop}")]
    BrokenContinuity { hop: usize },

    #[error("Amount does not fit signed 256-bit arithmetic")]
    AmountOverflow,

    #[error("Invalid lifecycle transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: OpportunityStatus,
        to: OpportunityStatus,
    },
}

impl Classify for TypesError {
    fn class(&self) -> ErrorClass {
        match self {
            TypesError::AmountOverflow => ErrorClass::Validation,
            _ => ErrorClass::Invariant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_retries() {
        assert!(ErrorClass::Transient.is_retryable());
        assert!(!ErrorClass::Validation.is_retryable());
        assert!(!ErrorClass::Execution.is_retryable());
        assert!(!ErrorClass::Invariant.is_retryable());
        assert!(!TypesError::EmptyPath.is_retryable());
    }
}
