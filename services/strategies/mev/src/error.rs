//! Relay errors

use thiserror::Error;
use types::{Classify, ErrorClass};

pub type RelayResult<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Relay {relay} timed out after {timeout_ms}ms")]
    Timeout { relay: String, timeout_ms: u64 },

    #[error("Transport error talking to {relay}: {message}")]
    Transport { relay: String, message: String },

    /// The relay answered with a JSON-RPC error
    #[error("Relay {relay} rejected {method}: {message}")]
    Rejected {
        relay: String,
        method: String,
        message: String,
    },

    #[error("Invalid response from {relay}: {reason}")]
    InvalidResponse { relay: String, reason: String },

    #[error("Relay {relay} unavailable (circuit open)")]
    Unavailable { relay: String },

    #[error("Every relay failed ({attempts} attempts)")]
    AllRelaysFailed { attempts: usize },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),
}

impl RelayError {
    pub fn transport(relay: &str, message: impl ToString) -> Self {
        Self::Transport {
            relay: relay.to_string(),
            message: message.to_string(),
        }
    }
}

impl Classify for RelayError {
    fn class(&self) -> ErrorClass {
        match self {
            RelayError::Timeout { .. }
            | RelayError::Transport { .. }
            | RelayError::InvalidResponse { .. }
            | RelayError::Unavailable { .. } => ErrorClass::Transient,
            RelayError::Rejected { .. } | RelayError::AllRelaysFailed { .. } => {
                ErrorClass::Execution
            }
            RelayError::Signing(_) | RelayError::InvalidBundle(_) => ErrorClass::Invariant,
        }
    }
}
