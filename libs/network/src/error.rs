//! Network Error Types
//!
//! Failures of rate-limited chain access. Everything the network can recover from on
//! its own is [`ErrorClass::Transient`]; only misconfiguration is terminal.

use thiserror::Error;
use types::{Classify, ErrorClass};

pub type NetworkResult<T> = std::result::Result<T, NetworkError>;

#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    /// Queue for the endpoint is full; caller should shed load
    #[error("Backpressure on {endpoint}: {queued} requests queued (limit {limit})")]
    Backpressure {
        endpoint: String,
        queued: usize,
        limit: usize,
    },

    /// Permit not granted before the deadline
    #[error("Rate limited on {endpoint}: still queued at position {queued} after {waited_ms}ms")]
    RateLimited {
        endpoint: String,
        queued: usize,
        waited_ms: u64,
    },

    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("RPC error from {endpoint}: {message}")]
    Rpc { endpoint: String, message: String },

    #[error("Invalid response to {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("Circuit open for {subject}")]
    CircuitOpen { subject: String },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

impl NetworkError {
    pub fn rpc(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::Rpc {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Transaction rejected because the account nonce already advanced
    pub fn is_nonce_too_low(&self) -> bool {
        match self {
            NetworkError::Rpc { message, .. } => {
                let lower = message.to_lowercase();
                lower.contains("nonce too low") || lower.contains("already known")
            }
            _ => false,
        }
    }
}

impl Classify for NetworkError {
    fn class(&self) -> ErrorClass {
        match self {
            NetworkError::Configuration { .. } => ErrorClass::Invariant,
            _ => ErrorClass::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let backpressure = NetworkError::Backpressure {
            endpoint: "primary".to_string(),
            queued: 64,
            limit: 64,
        };
        assert!(backpressure.is_retryable());
        assert!(!NetworkError::configuration("bad url", Some("rpc_url")).is_retryable());
    }

    #[test]
    fn test_nonce_too_low_detection() {
        assert!(NetworkError::rpc("primary", "err: Nonce too low: next nonce 5").is_nonce_too_low());
        assert!(!NetworkError::rpc("primary", "insufficient funds").is_nonce_too_low());
    }
}
