//! Strategy runtime errors
//!
//! Lower-layer errors are wrapped, never flattened to strings, so their class survives
//! to the point where a decision is made about retrying, rejecting or recording.

use amm::AmmError;
use codec::CodecError;
use mev::RelayError;
use network::NetworkError;
use state_market::StateError;
use thiserror::Error;
use types::{Address, Classify, ErrorClass, TypesError};

pub type StrategyResult<T> = std::result::Result<T, StrategyError>;

#[derive(Debug, Error, Clone)]
pub enum StrategyError {
    #[error("Pricing failed at venue {venue:?}: {source}")]
    Pricing {
        venue: Address,
        #[source]
        source: AmmError,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Types(#[from] TypesError),

    #[error("Invalid arbitrage parameters: {reason}")]
    InvalidParams { reason: String },

    #[error("No capital source can fund {amount} of {asset:?}")]
    NoCapitalSource { asset: Address, amount: String },

    #[error("Gas cost cannot be expressed in {asset:?}")]
    GasConversion { asset: Address },

    #[error("Transaction signing failed: {0}")]
    Signing(String),

    #[error("Nonce unavailable: {0}")]
    Nonce(String),

    #[error("Feed {feed}: {reason}")]
    Feed { feed: String, reason: String },

    #[error("Output {path}: {reason}")]
    Output { path: String, reason: String },

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl StrategyError {
    pub fn pricing(venue: Address, source: AmmError) -> Self {
        Self::Pricing { venue, source }
    }

    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            reason: reason.into(),
        }
    }
}

impl Classify for StrategyError {
    fn class(&self) -> ErrorClass {
        match self {
            StrategyError::Pricing { source, .. } => source.class(),
            StrategyError::State(e) => e.class(),
            StrategyError::Network(e) => e.class(),
            StrategyError::Relay(e) => e.class(),
            StrategyError::Codec(e) => e.class(),
            StrategyError::Types(e) => e.class(),
            StrategyError::InvalidParams { .. } | StrategyError::GasConversion { .. } => {
                ErrorClass::Validation
            }
            StrategyError::NoCapitalSource { .. } => ErrorClass::Execution,
            StrategyError::Nonce(_) | StrategyError::Feed { .. } | StrategyError::Output { .. } => {
                ErrorClass::Transient
            }
            StrategyError::Signing(_) | StrategyError::ChannelClosed(_) => ErrorClass::Invariant,
        }
    }
}
