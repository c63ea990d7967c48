//! Market state errors

use thiserror::Error;
use types::{Address, Classify, ErrorClass};

pub type StateResult<T> = std::result::Result<T, StateError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// An edge referenced an asset the graph has never registered
    #[error("Unknown asset {asset:?} referenced by venue {venue:?}")]
    UnknownAsset { asset: Address, venue: Address },

    #[error("Unknown venue {venue:?}")]
    UnknownVenue { venue: Address },

    #[error("Invalid edge for venue {venue:?}: {reason}")]
    InvalidEdge { venue: Address, reason: String },

    #[error("Invalid asset {asset:?}: {reason}")]
    InvalidAsset { asset: Address, reason: String },

    #[error("Sequence gap on {feed}: expected {expected}, actual {actual}")]
    SequenceGap {
        feed: String,
        expected: u64,
        actual: u64,
    },
}

impl Classify for StateError {
    fn class(&self) -> ErrorClass {
        match self {
            StateError::UnknownAsset { .. } => ErrorClass::Invariant,
            StateError::SequenceGap { .. } => ErrorClass::Transient,
            StateError::UnknownVenue { .. }
            | StateError::InvalidEdge { .. }
            | StateError::InvalidAsset { .. } => ErrorClass::Validation,
        }
    }
}
