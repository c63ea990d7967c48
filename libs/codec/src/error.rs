//! Feed codec errors
//!
//! Every variant carries enough context to locate the bad bytes or field. Decode
//! failures are transient from the pipeline's point of view: they count towards a
//! feed's decode-error budget rather than failing anything downstream.

use thiserror::Error;
use types::{Address, Classify, CurveKind, ErrorClass};

pub type CodecResult<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("Frame too small: need {need} bytes, got {got} (context: {context})")]
    FrameTooSmall {
        need: usize,
        got: usize,
        context: &'static str,
    },

    #[error("Invalid magic number: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },

    #[error("Unsupported frame version {version}")]
    UnsupportedVersion { version: u8 },

    #[error("Checksum mismatch: expected {expected:#010x}, calculated {calculated:#010x}")]
    ChecksumMismatch { expected: u32, calculated: u32 },

    #[error("Unknown TLV type {tlv_type} at offset {offset}")]
    UnknownTlvType { tlv_type: u8, offset: usize },

    #[error("TLV type {tlv_type} has length {actual}, expected {expected}")]
    BadTlvLength {
        tlv_type: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Payload too large: {size} bytes exceeds {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Invalid JSON message: {reason}")]
    InvalidJson { reason: String },

    #[error("Invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: String },

    #[error("Delta for venue {delta:?} applied to venue {edge:?}")]
    VenueMismatch { delta: Address, edge: Address },

    #[error("Delta carries {delta:?} state but venue prices as {edge:?}")]
    CurveMismatch { delta: CurveKind, edge: CurveKind },

    #[error("Pending transaction is not a recognised swap: {reason}")]
    UnrecognisedCalldata { reason: String },
}

impl Classify for CodecError {
    fn class(&self) -> ErrorClass {
        match self {
            CodecError::VenueMismatch { .. } | CodecError::CurveMismatch { .. } => {
                ErrorClass::Validation
            }
            _ => ErrorClass::Transient,
        }
    }
}
