//! Binary TLV framing for feed deltas
//!
//! ```text
//! ┌──────────┬─────────┬───────────┬─────────────┬──────────┬──────────────────────┐
//! │ magic u32│ version │ tlv_count │ payload_len │ crc32    │ TLVs                 │
//! │ LE       │ u8      │ u8        │ u16 LE      │ u32 LE   │ [type u8][len u16][…]│
//! └──────────┴─────────┴───────────┴─────────────┴──────────┴──────────────────────┘
//! ```
//!
//! Amounts are 32-byte big-endian words, the same layout the EVM uses, so no width is
//! ever truncated. The checksum covers the TLV payload only.

use crate::delta::{DeltaPayload, FeedDelta};
use crate::error::{CodecError, CodecResult};
use num_enum::TryFromPrimitive;
use types::{Address, Bytes, H256, U256};

pub const FRAME_MAGIC: u32 = 0x4F55_524F;
pub const FRAME_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 12;
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum TlvType {
    Venue = 1,
    Sequence = 2,
    BlockNumber = 3,
    ObservedAt = 4,
    Reserves = 10,
    StableBalances = 11,
    Concentrated = 12,
    PendingSwap = 13,
}

impl TlvType {
    /// Fixed payload size, `None` for variable-length types
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            TlvType::Venue => Some(20),
            TlvType::Sequence | TlvType::BlockNumber | TlvType::ObservedAt => Some(8),
            TlvType::Reserves => Some(64),
            TlvType::StableBalances => Some(160),
            TlvType::Concentrated => Some(116),
            TlvType::PendingSwap => None,
        }
    }
}

struct TlvWriter {
    payload: Vec<u8>,
    count: u8,
}

impl TlvWriter {
    fn new() -> Self {
        Self {
            payload: Vec::with_capacity(256),
            count: 0,
        }
    }

    fn push(&mut self, tlv_type: TlvType, value: &[u8]) -> CodecResult<()> {
        if value.len() > u16::MAX as usize {
            return Err(CodecError::PayloadTooLarge {
                size: value.len(),
                limit: u16::MAX as usize,
            });
        }
        self.payload.push(tlv_type as u8);
        self.payload
            .extend_from_slice(&(value.len() as u16).to_le_bytes());
        self.payload.extend_from_slice(value);
        self.count += 1;
        Ok(())
    }

    fn finish(self) -> CodecResult<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(CodecError::PayloadTooLarge {
                size: self.payload.len(),
                limit: MAX_PAYLOAD,
            });
        }
        let mut frame = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        frame.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
        frame.push(FRAME_VERSION);
        frame.push(self.count);
        frame.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&self.payload).to_le_bytes());
        frame.extend_from_slice(&self.payload);
        Ok(frame)
    }
}

fn word(value: &U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

/// Encode a delta into one checksummed frame
pub fn encode_delta(delta: &FeedDelta) -> CodecResult<Vec<u8>> {
    let mut writer = TlvWriter::new();
    writer.push(TlvType::Venue, delta.venue.as_bytes())?;
    writer.push(TlvType::Sequence, &delta.sequence.to_le_bytes())?;
    writer.push(TlvType::BlockNumber, &delta.block_number.to_le_bytes())?;
    writer.push(TlvType::ObservedAt, &delta.observed_at_ns.to_le_bytes())?;

    match &delta.payload {
        DeltaPayload::Reserves { reserve0, reserve1 } => {
            let mut value = Vec::with_capacity(64);
            value.extend_from_slice(&word(reserve0));
            value.extend_from_slice(&word(reserve1));
            writer.push(TlvType::Reserves, &value)?;
        }
        DeltaPayload::StableBalances {
            balance0,
            balance1,
            amplification,
            precision0,
            precision1,
        } => {
            let mut value = Vec::with_capacity(160);
            for amount in [balance0, balance1, amplification, precision0, precision1] {
                value.extend_from_slice(&word(amount));
            }
            writer.push(TlvType::StableBalances, &value)?;
        }
        DeltaPayload::Concentrated {
            sqrt_price_x96,
            liquidity,
            tick,
            sqrt_price_lower_x96,
            sqrt_price_upper_x96,
        } => {
            let mut value = Vec::with_capacity(116);
            value.extend_from_slice(&word(sqrt_price_x96));
            value.extend_from_slice(&liquidity.to_le_bytes());
            value.extend_from_slice(&tick.to_le_bytes());
            value.extend_from_slice(&word(sqrt_price_lower_x96));
            value.extend_from_slice(&word(sqrt_price_upper_x96));
            writer.push(TlvType::Concentrated, &value)?;
        }
        DeltaPayload::PendingSwap { tx_hash, calldata } => {
            let mut value = Vec::with_capacity(32 + calldata.len());
            value.extend_from_slice(tx_hash.as_bytes());
            value.extend_from_slice(calldata);
            writer.push(TlvType::PendingSwap, &value)?;
        }
    }

    writer.finish()
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, context: &'static str) -> CodecResult<&'a [u8]> {
        let end = self.offset + n;
        if end > self.bytes.len() {
            return Err(CodecError::FrameTooSmall {
                need: end,
                got: self.bytes.len(),
                context,
            });
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

fn read_word(bytes: &[u8], index: usize) -> U256 {
    U256::from_big_endian(&bytes[index * 32..(index + 1) * 32])
}

/// Decode one frame produced by [`encode_delta`]
pub fn decode_delta(frame: &[u8]) -> CodecResult<FeedDelta> {
    if frame.len() < HEADER_SIZE {
        return Err(CodecError::FrameTooSmall {
            need: HEADER_SIZE,
            got: frame.len(),
            context: "frame header",
        });
    }
    let magic = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    if magic != FRAME_MAGIC {
        return Err(CodecError::InvalidMagic {
            expected: FRAME_MAGIC,
            actual: magic,
        });
    }
    if frame[4] != FRAME_VERSION {
        return Err(CodecError::UnsupportedVersion { version: frame[4] });
    }
    let tlv_count = frame[5];
    let payload_len = u16::from_le_bytes([frame[6], frame[7]]) as usize;
    let expected = u32::from_le_bytes([frame[8], frame[9], frame[10], frame[11]]);
    if frame.len() < HEADER_SIZE + payload_len {
        return Err(CodecError::FrameTooSmall {
            need: HEADER_SIZE + payload_len,
            got: frame.len(),
            context: "frame payload",
        });
    }
    let payload = &frame[HEADER_SIZE..HEADER_SIZE + payload_len];
    let calculated = crc32fast::hash(payload);
    if calculated != expected {
        return Err(CodecError::ChecksumMismatch {
            expected,
            calculated,
        });
    }

    let mut cursor = Cursor {
        bytes: payload,
        offset: 0,
    };
    let mut venue = None;
    let mut sequence = None;
    let mut block_number = 0;
    let mut observed_at_ns = 0;
    let mut body = None;

    for _ in 0..tlv_count {
        let offset = cursor.offset;
        let raw_type = cursor.take(1, "tlv type")?[0];
        let tlv_type = TlvType::try_from(raw_type).map_err(|_| CodecError::UnknownTlvType {
            tlv_type: raw_type,
            offset,
        })?;
        let len_bytes = cursor.take(2, "tlv length")?;
        let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
        if let Some(size) = tlv_type.fixed_size() {
            if size != len {
                return Err(CodecError::BadTlvLength {
                    tlv_type: raw_type,
                    expected: size,
                    actual: len,
                });
            }
        }
        let value = cursor.take(len, "tlv value")?;

        match tlv_type {
            TlvType::Venue => venue = Some(Address::from_slice(value)),
            TlvType::Sequence => sequence = Some(read_u64(value)),
            TlvType::BlockNumber => block_number = read_u64(value),
            TlvType::ObservedAt => observed_at_ns = read_u64(value),
            TlvType::Reserves => {
                body = Some(DeltaPayload::Reserves {
                    reserve0: read_word(value, 0),
                    reserve1: read_word(value, 1),
                })
            }
            TlvType::StableBalances => {
                body = Some(DeltaPayload::StableBalances {
                    balance0: read_word(value, 0),
                    balance1: read_word(value, 1),
                    amplification: read_word(value, 2),
                    precision0: read_word(value, 3),
                    precision1: read_word(value, 4),
                })
            }
            TlvType::Concentrated => {
                let mut liquidity = [0u8; 16];
                liquidity.copy_from_slice(&value[32..48]);
                let mut tick = [0u8; 4];
                tick.copy_from_slice(&value[48..52]);
                body = Some(DeltaPayload::Concentrated {
                    sqrt_price_x96: U256::from_big_endian(&value[0..32]),
                    liquidity: u128::from_le_bytes(liquidity),
                    tick: i32::from_le_bytes(tick),
                    sqrt_price_lower_x96: U256::from_big_endian(&value[52..84]),
                    sqrt_price_upper_x96: U256::from_big_endian(&value[84..116]),
                })
            }
            TlvType::PendingSwap => {
                if value.len() < 32 {
                    return Err(CodecError::BadTlvLength {
                        tlv_type: raw_type,
                        expected: 32,
                        actual: value.len(),
                    });
                }
                body = Some(DeltaPayload::PendingSwap {
                    tx_hash: H256::from_slice(&value[..32]),
                    calldata: Bytes::from(value[32..].to_vec()),
                })
            }
        }
    }

    Ok(FeedDelta {
        venue: venue.ok_or(CodecError::MissingField { field: "venue" })?,
        sequence: sequence.ok_or(CodecError::MissingField { field: "sequence" })?,
        block_number,
        observed_at_ns,
        payload: body.ok_or(CodecError::MissingField { field: "payload" })?,
    })
}
