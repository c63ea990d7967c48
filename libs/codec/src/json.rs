//! JSON feed messages
//!
//! Text frames on a feed WebSocket carry one envelope each, discriminated by `type`:
//!
//! ```json
//! {"type":"delta","venue":"0x…","sequence":12,"kind":"reserves","reserve0":"1000","reserve1":"2000"}
//! {"type":"heartbeat","sequence":13}
//! {"type":"subscribed","topics":["reserves","pending"]}
//! {"type":"error","message":"rate limited"}
//! ```

use crate::delta::FeedDelta;
use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use types::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Delta(FeedDelta),
    Heartbeat {
        #[serde(default)]
        sequence: Option<u64>,
    },
    Subscribed {
        #[serde(default)]
        topics: Vec<String>,
    },
    Error {
        message: String,
    },
}

impl FeedMessage {
    /// Sequence number carried by the message, if any
    pub fn sequence(&self) -> Option<u64> {
        match self {
            FeedMessage::Delta(delta) => Some(delta.sequence),
            FeedMessage::Heartbeat { sequence } => *sequence,
            _ => None,
        }
    }
}

/// Outgoing subscription request sent after every (re)connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub action: String,
    pub topics: Vec<String>,
    /// Empty means every venue the feed knows about
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub venues: Vec<Address>,
}

impl SubscribeRequest {
    pub fn new(topics: Vec<String>, venues: Vec<Address>) -> Self {
        Self {
            action: "subscribe".to_string(),
            topics,
            venues,
        }
    }
}

pub fn decode_message(text: &str) -> CodecResult<FeedMessage> {
    serde_json::from_str(text).map_err(|e| CodecError::InvalidJson {
        reason: e.to_string(),
    })
}

pub fn encode_message(message: &FeedMessage) -> CodecResult<String> {
    serde_json::to_string(message).map_err(|e| CodecError::InvalidJson {
        reason: e.to_string(),
    })
}

pub fn encode_subscribe(request: &SubscribeRequest) -> CodecResult<String> {
    serde_json::to_string(request).map_err(|e| CodecError::InvalidJson {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaPayload;
    use types::U256;

    #[test]
    fn test_decode_reserves_delta() {
        let text = r#"{
            "type": "delta",
            "venue": "0x5555555555555555555555555555555555555555",
            "sequence": 12,
            "block_number": 500,
            "kind": "reserves",
            "reserve0": "340282366920938463463374607431768211456",
            "reserve1": "0x10"
        }"#;

        let message = decode_message(text).unwrap();
        assert_eq!(message.sequence(), Some(12));
        let FeedMessage::Delta(delta) = message else {
            panic!("expected delta");
        };
        assert_eq!(delta.venue, Address::repeat_byte(0x55));
        assert_eq!(delta.block_number, 500);
        assert_eq!(
            delta.payload,
            DeltaPayload::Reserves {
                reserve0: U256::from(u128::MAX) + U256::one(),
                reserve1: U256::from(16u64),
            }
        );
    }

    #[test]
    fn test_delta_survives_text_round_trip() {
        let message = FeedMessage::Delta(FeedDelta {
            venue: Address::repeat_byte(0x11),
            sequence: 3,
            block_number: 0,
            observed_at_ns: 0,
            payload: DeltaPayload::Concentrated {
                sqrt_price_x96: U256::MAX,
                liquidity: u128::MAX,
                tick: -5,
                sqrt_price_lower_x96: U256::one(),
                sqrt_price_upper_x96: U256::MAX,
            },
        });
        let text = encode_message(&message).unwrap();
        assert_eq!(decode_message(&text).unwrap(), message);
    }

    #[test]
    fn test_control_messages() {
        assert_eq!(
            decode_message(r#"{"type":"heartbeat"}"#).unwrap(),
            FeedMessage::Heartbeat { sequence: None }
        );
        assert!(matches!(
            decode_message(r#"{"type":"subscribed","topics":["reserves"]}"#).unwrap(),
            FeedMessage::Subscribed { .. }
        ));
        assert!(matches!(
            decode_message("not json"),
            Err(CodecError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_subscribe_request_shape() {
        let text = encode_subscribe(&SubscribeRequest::new(
            vec!["reserves".to_string()],
            Vec::new(),
        ))
        .unwrap();
        assert_eq!(text, r#"{"action":"subscribe","topics":["reserves"]}"#);
    }
}
