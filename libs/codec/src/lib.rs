//! # Ouro Feed Codec
//!
//! ## Purpose
//!
//! Wire encoding and decoding of venue state deltas. Feeds deliver either JSON text
//! frames or compact binary TLV frames; both decode into the same [`FeedDelta`], which
//! maps onto a [`types::VenueEdge`] without losing a single unit of precision.
//!
//! ## Integration Points
//!
//! - **Feed connections**: [`json::decode_message`] for text frames,
//!   [`binary::decode_delta`] for binary frames
//! - **Ingest pipeline**: [`FeedDelta::apply_to`] builds the replacement edge
//! - **Mempool deltas**: [`pending::decode_swap`] turns router calldata into a swap the
//!   pipeline projects onto reserves
//!
//! ## Architecture Role
//!
//! ```text
//! WebSocket ──► [codec] ──► FeedDelta ──► pipeline ──► MarketGraph
//!   text/binary    ↑
//!                  └── amounts stay U256 end to end
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Connection handling or reconnect logic
//! - Filtering decisions (noise floors, allow-lists)

pub mod amount;
pub mod binary;
pub mod delta;
pub mod error;
pub mod json;
pub mod pending;

pub use binary::{decode_delta, encode_delta, TlvType, FRAME_MAGIC, FRAME_VERSION};
pub use delta::{DeltaPayload, FeedDelta};
pub use error::{CodecError, CodecResult};
pub use json::{decode_message, encode_message, encode_subscribe, FeedMessage, SubscribeRequest};
pub use pending::{decode_swap, encode_swap, PendingSwap};
