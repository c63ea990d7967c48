//! Venue edges
//!
//! A [`VenueEdge`] is the complete state of one pool. It is replaced wholesale on every
//! update and shared behind `Arc`, so a reader holding an edge never sees a torn write.
//! A [`DirectedEdge`] pairs a shared edge with a trade direction; each venue contributes
//! one directed edge per direction to the market graph.

use crate::curve::{CurveKind, CurveState, Direction};
use ethers_core::types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Protocol deployment behind a venue, used for calldata routing and risk weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueProtocol {
    UniswapV2,
    SushiswapV2,
    QuickswapV2,
    UniswapV3,
    QuickswapV3,
    CurveStable,
    Other,
}

impl VenueProtocol {
    /// Curve family this protocol prices with
    pub fn curve_kind(&self) -> CurveKind {
        match self {
            VenueProtocol::UniswapV2
            | VenueProtocol::SushiswapV2
            | VenueProtocol::QuickswapV2
            | VenueProtocol::Other => CurveKind::ConstantProduct,
            VenueProtocol::UniswapV3 | VenueProtocol::QuickswapV3 => CurveKind::Concentrated,
            VenueProtocol::CurveStable => CurveKind::StableSwap,
        }
    }

    /// Numeric id understood by the on-chain executor contract
    pub fn executor_id(&self) -> u8 {
        match self.curve_kind() {
            CurveKind::ConstantProduct => 0,
            CurveKind::Concentrated => 1,
            CurveKind::StableSwap => 2,
        }
    }

    /// Baseline protocol risk used in opportunity risk scoring
    pub fn base_risk(&self) -> f64 {
        match self {
            VenueProtocol::UniswapV2 => 0.10,
            VenueProtocol::UniswapV3 => 0.15,
            VenueProtocol::SushiswapV2 | VenueProtocol::CurveStable => 0.20,
            VenueProtocol::QuickswapV2 | VenueProtocol::QuickswapV3 => 0.25,
            VenueProtocol::Other => 0.30,
        }
    }
}

/// Full state of one liquidity venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueEdge {
    pub venue: Address,
    pub protocol: VenueProtocol,
    pub asset0: Address,
    pub asset1: Address,
    pub state: CurveState,
    /// Fee in basis points (30 = 0.3%)
    pub fee_bps: u32,
    /// Gas consumed by one swap through this venue
    pub gas_estimate: u64,
    pub last_update_ns: u64,
    pub healthy: bool,
}

impl VenueEdge {
    pub fn curve_kind(&self) -> CurveKind {
        self.state.kind()
    }

    pub fn touches(&self, asset: Address) -> bool {
        self.asset0 == asset || self.asset1 == asset
    }

    /// Direction that trades `asset_in` away, if this venue holds it
    pub fn direction_from(&self, asset_in: Address) -> Option<Direction> {
        if asset_in == self.asset0 {
            Some(Direction::ZeroForOne)
        } else if asset_in == self.asset1 {
            Some(Direction::OneForZero)
        } else {
            None
        }
    }

    pub fn assets_for(&self, direction: Direction) -> (Address, Address) {
        match direction {
            Direction::ZeroForOne => (self.asset0, self.asset1),
            Direction::OneForZero => (self.asset1, self.asset0),
        }
    }

    /// Copy of this edge carrying new curve state
    pub fn with_state(&self, state: CurveState, updated_ns: u64) -> Self {
        Self {
            state,
            last_update_ns: updated_ns,
            ..self.clone()
        }
    }
}

/// One tradable direction through a shared venue edge
#[derive(Debug, Clone)]
pub struct DirectedEdge {
    pub edge: Arc<VenueEdge>,
    pub direction: Direction,
}

impl DirectedEdge {
    pub fn new(edge: Arc<VenueEdge>, direction: Direction) -> Self {
        Self { edge, direction }
    }

    pub fn venue(&self) -> Address {
        self.edge.venue
    }

    pub fn asset_in(&self) -> Address {
        self.edge.assets_for(self.direction).0
    }

    pub fn asset_out(&self) -> Address {
        self.edge.assets_for(self.direction).1
    }
}
