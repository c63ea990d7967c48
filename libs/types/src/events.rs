//! Events emitted to external observers
//!
//! Each event carries enough to reconstruct the decision: the path, expected versus
//! realized profit and the latency involved. Profit figures are decimal strings so the
//! JSON form never loses precision.

use crate::error::ErrorClass;
use crate::opportunity::{ArbitrageKind, OpportunityStatus, ReasonCode};
use crate::path::CandidatePath;
use ethers_core::types::{Address, H256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serializable digest of a candidate path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSummary {
    pub start_asset: Address,
    pub venues: Vec<Address>,
    pub assets: Vec<Address>,
    pub kind: ArbitrageKind,
    pub amount_in: String,
    pub gross_output: String,
    pub gross_profit: String,
    pub net_profit: String,
    pub gas_cost: String,
    pub slippage_bps: u32,
    pub score: i64,
}

impl From<&CandidatePath> for PathSummary {
    fn from(path: &CandidatePath) -> Self {
        let mut assets: Vec<Address> = path.hops.iter().map(|hop| hop.asset_in).collect();
        assets.push(path.start_asset());
        Self {
            start_asset: path.start_asset(),
            venues: path.venues(),
            assets,
            kind: path.kind(),
            amount_in: path.amount_in.to_string(),
            gross_output: path.gross_output.to_string(),
            gross_profit: path.gross_profit.to_string(),
            net_profit: path.net_profit.to_string(),
            gas_cost: path.gas_cost.to_string(),
            slippage_bps: path.slippage_bps,
            score: path.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StrategyEvent {
    OpportunityDetected {
        path: PathSummary,
        trigger_venue: Option<Address>,
        from_cache: bool,
        detection_latency_us: u64,
    },
    OpportunityTriggered {
        opportunity_id: Uuid,
        path: PathSummary,
        risk_score: f64,
    },
    ExecutionSucceeded {
        opportunity_id: Uuid,
        path: PathSummary,
        expected_profit: String,
        realized_profit: Option<String>,
        tx_hash: Option<H256>,
        relay: Option<String>,
        latency_ms: u64,
    },
    ExecutionFailed {
        opportunity_id: Uuid,
        path: PathSummary,
        status: OpportunityStatus,
        reason: ReasonCode,
        expected_profit: String,
        detail: Option<String>,
        latency_ms: u64,
    },
    VenueDegraded {
        /// Venue address, feed name or relay name
        subject: String,
        class: ErrorClass,
        detail: String,
    },
}

impl StrategyEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyEvent::OpportunityDetected { .. } => "opportunity_detected",
            StrategyEvent::OpportunityTriggered { .. } => "opportunity_triggered",
            StrategyEvent::ExecutionSucceeded { .. } => "execution_succeeded",
            StrategyEvent::ExecutionFailed { .. } => "execution_failed",
            StrategyEvent::VenueDegraded { .. } => "venue_degraded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_event_json_shape() {
        let event = StrategyEvent::VenueDegraded {
            subject: "feed-main".to_string(),
            class: ErrorClass::Transient,
            detail: "retry budget exhausted".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "venue_degraded");
        assert_eq!(json["class"], "transient");
        assert_eq!(event.name(), "venue_degraded");
    }
}
