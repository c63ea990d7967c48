//! Opportunity lifecycle
//!
//! Detected → Validated → Submitted → Included | Reverted | Expired | Cancelled.
//! Pre-submission states may also end in Cancelled. Terminal states are final and an
//! opportunity is never reused once it has left Submitted.

use crate::error::TypesError;
use crate::now_ns;
use crate::path::CandidatePath;
use ethers_core::types::{H256, I256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    Detected,
    Validated,
    Submitted,
    Included,
    Reverted,
    Expired,
    Cancelled,
}

impl OpportunityStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OpportunityStatus::Included
                | OpportunityStatus::Reverted
                | OpportunityStatus::Expired
                | OpportunityStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: OpportunityStatus) -> bool {
        use OpportunityStatus::*;
        matches!(
            (self, next),
            (Detected, Validated)
                | (Detected, Cancelled)
                | (Detected, Expired)
                | (Validated, Submitted)
                | (Validated, Cancelled)
                | (Validated, Expired)
                | (Submitted, Included)
                | (Submitted, Reverted)
                | (Submitted, Expired)
                | (Submitted, Cancelled)
        )
    }
}

/// Why an opportunity reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Included,
    StalePath,
    BelowProfitFloor,
    UnsafeTrade,
    NoCapitalSource,
    InvalidPlan,
    SimulationReverted,
    SimulationBelowMinimum,
    RelayRejected,
    AllRelaysFailed,
    PublicSubmitFailed,
    OnChainRevert,
    InclusionTimeout,
    Superseded,
    LatencyBudgetExceeded,
    PolicyVeto,
    NonceUnavailable,
    CancelledOnChain,
    InvariantViolation,
}

/// Classification of a cycle by hop count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitrageKind {
    Spatial,
    Triangular,
    MultiHop,
}

impl ArbitrageKind {
    pub fn from_hop_count(hops: usize) -> Self {
        match hops {
            0..=2 => ArbitrageKind::Spatial,
            3 => ArbitrageKind::Triangular,
            _ => ArbitrageKind::MultiHop,
        }
    }
}

/// A path accepted for execution, tracked to a terminal state
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub id: Uuid,
    pub path: CandidatePath,
    pub status: OpportunityStatus,
    pub reason: Option<ReasonCode>,
    pub risk_score: f64,
    pub detected_at_ns: u64,
    pub history: Vec<(OpportunityStatus, u64)>,
    pub realized_profit: Option<I256>,
    pub tx_hash: Option<H256>,
}

impl Opportunity {
    pub fn new(path: CandidatePath, risk_score: f64) -> Self {
        let now = now_ns();
        Self {
            id: Uuid::new_v4(),
            path,
            status: OpportunityStatus::Detected,
            reason: None,
            risk_score,
            detected_at_ns: now,
            history: vec![(OpportunityStatus::Detected, now)],
            realized_profit: None,
            tx_hash: None,
        }
    }

    pub fn expected_profit(&self) -> I256 {
        self.path.net_profit
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(&mut self, next: OpportunityStatus) -> Result<(), TypesError> {
        if !self.status.can_transition_to(next) {
            return Err(TypesError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.history.push((next, now_ns()));
        Ok(())
    }

    /// Terminal transition with a reason code
    pub fn finish(
        &mut self,
        terminal: OpportunityStatus,
        reason: ReasonCode,
    ) -> Result<(), TypesError> {
        if !terminal.is_terminal() {
            return Err(TypesError::InvalidTransition {
                from: self.status,
                to: terminal,
            });
        }
        self.transition(terminal)?;
        self.reason = Some(reason);
        Ok(())
    }

    /// Replace the priced path after re-validation against fresher venue state
    pub fn revalidated(&mut self, path: CandidatePath) -> Result<(), TypesError> {
        self.transition(OpportunityStatus::Validated)?;
        self.path = path;
        Ok(())
    }

    pub fn elapsed_ms(&self) -> u64 {
        now_ns().saturating_sub(self.detected_at_ns) / 1_000_000
    }
}

/// Composite risk in `[0, 1]` from protocol mix, path length, funding and slippage
pub fn risk_score(path: &CandidatePath, requires_flash_loan: bool) -> f64 {
    let protocol_risk = if path.hops.is_empty() {
        0.30
    } else {
        path.hops.iter().map(|hop| hop.protocol.base_risk()).sum::<f64>() / path.hops.len() as f64
    };
    let path_penalty = (path.hop_count() as f64 * 0.05).min(0.30);
    let flash_loan_risk = if requires_flash_loan { 0.10 } else { 0.0 };
    let slippage_risk = (path.slippage_bps as f64 / 1_000.0).min(1.0);

    let total = protocol_risk * 0.3 + path_penalty * 0.2 + flash_loan_risk * 0.2 + slippage_risk * 0.3;
    total.min(1.0)
}
