//! Private relay seam
//!
//! Anything that accepts bundles privately (Flashbots-compatible builders, in-house
//! simulators) implements [`PrivateRelay`]. The registry only talks to this trait.

use crate::bundle::Bundle;
use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use ethers::types::{Bytes, H256, U256};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Acknowledgement of an accepted bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleReceipt {
    pub relay: String,
    pub bundle_hash: H256,
    pub target_block: u64,
    pub replacement_uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationOutcome {
    /// False when any transaction reverted
    pub success: bool,
    pub gas_used: u64,
    /// Payment to the block builder
    pub coinbase_diff: U256,
    pub revert_reason: Option<String>,
    /// Return data of the last transaction in the bundle
    pub return_data: Option<Bytes>,
}

impl SimulationOutcome {
    /// Leading `uint256` of the return data
    pub fn returned_amount(&self) -> Option<U256> {
        let data = self.return_data.as_ref()?;
        (data.len() >= 32).then(|| U256::from_big_endian(&data[..32]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusionStatus {
    Pending,
    Included { block: u64 },
    /// The target block passed without inclusion
    NotIncluded,
    Unknown,
}

#[async_trait]
pub trait PrivateRelay: Send + Sync {
    fn name(&self) -> &str;

    async fn submit_bundle(&self, bundle: &Bundle) -> RelayResult<BundleReceipt>;

    /// Execute the bundle against `state_block` without submitting it
    async fn simulate_bundle(&self, bundle: &Bundle, state_block: u64)
        -> RelayResult<SimulationOutcome>;

    /// Best effort; a bundle already handed to a builder may still land
    async fn cancel_bundle(&self, receipt: &BundleReceipt) -> RelayResult<()>;

    async fn inclusion_status(
        &self,
        receipt: &BundleReceipt,
        current_block: u64,
    ) -> RelayResult<InclusionStatus>;
}

/// Scripted relay for dry runs and tests
#[derive(Debug)]
pub struct ScriptedRelay {
    name: String,
    state: Mutex<ScriptedState>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    submit_error: Option<RelayError>,
    simulation: Option<SimulationOutcome>,
    include_at: Option<u64>,
    submitted: Vec<Bundle>,
    simulated: usize,
    cancelled: Vec<Uuid>,
    statuses: HashMap<H256, InclusionStatus>,
}

impl ScriptedRelay {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(ScriptedState::default()),
        }
    }

    /// Every submission fails with `error`
    pub fn fail_submissions(&self, error: Option<RelayError>) {
        self.state.lock().submit_error = error;
    }

    pub fn set_simulation(&self, outcome: SimulationOutcome) {
        self.state.lock().simulation = Some(outcome);
    }

    /// Report inclusion at `block` once the chain reaches it
    pub fn include_at(&self, block: Option<u64>) {
        self.state.lock().include_at = block;
    }

    pub fn submitted(&self) -> Vec<Bundle> {
        self.state.lock().submitted.clone()
    }

    pub fn simulated(&self) -> usize {
        self.state.lock().simulated
    }

    pub fn cancelled(&self) -> Vec<Uuid> {
        self.state.lock().cancelled.clone()
    }
}

#[async_trait]
impl PrivateRelay for ScriptedRelay {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_bundle(&self, bundle: &Bundle) -> RelayResult<BundleReceipt> {
        let mut state = self.state.lock();
        if let Some(error) = state.submit_error.clone() {
            return Err(error);
        }
        state.submitted.push(bundle.clone());
        let bundle_hash = bundle
            .transaction_hashes()
            .first()
            .copied()
            .unwrap_or_default();
        state.statuses.insert(bundle_hash, InclusionStatus::Pending);
        Ok(BundleReceipt {
            relay: self.name.clone(),
            bundle_hash,
            target_block: bundle.target_block,
            replacement_uuid: bundle.replacement_uuid,
        })
    }

    async fn simulate_bundle(
        &self,
        _bundle: &Bundle,
        _state_block: u64,
    ) -> RelayResult<SimulationOutcome> {
        let mut state = self.state.lock();
        state.simulated += 1;
        Ok(state.simulation.clone().unwrap_or(SimulationOutcome {
            success: true,
            gas_used: 0,
            coinbase_diff: U256::zero(),
            revert_reason: None,
            return_data: None,
        }))
    }

    async fn cancel_bundle(&self, receipt: &BundleReceipt) -> RelayResult<()> {
        self.state.lock().cancelled.push(receipt.replacement_uuid);
        Ok(())
    }

    async fn inclusion_status(
        &self,
        receipt: &BundleReceipt,
        current_block: u64,
    ) -> RelayResult<InclusionStatus> {
        let state = self.state.lock();
        if !state.statuses.contains_key(&receipt.bundle_hash) {
            return Ok(InclusionStatus::Unknown);
        }
        Ok(match state.include_at {
            Some(block) if current_block >= block => InclusionStatus::Included { block },
            _ if current_block > receipt.target_block => InclusionStatus::NotIncluded,
            _ => InclusionStatus::Pending,
        })
    }
}
