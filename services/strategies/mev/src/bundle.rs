//! Bundle construction for private relay submission

use crate::error::{RelayError, RelayResult};
use ethers::types::{Bytes, H256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Signed transactions submitted atomically for one target block
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub transactions: Vec<Bytes>,
    pub target_block: u64,
    pub min_timestamp: Option<u64>,
    pub max_timestamp: Option<u64>,
    /// Hashes allowed to revert without failing the bundle
    pub reverting_hashes: Vec<H256>,
    /// Handle used for cancellation
    pub replacement_uuid: Uuid,
    pub metadata: HashMap<String, String>,
}

/// Builder for constructing relay bundles
pub struct BundleBuilder {
    bundle: Bundle,
}

impl BundleBuilder {
    pub fn new(target_block: u64) -> Self {
        Self {
            bundle: Bundle {
                transactions: Vec::new(),
                target_block,
                min_timestamp: None,
                max_timestamp: None,
                reverting_hashes: Vec::new(),
                replacement_uuid: Uuid::new_v4(),
                metadata: HashMap::new(),
            },
        }
    }

    pub fn add_transaction(mut self, raw: Bytes) -> Self {
        self.bundle.transactions.push(raw);
        self
    }

    pub fn set_timestamp_range(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.bundle.min_timestamp = min;
        self.bundle.max_timestamp = max;
        self
    }

    pub fn allow_reverting(mut self, tx_hash: H256) -> Self {
        self.bundle.reverting_hashes.push(tx_hash);
        self
    }

    pub fn replacement_uuid(mut self, uuid: Uuid) -> Self {
        self.bundle.replacement_uuid = uuid;
        self
    }

    pub fn add_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.bundle.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> RelayResult<Bundle> {
        if self.bundle.transactions.is_empty() {
            return Err(RelayError::InvalidBundle("no transactions".to_string()));
        }
        if self.bundle.target_block == 0 {
            return Err(RelayError::InvalidBundle("target block 0".to_string()));
        }
        if let (Some(min), Some(max)) = (self.bundle.min_timestamp, self.bundle.max_timestamp) {
            if min > max {
                return Err(RelayError::InvalidBundle(format!(
                    "timestamp range {min}..{max} is empty"
                )));
            }
        }
        Ok(self.bundle)
    }
}

impl Bundle {
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Hashes of the signed transactions, in order
    pub fn transaction_hashes(&self) -> Vec<H256> {
        self.transactions
            .iter()
            .map(|raw| H256::from(keccak256(raw)))
            .collect()
    }

    /// `eth_sendBundle` parameter object
    pub fn to_send_params(&self) -> SendBundleParams {
        SendBundleParams {
            txs: self.transactions.clone(),
            block_number: format!("0x{:x}", self.target_block),
            min_timestamp: self.min_timestamp,
            max_timestamp: self.max_timestamp,
            reverting_tx_hashes: self.reverting_hashes.clone(),
            replacement_uuid: Some(self.replacement_uuid.to_string()),
        }
    }

    /// `eth_callBundle` parameter object, simulated on top of `state_block`
    pub fn to_call_params(&self, state_block: u64) -> CallBundleParams {
        CallBundleParams {
            txs: self.transactions.clone(),
            block_number: format!("0x{:x}", self.target_block),
            state_block_number: format!("0x{:x}", state_block),
            timestamp: self.min_timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBundleParams {
    pub txs: Vec<Bytes>,
    pub block_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reverting_tx_hashes: Vec<H256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement_uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallBundleParams {
    pub txs: Vec<Bytes>,
    pub block_number: String,
    pub state_block_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_empty_bundle() {
        assert!(matches!(
            BundleBuilder::new(100).build(),
            Err(RelayError::InvalidBundle(_))
        ));
        assert!(BundleBuilder::new(100)
            .add_transaction(Bytes::from(vec![0x02, 0x01]))
            .set_timestamp_range(Some(10), Some(5))
            .build()
            .is_err());
    }

    #[test]
    fn test_send_params_shape() {
        let uuid = Uuid::nil();
        let bundle = BundleBuilder::new(255)
            .add_transaction(Bytes::from(vec![0xde, 0xad]))
            .replacement_uuid(uuid)
            .build()
            .unwrap();
        let json = serde_json::to_value(bundle.to_send_params()).unwrap();
        assert_eq!(json["blockNumber"], "0xff");
        assert_eq!(json["txs"][0], "0xdead");
        assert_eq!(json["replacementUuid"], uuid.to_string());
        assert!(json.get("revertingTxHashes").is_none());
        assert_eq!(bundle.transaction_hashes().len(), 1);
    }
}
