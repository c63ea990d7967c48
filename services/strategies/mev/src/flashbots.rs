//! Flashbots-compatible relay client
//!
//! JSON-RPC over HTTPS. Every request body is signed by the searcher identity key and
//! the signature travels in the `X-Flashbots-Signature` header as `address:signature`,
//! where the signed message is the hex keccak256 of the body.

use crate::bundle::Bundle;
use crate::error::{RelayError, RelayResult};
use crate::relay::{BundleReceipt, InclusionStatus, PrivateRelay, SimulationOutcome};
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Bytes, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const SIGNATURE_HEADER: &str = "X-Flashbots-Signature";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendBundleResult {
    bundle_hash: H256,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallBundleResult {
    #[serde(default)]
    coinbase_diff: Option<String>,
    #[serde(default)]
    total_gas_used: u64,
    #[serde(default)]
    results: Vec<CallBundleTx>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallBundleTx {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    revert: Option<String>,
    #[serde(default)]
    value: Option<Bytes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleStats {
    #[serde(default)]
    is_simulated: bool,
    #[serde(default)]
    sealed_by_builders_at: Vec<Value>,
}

pub struct FlashbotsRelay {
    name: String,
    url: Url,
    client: reqwest::Client,
    signer: LocalWallet,
    timeout_ms: u64,
    request_id: AtomicU64,
}

impl std::fmt::Debug for FlashbotsRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashbotsRelay")
            .field("name", &self.name)
            .field("url", &self.url.as_str())
            .field("signer", &self.signer.address())
            .finish()
    }
}

impl FlashbotsRelay {
    pub fn new(
        name: impl Into<String>,
        url: &str,
        signer: LocalWallet,
        timeout: Duration,
    ) -> RelayResult<Self> {
        let name = name.into();
        let url = Url::parse(url).map_err(|e| RelayError::transport(&name, e))?;
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| RelayError::transport(&name, e))?;
        Ok(Self {
            name,
            url,
            client,
            signer,
            timeout_ms: timeout.as_millis() as u64,
            request_id: AtomicU64::new(1),
        })
    }

    async fn signature_header(&self, body: &[u8]) -> RelayResult<String> {
        let digest = format!("0x{}", hex::encode(keccak256(body)));
        let signature = self
            .signer
            .sign_message(digest)
            .await
            .map_err(|e| RelayError::Signing(e.to_string()))?;
        Ok(format!("{:?}:0x{}", self.signer.address(), signature))
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> RelayResult<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let body = serde_json::to_vec(&request).map_err(|e| RelayError::InvalidResponse {
            relay: self.name.clone(),
            reason: e.to_string(),
        })?;
        let signature = self.signature_header(&body).await?;

        debug!(relay = %self.name, method, "relay request");
        let response = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout {
                        relay: self.name.clone(),
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    RelayError::transport(&self.name, e)
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RelayError::transport(&self.name, e))?;
        if !status.is_success() {
            return Err(RelayError::transport(
                &self.name,
                format!("HTTP {status}: {text}"),
            ));
        }

        parse_response(&self.name, method, &text)
    }
}

fn parse_response<T: serde::de::DeserializeOwned>(
    relay: &str,
    method: &str,
    text: &str,
) -> RelayResult<T> {
    let envelope: RpcResponse =
        serde_json::from_str(text).map_err(|e| RelayError::InvalidResponse {
            relay: relay.to_string(),
            reason: e.to_string(),
        })?;
    if let Some(error) = envelope.error {
        return Err(RelayError::Rejected {
            relay: relay.to_string(),
            method: method.to_string(),
            message: format!("{} (code {})", error.message, error.code),
        });
    }
    let result = envelope.result.unwrap_or(Value::Null);
    serde_json::from_value(result).map_err(|e| RelayError::InvalidResponse {
        relay: relay.to_string(),
        reason: format!("{method}: {e}"),
    })
}

fn simulation_outcome(result: CallBundleResult) -> SimulationOutcome {
    let revert_reason = result
        .results
        .iter()
        .find_map(|tx| tx.revert.clone().or_else(|| tx.error.clone()));
    let coinbase_diff = result
        .coinbase_diff
        .as_deref()
        .and_then(|value| U256::from_dec_str(value).ok())
        .unwrap_or_default();
    SimulationOutcome {
        success: revert_reason.is_none(),
        gas_used: result.total_gas_used,
        coinbase_diff,
        revert_reason,
        return_data: result.results.last().and_then(|tx| tx.value.clone()),
    }
}

#[async_trait]
impl PrivateRelay for FlashbotsRelay {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_bundle(&self, bundle: &Bundle) -> RelayResult<BundleReceipt> {
        let result: SendBundleResult = self
            .call("eth_sendBundle", json!([bundle.to_send_params()]))
            .await?;
        Ok(BundleReceipt {
            relay: self.name.clone(),
            bundle_hash: result.bundle_hash,
            target_block: bundle.target_block,
            replacement_uuid: bundle.replacement_uuid,
        })
    }

    async fn simulate_bundle(
        &self,
        bundle: &Bundle,
        state_block: u64,
    ) -> RelayResult<SimulationOutcome> {
        let result: CallBundleResult = self
            .call("eth_callBundle", json!([bundle.to_call_params(state_block)]))
            .await?;
        Ok(simulation_outcome(result))
    }

    async fn cancel_bundle(&self, receipt: &BundleReceipt) -> RelayResult<()> {
        let _: Value = self
            .call(
                "eth_cancelBundle",
                json!([{ "replacementUuid": receipt.replacement_uuid.to_string() }]),
            )
            .await?;
        Ok(())
    }

    async fn inclusion_status(
        &self,
        receipt: &BundleReceipt,
        current_block: u64,
    ) -> RelayResult<InclusionStatus> {
        if current_block <= receipt.target_block {
            return Ok(InclusionStatus::Pending);
        }
        let stats: BundleStats = self
            .call(
                "flashbots_getBundleStatsV2",
                json!([{
                    "bundleHash": receipt.bundle_hash,
                    "blockNumber": format!("0x{:x}", receipt.target_block),
                }]),
            )
            .await?;
        if !stats.is_simulated {
            warn!(relay = %self.name, bundle = ?receipt.bundle_hash, "bundle never simulated by relay");
        }
        // Sealed by a builder is the strongest signal a relay gives; the chain receipt
        // is still the source of truth.
        if stats.sealed_by_builders_at.is_empty() {
            Ok(InclusionStatus::NotIncluded)
        } else {
            Ok(InclusionStatus::Included {
                block: receipt.target_block,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Signature;

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn relay() -> FlashbotsRelay {
        FlashbotsRelay::new(
            "flashbots",
            "https://relay.flashbots.net",
            KEY.parse().unwrap(),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_signature_header_recovers_signer() {
        let relay = relay();
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"eth_sendBundle","params":[]}"#;
        let header = relay.signature_header(body).await.unwrap();

        let (address, signature) = header.split_once(':').unwrap();
        assert_eq!(address, format!("{:?}", relay.signer.address()));
        let signature: Signature = signature.trim_start_matches("0x").parse().unwrap();
        let digest = format!("0x{}", hex::encode(keccak256(body)));
        assert!(signature.verify(digest, relay.signer.address()).is_ok());
    }

    #[test]
    fn test_parse_send_bundle_response() {
        let text = r#"{"jsonrpc":"2.0","id":1,"result":{"bundleHash":"0x2228f5d8954ce31dc1601a8ba264dbd401bf1428388ce88238932815c5d6f23f"}}"#;
        let result: SendBundleResult = parse_response("fb", "eth_sendBundle", text).unwrap();
        assert_eq!(
            format!("{:?}", result.bundle_hash),
            "0x2228f5d8954ce31dc1601a8ba264dbd401bf1428388ce88238932815c5d6f23f"
        );
    }

    #[test]
    fn test_rpc_error_is_rejection() {
        let text = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"bundle too old"}}"#;
        let result: RelayResult<SendBundleResult> = parse_response("fb", "eth_sendBundle", text);
        assert!(matches!(result, Err(RelayError::Rejected { .. })));
    }

    #[test]
    fn test_simulation_revert_detected() {
        let text = r#"{"jsonrpc":"2.0","id":1,"result":{
            "coinbaseDiff":"1000000000",
            "totalGasUsed":310000,
            "results":[{"txHash":"0x01","gasUsed":310000,"revert":"INSUFFICIENT_OUTPUT_AMOUNT"}]
        }}"#;
        let result: CallBundleResult = parse_response("fb", "eth_callBundle", text).unwrap();
        let outcome = simulation_outcome(result);
        assert!(!outcome.success);
        assert_eq!(outcome.gas_used, 310_000);
        assert_eq!(outcome.coinbase_diff, U256::from(1_000_000_000u64));
        assert_eq!(
            outcome.revert_reason.as_deref(),
            Some("INSUFFICIENT_OUTPUT_AMOUNT")
        );
        assert_eq!(outcome.returned_amount(), None);
    }

    #[test]
    fn test_simulation_return_value_decoded() {
        let text = r#"{"jsonrpc":"2.0","id":1,"result":{
            "coinbaseDiff":"0",
            "totalGasUsed":250000,
            "results":[{"txHash":"0x01","gasUsed":250000,"value":"0x00000000000000000000000000000000000000000000000000000000000f4240"}]
        }}"#;
        let result: CallBundleResult = parse_response("fb", "eth_callBundle", text).unwrap();
        let outcome = simulation_outcome(result);
        assert!(outcome.success);
        assert_eq!(outcome.returned_amount(), Some(U256::from(1_000_000u64)));
    }
}
