//! Chain access
//!
//! [`ChainReader`] is the seam between strategy code and a node. The ethers-backed
//! [`EthersChainReader`] talks JSON-RPC over HTTP; [`RateLimitedChainReader`] wraps any
//! reader with an endpoint limiter so every call is queued, quota-bound and deadline-
//! bound. [`StaticChainReader`] serves fixed values for dry runs and tests.

use crate::error::{NetworkError, NetworkResult};
use crate::rate_limit::EndpointLimiter;
use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{BlockId, BlockNumber, TransactionRequest};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use types::{Address, Bytes, H256, U256};
use url::Url;

/// `getReserves()` on Uniswap-V2-style pairs
pub const GET_RESERVES_SELECTOR: [u8; 4] = [0x09, 0x02, 0xf1, 0xac];

/// Fee market state of the latest block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GasSample {
    pub block_number: u64,
    pub base_fee: U256,
    pub priority_fee: U256,
    pub gas_used: U256,
    pub gas_limit: U256,
}

impl GasSample {
    /// Share of the block gas limit consumed, 0.0..=1.0
    pub fn utilization(&self) -> f64 {
        if self.gas_limit.is_zero() {
            return 0.0;
        }
        let used = self.gas_used.min(self.gas_limit);
        // Both fit in u64 on every live chain
        used.low_u64() as f64 / self.gas_limit.low_u64().max(1) as f64
    }
}

/// Final status of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success { block_number: u64, gas_used: U256 },
    Reverted { block_number: u64 },
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn block_number(&self) -> NetworkResult<u64>;

    async fn gas_sample(&self) -> NetworkResult<GasSample>;

    /// Constant-product reserves of a pair contract
    async fn reserves(&self, venue: Address) -> NetworkResult<(U256, U256)>;

    /// Pending-block transaction count, i.e. the next usable nonce
    async fn transaction_count(&self, account: Address) -> NetworkResult<U256>;

    async fn send_raw_transaction(&self, raw: Bytes) -> NetworkResult<H256>;

    async fn receipt(&self, tx_hash: H256) -> NetworkResult<Option<ReceiptStatus>>;
}

pub struct EthersChainReader {
    endpoint: String,
    provider: Provider<Http>,
}

impl EthersChainReader {
    pub fn new(endpoint: impl Into<String>, rpc_url: &str, timeout: Duration) -> NetworkResult<Self> {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(300))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| NetworkError::configuration(e.to_string(), Some("rpc_url")))?;
        let url: Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| NetworkError::configuration(e.to_string(), Some("rpc_url")))?;
        let provider = Provider::new(Http::new_with_client(url, client));
        Ok(Self { endpoint, provider })
    }

    fn err(&self, e: impl ToString) -> NetworkError {
        NetworkError::rpc(self.endpoint.clone(), e)
    }
}

#[async_trait]
impl ChainReader for EthersChainReader {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn block_number(&self) -> NetworkResult<u64> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| self.err(e))?;
        Ok(number.as_u64())
    }

    async fn gas_sample(&self) -> NetworkResult<GasSample> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| self.err(e))?
            .ok_or_else(|| NetworkError::InvalidResponse {
                method: "eth_getBlockByNumber".to_string(),
                reason: "latest block missing".to_string(),
            })?;
        let priority_fee: U256 = self
            .provider
            .request("eth_maxPriorityFeePerGas", ())
            .await
            .map_err(|e| self.err(e))?;

        Ok(GasSample {
            block_number: block.number.map(|n| n.as_u64()).unwrap_or_default(),
            base_fee: block.base_fee_per_gas.unwrap_or_default(),
            priority_fee,
            gas_used: block.gas_used,
            gas_limit: block.gas_limit,
        })
    }

    async fn reserves(&self, venue: Address) -> NetworkResult<(U256, U256)> {
        let call = TransactionRequest::new()
            .to(venue)
            .data(Bytes::from(GET_RESERVES_SELECTOR.to_vec()));
        let output = self
            .provider
            .call(&call.into(), None)
            .await
            .map_err(|e| self.err(e))?;
        decode_reserves(&output)
    }

    async fn transaction_count(&self, account: Address) -> NetworkResult<U256> {
        self.provider
            .get_transaction_count(account, Some(BlockId::Number(BlockNumber::Pending)))
            .await
            .map_err(|e| self.err(e))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> NetworkResult<H256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| self.err(e))?;
        Ok(pending.tx_hash())
    }

    async fn receipt(&self, tx_hash: H256) -> NetworkResult<Option<ReceiptStatus>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| self.err(e))?;
        Ok(receipt.map(|r| {
            let block_number = r.block_number.map(|n| n.as_u64()).unwrap_or_default();
            if r.status.map(|s| s.as_u64() == 1).unwrap_or(false) {
                ReceiptStatus::Success {
                    block_number,
                    gas_used: r.gas_used.unwrap_or_default(),
                }
            } else {
                ReceiptStatus::Reverted { block_number }
            }
        }))
    }
}

/// Decode `getReserves()` return data (uint112, uint112, uint32)
pub fn decode_reserves(output: &[u8]) -> NetworkResult<(U256, U256)> {
    let tokens = abi::decode(
        &[ParamType::Uint(112), ParamType::Uint(112), ParamType::Uint(32)],
        output,
    )
    .map_err(|e| NetworkError::InvalidResponse {
        method: "getReserves".to_string(),
        reason: e.to_string(),
    })?;
    match tokens.as_slice() {
        [Token::Uint(r0), Token::Uint(r1), _] => Ok((*r0, *r1)),
        _ => Err(NetworkError::InvalidResponse {
            method: "getReserves".to_string(),
            reason: "unexpected layout".to_string(),
        }),
    }
}

/// Any reader behind an endpoint limiter
pub struct RateLimitedChainReader<R> {
    inner: R,
    limiter: Arc<EndpointLimiter>,
}

impl<R: ChainReader> RateLimitedChainReader<R> {
    pub fn new(inner: R, limiter: Arc<EndpointLimiter>) -> Self {
        Self { inner, limiter }
    }

    pub fn limiter(&self) -> &Arc<EndpointLimiter> {
        &self.limiter
    }
}

#[async_trait]
impl<R: ChainReader> ChainReader for RateLimitedChainReader<R> {
    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    async fn block_number(&self) -> NetworkResult<u64> {
        self.limiter.run("eth_blockNumber", self.inner.block_number()).await
    }

    async fn gas_sample(&self) -> NetworkResult<GasSample> {
        self.limiter.run("gas_sample", self.inner.gas_sample()).await
    }

    async fn reserves(&self, venue: Address) -> NetworkResult<(U256, U256)> {
        self.limiter.run("getReserves", self.inner.reserves(venue)).await
    }

    async fn transaction_count(&self, account: Address) -> NetworkResult<U256> {
        self.limiter
            .run("eth_getTransactionCount", self.inner.transaction_count(account))
            .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> NetworkResult<H256> {
        debug!(endpoint = self.inner.endpoint(), bytes = raw.len(), "sending raw transaction");
        self.limiter
            .run("eth_sendRawTransaction", self.inner.send_raw_transaction(raw))
            .await
    }

    async fn receipt(&self, tx_hash: H256) -> NetworkResult<Option<ReceiptStatus>> {
        self.limiter
            .run("eth_getTransactionReceipt", self.inner.receipt(tx_hash))
            .await
    }
}

#[derive(Debug, Default)]
struct StaticState {
    block_number: u64,
    gas: GasSample,
    reserves: HashMap<Address, (U256, U256)>,
    nonces: HashMap<Address, U256>,
    receipts: HashMap<H256, ReceiptStatus>,
    sent: Vec<Bytes>,
}

/// In-memory reader for dry runs and tests
#[derive(Debug, Default)]
pub struct StaticChainReader {
    state: RwLock<StaticState>,
}

impl StaticChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_block_number(&self, block_number: u64) {
        self.state.write().block_number = block_number;
    }

    pub fn set_gas(&self, gas: GasSample) {
        self.state.write().gas = gas;
    }

    pub fn set_reserves(&self, venue: Address, reserves: (U256, U256)) {
        self.state.write().reserves.insert(venue, reserves);
    }

    pub fn set_nonce(&self, account: Address, nonce: U256) {
        self.state.write().nonces.insert(account, nonce);
    }

    pub fn set_receipt(&self, tx_hash: H256, status: ReceiptStatus) {
        self.state.write().receipts.insert(tx_hash, status);
    }

    pub fn sent_transactions(&self) -> Vec<Bytes> {
        self.state.read().sent.clone()
    }
}

#[async_trait]
impl ChainReader for StaticChainReader {
    fn endpoint(&self) -> &str {
        "static"
    }

    async fn block_number(&self) -> NetworkResult<u64> {
        Ok(self.state.read().block_number)
    }

    async fn gas_sample(&self) -> NetworkResult<GasSample> {
        Ok(self.state.read().gas)
    }

    async fn reserves(&self, venue: Address) -> NetworkResult<(U256, U256)> {
        self.state
            .read()
            .reserves
            .get(&venue)
            .copied()
            .ok_or_else(|| NetworkError::rpc("static", format!("no reserves for {venue:?}")))
    }

    async fn transaction_count(&self, account: Address) -> NetworkResult<U256> {
        Ok(self
            .state
            .read()
            .nonces
            .get(&account)
            .copied()
            .unwrap_or_default())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> NetworkResult<H256> {
        let hash = H256::from(ethers::utils::keccak256(&raw));
        self.state.write().sent.push(raw);
        Ok(hash)
    }

    async fn receipt(&self, tx_hash: H256) -> NetworkResult<Option<ReceiptStatus>> {
        Ok(self.state.read().receipts.get(&tx_hash).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimitConfig;

    #[test]
    fn test_decode_reserves() {
        let output = abi::encode(&[
            Token::Uint(U256::from(1_000u64)),
            Token::Uint(U256::from(2_000u64)),
            Token::Uint(U256::from(1_700_000_000u64)),
        ]);
        assert_eq!(
            decode_reserves(&output).unwrap(),
            (U256::from(1_000u64), U256::from(2_000u64))
        );
        assert!(decode_reserves(&output[..40]).is_err());
    }

    #[test]
    fn test_gas_utilization() {
        let sample = GasSample {
            gas_used: U256::from(15_000_000u64),
            gas_limit: U256::from(30_000_000u64),
            ..Default::default()
        };
        assert!((sample.utilization() - 0.5).abs() < 1e-9);
        assert_eq!(GasSample::default().utilization(), 0.0);
    }

    #[tokio::test]
    async fn test_rate_limited_reader_delegates() {
        let inner = StaticChainReader::new();
        inner.set_block_number(42);
        inner.set_nonce(Address::repeat_byte(1), U256::from(7u64));
        let limiter = Arc::new(EndpointLimiter::new("static", RateLimitConfig::default()));
        let reader = RateLimitedChainReader::new(inner, limiter.clone());

        assert_eq!(reader.block_number().await.unwrap(), 42);
        assert_eq!(
            reader.transaction_count(Address::repeat_byte(1)).await.unwrap(),
            U256::from(7u64)
        );
        assert!(reader.reserves(Address::zero()).await.is_err());
        assert_eq!(limiter.stats().granted, 3);
    }
}
