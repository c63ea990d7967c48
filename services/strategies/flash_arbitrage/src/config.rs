//! # Strategy Configuration - Typed, Validated Runtime Parameters
//!
//! ## Purpose
//!
//! Every tunable of the runtime in one typed tree: market bootstrap, search and pruning,
//! the ingest pipeline and feeds, trigger floors, the profit and gas models, capital
//! providers, execution and relays. Defaults are production-usable; every section
//! validates itself and the whole tree is rejected if any section is invalid.
//!
//! ## Integration Points
//!
//! - **Loading**: [`config::ConfigLoader`] layers the TOML file and `OURO_` environment
//!   variables over [`StrategyConfig::default`]
//! - **Hot values**: the engine publishes the tree through a [`config::ConfigHandle`];
//!   pipeline, trigger and orchestrator take a fresh snapshot per decision, so allow-lists,
//!   thresholds, hop limits, pruning, debounce, cache and relay settings change live
//! - **Amounts**: on-chain amounts use the lossless `codec::amount` representation;
//!   ratios and multipliers are `rust_decimal::Decimal`
//!
//! ## Architecture Role
//!
//! ```text
//! config.toml ─┐
//! OURO_* env ──┼──► [StrategyConfig::validate] ──► ConfigHandle ──► watch::Receiver
//! defaults ────┘                                        │
//!                                     pipeline / trigger / orchestrator snapshots
//! ```

use anyhow::Result;
use config::{ensure, SettingsResult, Validate};
use mev::RegistryConfig;
use network::{BackoffConfig, HealthConfig, RateLimitConfig};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use state_market::PathCacheConfig;
use std::path::Path;
use types::{Address, VenueProtocol, U256};

pub use amm::PricingConfig;

/// Complete configuration of the strategy runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub markets: MarketsConfig,
    pub search: SearchConfig,
    pub pruning: PruneConfig,
    pub pricing: PricingConfig,
    pub sizing: SizingSettings,
    pub cache: PathCacheConfig,
    pub pipeline: PipelineConfig,
    pub feeds: Vec<FeedConfig>,
    pub trigger: TriggerConfig,
    pub profit: ProfitConfig,
    pub gas: GasOracleConfig,
    pub capital: CapitalConfig,
    pub execution: ExecutionConfig,
    pub relays: RelaysConfig,
    pub rpc: RpcConfig,
    pub health: HealthConfig,
    pub events: EventsConfig,
}

/// Assets and venues loaded into the market graph at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketsConfig {
    pub chain_id: u64,
    /// Assets a cycle may start from; empty allows any asset
    pub base_assets: Vec<Address>,
    /// Wrapped native token gas is paid in
    pub native_asset: Address,
    pub assets: Vec<AssetEntry>,
    pub venues: Vec<VenueEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub address: Address,
    pub decimals: u8,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueEntry {
    pub address: Address,
    pub protocol: VenueProtocol,
    pub asset0: Address,
    pub asset1: Address,
    pub fee_bps: u32,
    #[serde(default = "default_venue_gas")]
    pub gas_estimate: u64,
}

fn default_venue_gas() -> u64 {
    120_000
}

/// Cycle search algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Dfs,
    Bfs,
    BellmanFord,
    /// Pick by graph size
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub strategy: SearchStrategy,
    pub max_hops: usize,
    pub min_hops: usize,
    /// Partial walks kept per BFS layer
    pub beam_width: usize,
    /// Raw cycles collected before pricing
    pub max_candidates: usize,
    /// Priced paths returned per search
    pub max_results: usize,
    /// Spot-rate product a raw cycle needs before it is worth pricing
    pub min_spot_product: f64,
    /// `Auto` uses DFS up to this many active assets
    pub dfs_max_assets: usize,
    /// `Auto` uses BFS up to this many active assets, Bellman-Ford beyond
    pub bfs_max_assets: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Auto,
            max_hops: 4,
            min_hops: 2,
            beam_width: 64,
            max_candidates: 512,
            max_results: 16,
            min_spot_product: 1.0,
            dfs_max_assets: 64,
            bfs_max_assets: 512,
        }
    }
}

/// Pruning aggressiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrunePreset {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    /// Preset the thresholds were derived from; informational once loaded
    pub preset: PrunePreset,
    /// Minimum input-side reserve, in whole units of the input asset
    pub min_liquidity_units: Decimal,
    /// Maximum single-hop impact at the probe size
    pub max_impact_bps: u32,
    /// Probe trade size as a fraction of the input-side reserve
    pub probe_fraction_bps: u32,
    /// Minimum quality score in [0, 1]
    pub min_quality: f64,
}

impl PruneConfig {
    pub fn for_preset(preset: PrunePreset) -> Self {
        let (min_liquidity_units, max_impact_bps, min_quality) = match preset {
            PrunePreset::Low => (dec!(1), 500, 0.90),
            PrunePreset::Medium => (dec!(10), 200, 0.95),
            PrunePreset::High => (dec!(100), 100, 0.97),
        };
        Self {
            preset,
            min_liquidity_units,
            max_impact_bps,
            probe_fraction_bps: 10,
            min_quality,
        }
    }
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self::for_preset(PrunePreset::Medium)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingSettings {
    pub max_iterations: u32,
    /// Smallest input worth pricing, raw units
    #[serde(with = "codec::amount")]
    pub min_amount: U256,
}

impl Default for SizingSettings {
    fn default() -> Self {
        Self {
            max_iterations: 192,
            min_amount: U256::one(),
        }
    }
}

impl SizingSettings {
    pub fn to_sizing(&self) -> amm::SizingConfig {
        amm::SizingConfig {
            max_iterations: self.max_iterations,
            min_amount: self.min_amount,
        }
    }
}

/// What to shed when the signal queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    DropOldest,
    DropLowestPriority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Feed → ingest channel capacity
    pub ingest_capacity: usize,
    /// Change signals buffered for the trigger
    pub queue_capacity: usize,
    pub drop_policy: DropPolicy,
    /// Venues to accept; empty accepts every known venue
    pub allow_list: Vec<Address>,
    /// Minimum input-side reserve after the update, whole units
    pub min_liquidity_units: Decimal,
    /// Updates moving the spot price less than this are noise...
    pub min_price_delta_bps: u32,
    /// ...unless a reserve moved at least this much
    pub min_reserve_delta_bps: u32,
    /// Pending swaps with more impact than this are not projected
    pub max_pending_impact_bps: u32,
    pub metrics_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ingest_capacity: 4_096,
            queue_capacity: 1_024,
            drop_policy: DropPolicy::DropOldest,
            allow_list: Vec::new(),
            min_liquidity_units: Decimal::ZERO,
            min_price_delta_bps: 1,
            min_reserve_delta_bps: 5,
            max_pending_impact_bps: 300,
            metrics_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    /// WebSocket URL; `${VAR}` references are expanded at startup
    pub url: String,
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    /// Venues to subscribe to; empty subscribes to everything the feed offers
    #[serde(default)]
    pub venues: Vec<Address>,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Consecutive undecodable frames tolerated before the feed is degraded
    #[serde(default = "default_decode_error_budget")]
    pub decode_error_budget: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_topics() -> Vec<String> {
    vec!["reserves".to_string(), "pending".to_string()]
}

fn default_heartbeat_timeout_ms() -> u64 {
    15_000
}

fn default_decode_error_budget() -> u32 {
    16
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl FeedConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            topics: default_topics(),
            venues: Vec::new(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            decode_error_budget: default_decode_error_budget(),
            connect_timeout_ms: default_connect_timeout_ms(),
            backoff: BackoffConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Window opened by the first signal for a venue; later signals do not extend it
    pub debounce_ms: u64,
    /// Search from scratch when no cached path survives re-validation
    pub fresh_search: bool,
    pub fresh_search_max_hops: usize,
    /// Opportunities handed to execution per firing
    pub max_triggered_per_fire: usize,
    /// Opportunities above this composite risk are detected but not triggered
    pub max_risk_score: Decimal,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            fresh_search: true,
            fresh_search_max_hops: 3,
            max_triggered_per_fire: 1,
            max_risk_score: dec!(0.6),
        }
    }
}

/// Behaviour when gas cannot be priced in a path's start asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GasConversionPolicy {
    /// Drop the path
    Reject,
    /// Treat gas as free; only sensible on chains with negligible gas
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfitConfig {
    pub base_gas: u64,
    pub flash_loan_gas: u64,
    /// Used for hops whose venue carries no gas estimate
    pub per_swap_gas: u64,
    pub gas_buffer: Decimal,
    pub priority_multiplier: Decimal,
    /// Share of gross profit assumed lost to competing searchers
    pub mev_leakage: Decimal,
    /// Net profit floor in basis points of the input
    pub min_profit_bps: i64,
    /// Absolute net profit floor, whole units of the start asset
    pub min_net_profit: Decimal,
    pub gas_conversion: GasConversionPolicy,
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            base_gas: 100_000,
            flash_loan_gas: 150_000,
            per_swap_gas: 120_000,
            gas_buffer: dec!(1.2),
            priority_multiplier: dec!(1.5),
            mev_leakage: dec!(0.10),
            min_profit_bps: 50,
            min_net_profit: Decimal::ZERO,
            gas_conversion: GasConversionPolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasOracleConfig {
    /// Blocks of base-fee history kept for trend detection
    pub history_blocks: usize,
    /// Relative move between history halves that counts as a trend
    pub trend_threshold: Decimal,
    pub refresh_ms: u64,
    /// Priority fee assumed when the node reports none
    pub default_priority_fee_gwei: u64,
}

impl Default for GasOracleConfig {
    fn default() -> Self {
        Self {
            history_blocks: 20,
            trend_threshold: dec!(0.10),
            refresh_ms: 2_000,
            default_priority_fee_gwei: 30,
        }
    }
}

/// Flash-loan protocol family, selects the callback encoding on the executor contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    AaveV3,
    BalancerV2,
    Other,
}

impl ProviderKind {
    pub fn id(&self) -> u8 {
        match self {
            ProviderKind::AaveV3 => 0,
            ProviderKind::BalancerV2 => 1,
            ProviderKind::Other => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    /// Pool or vault the loan is drawn from and that calls back into the executor
    pub contract: Address,
    pub fee_bps: u32,
    /// Tie-break between equal fees; lower goes first
    #[serde(default)]
    pub priority: u32,
    /// Assets the provider lends; empty lends anything
    #[serde(default)]
    pub assets: Vec<Address>,
    #[serde(default = "unlimited", with = "codec::amount")]
    pub max_available: U256,
}

fn unlimited() -> U256 {
    U256::MAX
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapitalConfig {
    pub providers: Vec<CapitalProviderConfig>,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                CapitalProviderConfig {
                    name: "balancer".to_string(),
                    kind: ProviderKind::BalancerV2,
                    contract: address("0xBA12222222228d8Ba445958a75a0704d566BF2C8"),
                    fee_bps: 0,
                    priority: 0,
                    assets: Vec::new(),
                    max_available: U256::MAX,
                },
                CapitalProviderConfig {
                    name: "aave".to_string(),
                    kind: ProviderKind::AaveV3,
                    contract: address("0x794a61358D6845594F94dc1DB02A252b5b4814aD"),
                    fee_bps: 5,
                    priority: 1,
                    assets: Vec::new(),
                    max_available: U256::MAX,
                },
            ],
        }
    }
}

/// Whether a bundle every private relay refused may go to the public mempool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicFallback {
    Never,
    AfterRelaysFail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Contract that receives the loan and runs the hops
    pub executor_contract: Address,
    /// Deducted from every hop's expected output to form its minimum
    pub slippage_buffer_bps: u32,
    pub deadline_secs: u64,
    pub simulate: bool,
    pub public_fallback: PublicFallback,
    /// Blocks past the target block before a submission counts as expired
    pub max_inclusion_blocks: u64,
    /// Wall-clock cap on waiting for inclusion
    pub max_inclusion_ms: u64,
    pub inclusion_poll_ms: u64,
    /// Detection to submission; older opportunities are cancelled
    pub latency_budget_ms: u64,
    pub max_in_flight: usize,
    /// Cancel an in-flight execution when a more profitable one shares a venue
    pub supersede: bool,
    pub max_gas_limit: u64,
    /// Environment variable holding the signing key
    pub signer_key_env: String,
    pub queue_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            executor_contract: Address::zero(),
            slippage_buffer_bps: 30,
            deadline_secs: 60,
            simulate: true,
            public_fallback: PublicFallback::Never,
            max_inclusion_blocks: 3,
            max_inclusion_ms: 48_000,
            inclusion_poll_ms: 500,
            latency_budget_ms: 2_000,
            max_in_flight: 4,
            supersede: true,
            max_gas_limit: 3_000_000,
            signer_key_env: "OURO_SIGNER_KEY".to_string(),
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEndpoint {
    pub name: String,
    pub url: String,
    /// Lower goes first
    #[serde(default)]
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaysConfig {
    pub registry: RegistryConfig,
    /// Environment variable holding the relay reputation key
    pub auth_key_env: String,
    pub endpoints: Vec<RelayEndpoint>,
}

impl Default for RelaysConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            auth_key_env: "OURO_RELAY_AUTH_KEY".to_string(),
            endpoints: vec![RelayEndpoint {
                name: "flashbots".to_string(),
                url: "https://relay.flashbots.net".to_string(),
                priority: 0,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub endpoint: String,
    /// JSON-RPC URL; `${VAR}` references are expanded at startup
    pub url: String,
    pub timeout_ms: u64,
    pub limits: RateLimitConfig,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "primary".to_string(),
            url: "https://polygon-rpc.com".to_string(),
            timeout_ms: 5_000,
            limits: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub bus_capacity: usize,
    /// Append every event as one JSON object per line
    pub jsonl_path: Option<String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            bus_capacity: 1_024,
            jsonl_path: None,
        }
    }
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            chain_id: 137,
            base_assets: Vec::new(),
            // WMATIC
            native_asset: address("0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270"),
            assets: Vec::new(),
            venues: Vec::new(),
        }
    }
}

fn address(text: &str) -> Address {
    text.parse().unwrap_or_default()
}

impl Validate for MarketsConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(self.chain_id > 0, "markets.chain_id", "must be positive")?;
        for asset in &self.assets {
            ensure(
                asset.decimals <= state_market::MAX_DECIMALS,
                "markets.assets.decimals",
                "too many decimals",
            )?;
        }
        let known = |id: &Address| self.assets.iter().any(|asset| asset.address == *id);
        for venue in &self.venues {
            ensure(
                known(&venue.asset0) && known(&venue.asset1),
                "markets.venues",
                "venue references an undeclared asset",
            )?;
            ensure(
                venue.asset0 != venue.asset1,
                "markets.venues",
                "venue must join two distinct assets",
            )?;
            ensure(venue.fee_bps < 10_000, "markets.venues.fee_bps", "must be below 10000")?;
        }
        Ok(())
    }
}

impl Validate for SearchConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(self.min_hops >= 2, "search.min_hops", "a cycle needs two hops")?;
        ensure(
            self.max_hops >= self.min_hops,
            "search.max_hops",
            "must be at least min_hops",
        )?;
        ensure(self.max_hops <= 8, "search.max_hops", "must be at most 8")?;
        ensure(self.beam_width > 0, "search.beam_width", "must be positive")?;
        ensure(self.max_results > 0, "search.max_results", "must be positive")?;
        ensure(
            self.min_spot_product.is_finite() && self.min_spot_product > 0.0,
            "search.min_spot_product",
            "must be a positive number",
        )
    }
}

impl Validate for PruneConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(
            self.min_liquidity_units >= Decimal::ZERO,
            "pruning.min_liquidity_units",
            "must not be negative",
        )?;
        ensure(
            self.probe_fraction_bps > 0 && self.probe_fraction_bps < 10_000,
            "pruning.probe_fraction_bps",
            "must be in (0, 10000)",
        )?;
        ensure(
            (0.0..=1.0).contains(&self.min_quality),
            "pruning.min_quality",
            "must be in [0, 1]",
        )
    }
}

impl Validate for PipelineConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(self.queue_capacity > 0, "pipeline.queue_capacity", "must be positive")?;
        ensure(self.ingest_capacity > 0, "pipeline.ingest_capacity", "must be positive")?;
        ensure(
            self.min_liquidity_units >= Decimal::ZERO,
            "pipeline.min_liquidity_units",
            "must not be negative",
        )?;
        ensure(
            self.max_pending_impact_bps <= 10_000,
            "pipeline.max_pending_impact_bps",
            "must be <= 10000",
        )
    }
}

impl Validate for FeedConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(!self.name.is_empty(), "feeds.name", "must not be empty")?;
        ensure(
            self.url.starts_with("ws://") || self.url.starts_with("wss://"),
            "feeds.url",
            "must be a ws:// or wss:// URL",
        )?;
        ensure(!self.topics.is_empty(), "feeds.topics", "must not be empty")?;
        ensure(
            self.heartbeat_timeout_ms > 0,
            "feeds.heartbeat_timeout_ms",
            "must be positive",
        )
    }
}

impl Validate for TriggerConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(
            self.fresh_search_max_hops >= 2,
            "trigger.fresh_search_max_hops",
            "a cycle needs two hops",
        )?;
        ensure(
            self.max_risk_score > Decimal::ZERO && self.max_risk_score <= Decimal::ONE,
            "trigger.max_risk_score",
            "must be in (0, 1]",
        )
    }
}

impl Validate for ProfitConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(
            self.gas_buffer >= Decimal::ONE,
            "profit.gas_buffer",
            "must be at least 1",
        )?;
        ensure(
            self.priority_multiplier >= Decimal::ZERO,
            "profit.priority_multiplier",
            "must not be negative",
        )?;
        ensure(
            self.mev_leakage >= Decimal::ZERO && self.mev_leakage < Decimal::ONE,
            "profit.mev_leakage",
            "must be in [0, 1)",
        )?;
        ensure(
            self.min_profit_bps >= 0,
            "profit.min_profit_bps",
            "must not be negative",
        )?;
        ensure(
            self.min_net_profit >= Decimal::ZERO,
            "profit.min_net_profit",
            "must not be negative",
        )
    }
}

impl Validate for GasOracleConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(self.history_blocks >= 2, "gas.history_blocks", "must be at least 2")?;
        ensure(
            self.trend_threshold > Decimal::ZERO,
            "gas.trend_threshold",
            "must be positive",
        )?;
        ensure(self.refresh_ms > 0, "gas.refresh_ms", "must be positive")
    }
}

impl Validate for CapitalConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(
            !self.providers.is_empty(),
            "capital.providers",
            "at least one capital provider is required",
        )?;
        for provider in &self.providers {
            ensure(
                provider.fee_bps < 10_000,
                "capital.providers.fee_bps",
                "must be below 10000",
            )?;
            ensure(
                !provider.contract.is_zero(),
                "capital.providers.contract",
                "must not be the zero address",
            )?;
        }
        Ok(())
    }
}

impl Validate for ExecutionConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(
            self.slippage_buffer_bps < 10_000,
            "execution.slippage_buffer_bps",
            "must be below 10000",
        )?;
        ensure(self.deadline_secs > 0, "execution.deadline_secs", "must be positive")?;
        ensure(
            self.max_inclusion_blocks > 0,
            "execution.max_inclusion_blocks",
            "must be positive",
        )?;
        ensure(self.max_in_flight > 0, "execution.max_in_flight", "must be positive")?;
        ensure(
            self.max_gas_limit >= 21_000,
            "execution.max_gas_limit",
            "must be at least 21000",
        )?;
        ensure(
            self.queue_capacity > 0,
            "execution.queue_capacity",
            "must be positive",
        )
    }
}

impl Validate for RelaysConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(
            self.registry.per_relay_timeout_ms > 0,
            "relays.registry.per_relay_timeout_ms",
            "must be positive",
        )?;
        for endpoint in &self.endpoints {
            ensure(
                url::Url::parse(&endpoint.url).is_ok() || endpoint.url.contains('$'),
                "relays.endpoints.url",
                "must be a URL",
            )?;
        }
        Ok(())
    }
}

impl Validate for RpcConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(!self.endpoint.is_empty(), "rpc.endpoint", "must not be empty")?;
        ensure(self.timeout_ms > 0, "rpc.timeout_ms", "must be positive")?;
        ensure(
            self.limits.max_concurrent > 0 && self.limits.requests_per_second > 0,
            "rpc.limits",
            "concurrency and quota must be positive",
        )
    }
}

impl Validate for EventsConfig {
    fn validate(&self) -> SettingsResult<()> {
        ensure(self.bus_capacity > 0, "events.bus_capacity", "must be positive")
    }
}

impl Validate for StrategyConfig {
    fn validate(&self) -> SettingsResult<()> {
        self.markets.validate()?;
        self.search.validate()?;
        self.pruning.validate()?;
        ensure(
            self.pricing.max_reserve_fraction_bps > 0
                && self.pricing.max_reserve_fraction_bps <= 10_000,
            "pricing.max_reserve_fraction_bps",
            "must be in (0, 10000]",
        )?;
        ensure(
            self.sizing.max_iterations > 0,
            "sizing.max_iterations",
            "must be positive",
        )?;
        ensure(self.cache.capacity > 0, "cache.capacity", "must be positive")?;
        self.pipeline.validate()?;
        for feed in &self.feeds {
            feed.validate()?;
        }
        self.trigger.validate()?;
        self.profit.validate()?;
        self.gas.validate()?;
        self.capital.validate()?;
        self.execution.validate()?;
        self.relays.validate()?;
        self.rpc.validate()?;
        self.events.validate()
    }
}

impl StrategyConfig {
    /// Load one TOML file without layering
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        config::from_file(path)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        config::save_to_file(self, path)
    }

    pub fn is_base_asset(&self, asset: &Address) -> bool {
        self.markets.base_assets.is_empty() || self.markets.base_assets.contains(asset)
    }
}
