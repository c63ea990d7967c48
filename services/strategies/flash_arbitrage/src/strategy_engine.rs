//! # Strategy Engine - Runtime Wiring
//!
//! ## Purpose
//!
//! Builds every component from one validated [`StrategyConfig`], connects them with
//! bounded channels and runs them until shutdown. The engine owns no strategy logic of
//! its own; it decides only what runs where and in which order things stop.
//!
//! ## Integration Points
//!
//! - **Chain**: `network::EthersChainReader` behind the endpoint rate limiter, shared by
//!   bootstrap, gas oracle, nonce manager and orchestrator
//! - **Feeds**: one [`FeedClient`] task per configured feed
//! - **Relays**: Flashbots-compatible endpoints registered in priority order
//! - **Hot config**: [`ConfigHandle`] updates reach the pipeline (forwarded here), the
//!   trigger and the orchestrator (each watches the handle itself)
//!
//! ## Architecture Role
//!
//! ```text
//! FeedClient × N ──► ingest mpsc ──► Pipeline ──► SignalQueue ──► Trigger
//!                                       │                           │ mpsc
//!                                  MarketGraph ◄── bootstrap        ▼
//!                                       └──────────────────► Orchestrator ──► relays
//!                               GasOracle task ─┘    EventBus ──► JSON lines
//! ```
//!
//! ## Shutdown
//!
//! Feeds stop first. Their senders dropping ends the pipeline, which closes the signal
//! queue; the trigger flushes open windows and hangs up, and the orchestrator drains its
//! in-flight executions before the engine returns.

use anyhow::{Context, Result};
use config::{expand_env, ConfigHandle};
use ethers::signers::{LocalWallet, Signer};
use mev::{FlashbotsRelay, RelayRegistry, ScriptedRelay};
use network::{
    ChainReader, EndpointLimiter, EthersChainReader, HealthTracker, RateLimitedChainReader,
    StaticChainReader,
};
use serde::Serialize;
use state_market::MarketGraph;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::capital::CapitalSelector;
use crate::config::StrategyConfig;
use crate::events::{EventBus, JsonLinesWriter};
use crate::feed::{FeedClient, FeedStats};
use crate::gas_price::GasOracle;
use crate::market_loader::{load_markets, LoadReport};
use crate::nonce::NonceManager;
use crate::orchestrator::{ExecutionContext, Orchestrator, OrchestratorStats};
use crate::pathfinder::{PathFinder, SearchRequest};
use crate::pipeline::{Pipeline, PipelineStats, SignalQueue};
use crate::profit::{CostSource, LiveCosts, ProfitModel};
use crate::pruner::Pruner;
use crate::trigger::{Trigger, TriggerStats};
use crate::{log_error, log_metrics, log_success};

/// Time the event writer gets to flush after everything else stopped
const WRITER_FLUSH: Duration = Duration::from_secs(2);

/// What the engine did before it stopped
#[derive(Debug, Clone, Serialize)]
pub struct EngineReport {
    pub markets: LoadReport,
    pub warm_paths: usize,
    pub feeds: Vec<FeedStats>,
    pub pipeline: PipelineStats,
    pub trigger: TriggerStats,
    pub orchestrator: OrchestratorStats,
    pub events: BTreeMap<&'static str, u64>,
}

pub struct StrategyEngine {
    config: ConfigHandle<StrategyConfig>,
    graph: Arc<MarketGraph>,
    events: EventBus,
    health: Arc<HealthTracker>,
    reader: Arc<dyn ChainReader>,
    relays: Arc<RelayRegistry>,
    signer: LocalWallet,
}

impl StrategyEngine {
    /// Live wiring: JSON-RPC reader, Flashbots relays and the signing key from the environment
    pub fn new(config: StrategyConfig) -> Result<Self> {
        let rpc_url = expand_env(&config.rpc.url)?;
        let chain = EthersChainReader::new(
            config.rpc.endpoint.clone(),
            &rpc_url,
            Duration::from_millis(config.rpc.timeout_ms),
        )
        .context("Failed to create chain reader")?;
        let limiter = Arc::new(EndpointLimiter::new(
            config.rpc.endpoint.clone(),
            config.rpc.limits.clone(),
        ));
        let reader: Arc<dyn ChainReader> = Arc::new(RateLimitedChainReader::new(chain, limiter));

        let signer = wallet_from_env(&config.execution.signer_key_env)?;
        let auth = match std::env::var(&config.relays.auth_key_env) {
            Ok(_) => wallet_from_env(&config.relays.auth_key_env)?,
            Err(_) => {
                warn!(
                    "{} not set, signing relay requests with a throwaway identity",
                    config.relays.auth_key_env
                );
                LocalWallet::new(&mut ethers::core::rand::thread_rng())
            }
        };

        let health = Arc::new(HealthTracker::new(config.health.clone()));
        let mut registry = RelayRegistry::new(config.relays.registry.clone(), health.clone());
        let timeout = Duration::from_millis(config.relays.registry.per_relay_timeout_ms);
        for endpoint in &config.relays.endpoints {
            let url = expand_env(&endpoint.url)?;
            let relay = FlashbotsRelay::new(endpoint.name.clone(), &url, auth.clone(), timeout)
                .with_context(|| format!("Failed to create relay {}", endpoint.name))?;
            registry.register(Arc::new(relay), endpoint.priority);
        }

        Self::with_components(config, reader, registry, health, signer)
    }

    /// Offline wiring: in-memory chain and a scripted relay, nothing leaves the process
    pub fn dry_run(config: StrategyConfig) -> Result<Self> {
        let health = Arc::new(HealthTracker::new(config.health.clone()));
        let mut registry = RelayRegistry::new(config.relays.registry.clone(), health.clone());
        registry.register(Arc::new(ScriptedRelay::new("dry-run")), 0);
        let signer = LocalWallet::new(&mut ethers::core::rand::thread_rng());
        Self::with_components(
            config,
            Arc::new(StaticChainReader::new()),
            registry,
            health,
            signer,
        )
    }

    pub fn with_components(
        config: StrategyConfig,
        reader: Arc<dyn ChainReader>,
        relays: RelayRegistry,
        health: Arc<HealthTracker>,
        signer: LocalWallet,
    ) -> Result<Self> {
        let events = EventBus::new(config.events.bus_capacity);
        let config = ConfigHandle::new(config).context("Invalid strategy configuration")?;
        Ok(Self {
            config,
            graph: Arc::new(MarketGraph::new()),
            events,
            health,
            reader,
            relays: Arc::new(relays),
            signer,
        })
    }

    /// Publish configuration updates through this handle
    pub fn config(&self) -> ConfigHandle<StrategyConfig> {
        self.config.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn graph(&self) -> &Arc<MarketGraph> {
        &self.graph
    }

    /// Run until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<EngineReport> {
        let config = self.config.current();
        info!("🚀 Starting Ouro strategy engine on chain {}", config.markets.chain_id);

        let markets = load_markets(&self.graph, &config.markets, Some(self.reader.as_ref()))
            .await
            .context("Market bootstrap failed")?;

        let gas = Arc::new(GasOracle::new(config.gas.clone()));
        if let Err(e) = gas.refresh(self.reader.as_ref()).await {
            warn!("Initial gas sample failed: {}", e);
        }
        let gas_task = tokio::spawn(gas.clone().run(self.reader.clone()));

        let writer_task = config.events.jsonl_path.as_ref().map(|path| {
            info!("Writing events to {}", path);
            tokio::spawn(JsonLinesWriter::new(&self.events, path).run())
        });

        let engine = amm::CurveEngine::new(config.pricing.clone());
        let capital = CapitalSelector::from_config(&config.capital.providers);
        let costs: Arc<dyn CostSource> = Arc::new(LiveCosts::new(
            ProfitModel::new(config.profit.clone()),
            gas.clone(),
            capital.clone(),
            engine.clone(),
            config.markets.native_asset,
        ));

        // Ingest
        let queue = Arc::new(SignalQueue::new(
            config.pipeline.queue_capacity,
            config.pipeline.drop_policy,
        ));
        let pipeline = Arc::new(
            Pipeline::new(
                config.pipeline.clone(),
                self.graph.clone(),
                engine.clone(),
                queue.clone(),
            )
            .with_health(self.health.clone(), self.events.clone()),
        );
        let (ingest_tx, ingest_rx) = mpsc::channel(config.pipeline.ingest_capacity);
        let pipeline_task = tokio::spawn(pipeline.clone().run(ingest_rx));

        let feed_tasks: Vec<JoinHandle<_>> = config
            .feeds
            .iter()
            .cloned()
            .map(|feed| {
                let client = FeedClient::new(feed, self.health.clone(), self.events.clone());
                tokio::spawn(client.run(ingest_tx.clone(), shutdown.clone()))
            })
            .collect();
        drop(ingest_tx);

        // Detection, warmed with one full search
        let mut trigger = Trigger::new(&config, self.graph.clone(), costs.clone(), self.events.clone());
        let warm_paths = {
            let pruner = Pruner::new(config.pruning.clone(), engine.clone());
            let finder = PathFinder::new(
                config.search.clone(),
                engine.clone(),
                config.sizing.to_sizing(),
                config.markets.base_assets.clone(),
            );
            let (snapshot, _) = pruner.prune(&self.graph.snapshot());
            let outcome = finder.find(&snapshot, &SearchRequest::default(), costs.cost_model().as_ref());
            trigger.warm(outcome.paths)
        };
        let (opportunity_tx, opportunity_rx) = mpsc::channel(config.execution.queue_capacity);
        let trigger_task = tokio::spawn(trigger.run(queue.clone(), opportunity_tx, self.config.subscribe()));

        // Execution
        let nonces = Arc::new(NonceManager::new(self.signer.address(), self.reader.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            &config,
            ExecutionContext {
                graph: self.graph.clone(),
                costs,
                capital,
                nonces,
                signer: self.signer.clone(),
                reader: self.reader.clone(),
                gas: gas.clone(),
                relays: self.relays.clone(),
                events: self.events.clone(),
            },
        ));
        let orchestrator_task = tokio::spawn(orchestrator.run(opportunity_rx, self.config.subscribe()));

        let reload_task = tokio::spawn(forward_pipeline_settings(pipeline.clone(), self.config.subscribe()));

        log_success!(
            "Engine running: {} feeds, {} warm paths, {} relays",
            feed_tasks.len(),
            warm_paths,
            self.relays.len()
        );

        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        info!("Shutdown requested, stopping feeds");

        let mut feeds = Vec::with_capacity(feed_tasks.len());
        for task in feed_tasks {
            match task.await {
                Ok(Ok(stats)) => feeds.push(stats),
                Ok(Err(e)) => log_error!("Feed stopped with error: {}", e),
                Err(e) => log_error!("Feed task failed: {}", e),
            }
        }
        stop_ingest(pipeline_task, &queue).await;
        let trigger = trigger_task.await.context("Trigger task failed")?;
        let orchestrator = orchestrator_task.await.context("Orchestrator task failed")?;
        reload_task.abort();
        gas_task.abort();

        let report = EngineReport {
            markets,
            warm_paths,
            feeds,
            pipeline: pipeline.metrics().stats(),
            trigger,
            orchestrator,
            events: self.events.counts(),
        };
        log_metrics!(
            "Engine stopped: {} triggered, {} included, {} failed",
            report.trigger.triggered,
            report.orchestrator.included,
            report.orchestrator.failed
        );

        drop(self.events);
        if let Some(task) = writer_task {
            match tokio::time::timeout(WRITER_FLUSH, task).await {
                Ok(Ok(Ok(written))) => info!("Event writer flushed {} events", written),
                Ok(Ok(Err(e))) => log_error!("Event writer failed: {}", e),
                Ok(Err(e)) => log_error!("Event writer task failed: {}", e),
                Err(_) => warn!("Event writer did not finish flushing"),
            }
        }
        Ok(report)
    }
}

/// Let the pipeline drain every delta already ingested, then close the queue behind it
async fn stop_ingest(pipeline_task: JoinHandle<()>, queue: &SignalQueue) {
    if let Err(e) = pipeline_task.await {
        log_error!("Pipeline task failed: {}", e);
    }
    // The pipeline closes the queue on a clean exit; a panicked one does not
    queue.close();
}

/// Pipeline filters follow the live configuration; everything else watches the handle itself
async fn forward_pipeline_settings(pipeline: Arc<Pipeline>, mut updates: watch::Receiver<Arc<StrategyConfig>>) {
    while updates.changed().await.is_ok() {
        let latest = updates.borrow_and_update().clone();
        pipeline.reconfigure(latest.pipeline.clone());
        info!(
            min_price_delta_bps = latest.pipeline.min_price_delta_bps,
            allow_list = latest.pipeline.allow_list.len(),
            "pipeline filters updated"
        );
    }
}

fn wallet_from_env(variable: &str) -> Result<LocalWallet> {
    let key = std::env::var(variable).with_context(|| format!("{variable} is not set"))?;
    key.trim()
        .trim_start_matches("0x")
        .parse::<LocalWallet>()
        .with_context(|| format!("{variable} does not hold a valid private key"))
}
