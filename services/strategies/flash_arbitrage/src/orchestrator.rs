//! # Execution Orchestrator - From Triggered Opportunity to Landed Transaction
//!
//! ## Purpose
//!
//! Drives every triggered opportunity to exactly one terminal state. Nothing is signed
//! until the path has been re-validated against the latest graph, a capital source has
//! produced a plan whose guards hold, and (when enabled) a relay simulation succeeded.
//! Failures at any step end the opportunity with a [`ReasonCode`] and an
//! `ExecutionFailed` event; nothing is retried past the point of failure.
//!
//! ## Flow
//!
//! ```text
//! Opportunity ──► latency budget ──► re-validate (fresh snapshot, live costs)
//!                                        │ floors
//!                                        ▼
//!                  claim venues (supersede less profitable in-flight executions)
//!                                        │
//!        capital candidates ──► PlanBuilder (first valid plan wins)
//!                                        │
//!                  nonce lease ──► sign EIP-1559 ──► bundle ──► simulate
//!                                        │
//!        RelayRegistry::submit ──► public mempool (policy) ──► track inclusion
//!                                        │
//!                  Included | Reverted | Expired | Cancelled  ──► EventBus
//! ```
//!
//! ## Concurrency
//!
//! At most `max_in_flight` executions run at once. Executions sharing a venue never run
//! side by side: the newcomer either cancels the incumbent (when more profitable and
//! superseding is enabled) or is itself cancelled. From nonce reservation until its
//! bundle resolves, an execution holds the account's submission lane: bundles target a
//! single block, so a bundle carrying nonce N+1 could never land unless N landed first
//! in the same block. Later executions plan concurrently and queue for the lane, then
//! re-check their latency budget. A cancelled execution that was
//! already submitted keeps tracking its bundle, so a bundle that lands anyway is still
//! reported as included.

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::Eip1559TransactionRequest;
use mev::{health_subject, Bundle, BundleBuilder, BundleReceipt, InclusionStatus, RelayRegistry};
use network::{ChainReader, ReceiptStatus};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use state_market::MarketGraph;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info};
use types::{
    Address, Bytes, CandidatePath, ErrorClass, Opportunity, OpportunityStatus, PathSummary,
    ReasonCode, StrategyEvent, H256, I256, U256,
};
use uuid::Uuid;

use crate::capital::CapitalSelector;
use crate::config::{ExecutionConfig, PublicFallback, StrategyConfig};
use crate::events::EventBus;
use crate::executor::{ExecutionPlan, PlanBuilder};
use crate::gas_price::GasOracle;
use crate::nonce::{NonceLease, NonceManager};
use crate::pathfinder::PathFinder;
use crate::profit::{scale, CostSource, ProfitModel};
use crate::{log_error, log_execution, log_profit, log_warning};

/// Shared services the orchestrator executes against
pub struct ExecutionContext {
    pub graph: Arc<MarketGraph>,
    pub costs: Arc<dyn CostSource>,
    pub capital: CapitalSelector,
    pub nonces: Arc<NonceManager>,
    pub signer: LocalWallet,
    pub reader: Arc<dyn ChainReader>,
    pub gas: Arc<GasOracle>,
    pub relays: Arc<RelayRegistry>,
    pub events: EventBus,
}

/// Settings rebuilt whenever the configuration changes
struct Settings {
    execution: ExecutionConfig,
    chain_id: u64,
    finder: PathFinder,
    profit: ProfitModel,
    builder: PlanBuilder,
}

impl Settings {
    fn from_config(config: &StrategyConfig) -> Self {
        let profit = ProfitModel::new(config.profit.clone());
        Self {
            execution: config.execution.clone(),
            chain_id: config.markets.chain_id,
            finder: PathFinder::new(
                config.search.clone(),
                amm::CurveEngine::new(config.pricing.clone()),
                config.sizing.to_sizing(),
                config.markets.base_assets.clone(),
            ),
            builder: PlanBuilder::new(config.execution.clone(), profit.clone()),
            profit,
        }
    }
}

/// Final record of one execution
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub opportunity: Opportunity,
    pub plan: Option<ExecutionPlan>,
    pub relay: Option<String>,
    pub detail: Option<String>,
}

impl ExecutionReport {
    pub fn status(&self) -> OpportunityStatus {
        self.opportunity.status
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        self.opportunity.reason
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorStats {
    pub received: u64,
    pub included: u64,
    pub failed: u64,
    pub submitted: u64,
    pub public_submissions: u64,
    pub superseded: u64,
}

/// Why an execution stopped short of inclusion
#[derive(Debug)]
struct Abort {
    status: OpportunityStatus,
    reason: ReasonCode,
    detail: Option<String>,
}

impl Abort {
    fn cancel(reason: ReasonCode, detail: impl ToString) -> Self {
        Self {
            status: OpportunityStatus::Cancelled,
            reason,
            detail: Some(detail.to_string()),
        }
    }

    fn expired(detail: impl ToString) -> Self {
        Self {
            status: OpportunityStatus::Expired,
            reason: ReasonCode::InclusionTimeout,
            detail: Some(detail.to_string()),
        }
    }

    fn reverted(detail: impl ToString) -> Self {
        Self {
            status: OpportunityStatus::Reverted,
            reason: ReasonCode::OnChainRevert,
            detail: Some(detail.to_string()),
        }
    }
}

/// Where a signed transaction went
enum Route {
    Relay(BundleReceipt),
    Public(H256),
}

struct Landing {
    block: u64,
    relay: Option<String>,
}

struct InFlight {
    venues: Vec<Address>,
    expected: I256,
    cancel: watch::Sender<bool>,
}

/// Venue claim of a running execution, released on drop
struct Claim<'a> {
    registry: &'a Mutex<HashMap<Uuid, InFlight>>,
    id: Uuid,
    cancelled: watch::Receiver<bool>,
}

impl Claim<'_> {
    fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}

pub struct Orchestrator {
    settings: RwLock<Arc<Settings>>,
    graph: Arc<MarketGraph>,
    costs: Arc<dyn CostSource>,
    capital: CapitalSelector,
    nonces: Arc<NonceManager>,
    signer: LocalWallet,
    reader: Arc<dyn ChainReader>,
    gas: Arc<GasOracle>,
    relays: Arc<RelayRegistry>,
    events: EventBus,
    in_flight: Mutex<HashMap<Uuid, InFlight>>,
    /// Held from nonce reservation until the transaction resolves
    submission_lane: tokio::sync::Mutex<()>,
    stats: Mutex<OrchestratorStats>,
}

impl Orchestrator {
    pub fn new(config: &StrategyConfig, context: ExecutionContext) -> Self {
        let settings = Settings::from_config(config);
        Self {
            signer: context.signer.with_chain_id(settings.chain_id),
            settings: RwLock::new(Arc::new(settings)),
            graph: context.graph,
            costs: context.costs,
            capital: context.capital,
            nonces: context.nonces,
            reader: context.reader,
            gas: context.gas,
            relays: context.relays,
            events: context.events,
            in_flight: Mutex::new(HashMap::new()),
            submission_lane: tokio::sync::Mutex::new(()),
            stats: Mutex::new(OrchestratorStats::default()),
        }
    }

    /// Applies to executions started after the call
    pub fn reconfigure(&self, config: &StrategyConfig) {
        *self.settings.write() = Arc::new(Settings::from_config(config));
        self.relays.reconfigure(config.relays.registry.clone());
        info!(
            simulate = config.execution.simulate,
            latency_budget_ms = config.execution.latency_budget_ms,
            "orchestrator reconfigured"
        );
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.stats.lock().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Run one opportunity to a terminal state
    pub async fn execute(&self, mut opportunity: Opportunity) -> ExecutionReport {
        let settings = self.settings.read().clone();
        self.stats.lock().received += 1;
        log_execution!(
            "Executing {} over {} hops, expected net {}",
            opportunity.id,
            opportunity.path.hop_count(),
            opportunity.expected_profit()
        );

        let mut report = ExecutionReport {
            opportunity: opportunity.clone(),
            plan: None,
            relay: None,
            detail: None,
        };
        let outcome = self.attempt(&settings, &mut opportunity, &mut report).await;
        let latency_ms = opportunity.elapsed_ms();
        let summary = PathSummary::from(&opportunity.path);
        let expected_profit = opportunity.expected_profit().to_string();

        match outcome {
            Ok(landing) => {
                opportunity.realized_profit = Some(opportunity.expected_profit());
                if let Err(e) = opportunity.finish(OpportunityStatus::Included, ReasonCode::Included) {
                    log_error!("Opportunity {} left in {:?}: {}", opportunity.id, opportunity.status, e);
                }
                self.stats.lock().included += 1;
                log_profit!(
                    "Included {} in block {} via {}: net {}",
                    opportunity.id,
                    landing.block,
                    landing.relay.as_deref().unwrap_or("public mempool"),
                    expected_profit
                );
                self.events.emit(StrategyEvent::ExecutionSucceeded {
                    opportunity_id: opportunity.id,
                    path: summary,
                    expected_profit: expected_profit.clone(),
                    realized_profit: opportunity.realized_profit.map(|p| p.to_string()),
                    tx_hash: opportunity.tx_hash,
                    relay: landing.relay.clone(),
                    latency_ms,
                });
                report.relay = landing.relay;
            }
            Err(abort) => {
                if let Err(e) = opportunity.finish(abort.status, abort.reason) {
                    log_error!("Opportunity {} left in {:?}: {}", opportunity.id, opportunity.status, e);
                }
                {
                    let mut stats = self.stats.lock();
                    stats.failed += 1;
                    if abort.reason == ReasonCode::Superseded {
                        stats.superseded += 1;
                    }
                }
                log_warning!(
                    "Opportunity {} ended {:?} ({:?}): {}",
                    opportunity.id,
                    abort.status,
                    abort.reason,
                    abort.detail.as_deref().unwrap_or("-")
                );
                self.events.emit(StrategyEvent::ExecutionFailed {
                    opportunity_id: opportunity.id,
                    path: summary,
                    status: abort.status,
                    reason: abort.reason,
                    expected_profit,
                    detail: abort.detail.clone(),
                    latency_ms,
                });
                report.detail = abort.detail;
            }
        }
        report.opportunity = opportunity;
        report
    }

    async fn attempt(
        &self,
        settings: &Settings,
        opportunity: &mut Opportunity,
        report: &mut ExecutionReport,
    ) -> Result<Landing, Abort> {
        let execution = &settings.execution;
        self.check_budget(execution, opportunity)?;

        // Never act on the trigger's prices
        let snapshot = self.graph.snapshot();
        let costs = self.costs.cost_model();
        let fresh = settings
            .finder
            .revalidate(&snapshot, &opportunity.path, costs.as_ref())
            .ok_or_else(|| Abort::cancel(ReasonCode::StalePath, "route no longer prices"))?;
        let decimals = snapshot
            .asset(&fresh.start_asset())
            .map(|asset| asset.decimals)
            .ok_or_else(|| Abort::cancel(ReasonCode::StalePath, "start asset left the graph"))?;
        if !fresh.is_profitable() || !settings.profit.clears_floors(&fresh, decimals) {
            return Err(Abort::cancel(
                ReasonCode::BelowProfitFloor,
                format!("re-validated net {}", fresh.net_profit),
            ));
        }
        opportunity
            .revalidated(fresh)
            .map_err(|e| Abort::cancel(ReasonCode::InvariantViolation, e))?;

        let claim = self.claim(opportunity, execution.supersede)?;

        let (plan, priced) = self.plan(settings, opportunity)?;
        if priced.net_profit != opportunity.path.net_profit {
            debug!(net = %priced.net_profit, provider = %plan.provider, "repriced for capital source");
            opportunity.path = priced;
        }
        report.plan = Some(plan.clone());
        if claim.is_cancelled() {
            return Err(Abort::cancel(ReasonCode::Superseded, "superseded before signing"));
        }

        let _lane = self.submission_lane.lock().await;
        if claim.is_cancelled() {
            return Err(Abort::cancel(ReasonCode::Superseded, "superseded while waiting to sign"));
        }
        self.check_budget(execution, opportunity)?;

        let lease = self
            .nonces
            .reserve()
            .await
            .map_err(|e| Abort::cancel(ReasonCode::NonceUnavailable, e))?;
        let raw = self.sign(settings, &plan, &lease).await?;

        let current_block = self
            .reader
            .block_number()
            .await
            .map_err(|e| Abort::cancel(ReasonCode::InvalidPlan, format!("no target block: {e}")))?;
        let target_block = current_block + 1;
        let bundle = BundleBuilder::new(target_block)
            .add_transaction(raw.clone())
            .replacement_uuid(opportunity.id)
            .add_metadata("opportunity", opportunity.id.to_string())
            .add_metadata("provider", plan.provider.clone())
            .build()
            .map_err(|e| Abort::cancel(ReasonCode::InvalidPlan, e))?;
        opportunity.tx_hash = bundle.transaction_hashes().first().copied();

        if execution.simulate {
            self.simulate(&bundle, current_block, &plan).await?;
        }
        if claim.is_cancelled() {
            return Err(Abort::cancel(ReasonCode::Superseded, "superseded before submission"));
        }
        self.check_budget(execution, opportunity)?;

        let (route, lease) = self.submit(execution, &bundle, raw, lease).await?;
        opportunity
            .transition(OpportunityStatus::Submitted)
            .map_err(|e| Abort::cancel(ReasonCode::InvariantViolation, e))?;
        self.stats.lock().submitted += 1;
        if let Route::Relay(receipt) = &route {
            report.relay = Some(receipt.relay.clone());
        }
        self.track(execution, &route, target_block, lease, &claim).await
    }

    fn check_budget(&self, execution: &ExecutionConfig, opportunity: &Opportunity) -> Result<(), Abort> {
        let elapsed = opportunity.elapsed_ms();
        if elapsed > execution.latency_budget_ms {
            return Err(Abort::cancel(
                ReasonCode::LatencyBudgetExceeded,
                format!("{elapsed} ms since detection, budget {} ms", execution.latency_budget_ms),
            ));
        }
        Ok(())
    }

    /// Register the venues of `opportunity`, cancelling or yielding to overlapping work
    fn claim(&self, opportunity: &Opportunity, supersede: bool) -> Result<Claim<'_>, Abort> {
        let venues = opportunity.path.venues();
        let expected = opportunity.expected_profit();
        let mut in_flight = self.in_flight.lock();

        let overlapping: Vec<Uuid> = in_flight
            .iter()
            .filter(|(_, entry)| entry.venues.iter().any(|venue| venues.contains(venue)))
            .map(|(id, _)| *id)
            .collect();
        for id in &overlapping {
            let incumbent = &in_flight[id];
            if !supersede || incumbent.expected >= expected {
                return Err(Abort::cancel(
                    ReasonCode::Superseded,
                    format!("execution {id} already holds a shared venue"),
                ));
            }
        }
        for id in overlapping {
            if let Some(incumbent) = in_flight.get(&id) {
                info!(superseded = %id, by = %opportunity.id, "superseding in-flight execution");
                let _ = incumbent.cancel.send(true);
            }
        }

        let (cancel, cancelled) = watch::channel(false);
        in_flight.insert(
            opportunity.id,
            InFlight {
                venues,
                expected,
                cancel,
            },
        );
        Ok(Claim {
            registry: &self.in_flight,
            id: opportunity.id,
            cancelled,
        })
    }

    /// First capital source, cheapest first, that yields a plan whose guards hold. The
    /// route is repriced with the chosen source's fee and must still clear the floors.
    fn plan(
        &self,
        settings: &Settings,
        opportunity: &Opportunity,
    ) -> Result<(ExecutionPlan, CandidatePath), Abort> {
        let path = &opportunity.path;
        let candidates = self.capital.candidates(path.start_asset(), path.amount_in);
        let Some(cheapest) = candidates.first() else {
            return Err(Abort::cancel(
                ReasonCode::NoCapitalSource,
                format!("no source lends {} of {:?}", path.amount_in, path.start_asset()),
            ));
        };
        // Costing already charged the cheapest source's fee
        let baseline = cheapest.fee;
        let decimals = self
            .graph
            .asset(&path.start_asset())
            .map(|asset| asset.decimals)
            .ok_or_else(|| Abort::cancel(ReasonCode::StalePath, "start asset left the graph"))?;

        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let mut rejected = Vec::new();
        let mut below_floor = 0usize;
        for quote in &candidates {
            let provider = &quote.descriptor.provider;
            let extra = quote.fee.saturating_sub(baseline);
            let priced = if extra.is_zero() {
                path.clone()
            } else {
                match path.with_fee_cost(path.fee_cost.saturating_add(extra)) {
                    Ok(priced) => priced,
                    Err(e) => {
                        rejected.push(format!("{provider}: {e}"));
                        continue;
                    }
                }
            };
            if !settings.profit.clears_floors(&priced, decimals) {
                below_floor += 1;
                rejected.push(format!("{provider}: net {} after fee {}", priced.net_profit, quote.fee));
                continue;
            }
            match settings.builder.build(opportunity.id, &priced, quote, now_secs) {
                Ok(plan) => {
                    debug!(provider = %plan.provider, fee = %plan.loan_fee, "execution plan built");
                    return Ok((plan, priced));
                }
                Err(e) => rejected.push(format!("{provider}: {e}")),
            }
        }
        let reason = if below_floor == candidates.len() {
            ReasonCode::BelowProfitFloor
        } else {
            ReasonCode::InvalidPlan
        };
        Err(Abort::cancel(reason, rejected.join("; ")))
    }

    async fn sign(&self, settings: &Settings, plan: &ExecutionPlan, lease: &NonceLease) -> Result<Bytes, Abort> {
        let quote = self.gas.quote();
        let priority = scale(quote.priority_fee, settings.profit.config().priority_multiplier);
        let max_fee = quote
            .base_fee
            .saturating_mul(U256::from(2u8))
            .saturating_add(priority)
            .max(quote.max_fee_per_gas());

        let request = Eip1559TransactionRequest::new()
            .from(self.signer.address())
            .to(plan.to)
            .data(plan.calldata.clone())
            .gas(plan.gas_limit)
            .nonce(lease.nonce())
            .chain_id(settings.chain_id)
            .max_priority_fee_per_gas(priority)
            .max_fee_per_gas(max_fee);
        let transaction = TypedTransaction::Eip1559(request);
        let signature = self
            .signer
            .sign_transaction(&transaction)
            .await
            .map_err(|e| Abort::cancel(ReasonCode::InvariantViolation, format!("signing failed: {e}")))?;
        Ok(transaction.rlp_signed(&signature))
    }

    async fn simulate(&self, bundle: &Bundle, state_block: u64, plan: &ExecutionPlan) -> Result<(), Abort> {
        let outcome = self
            .relays
            .simulate(bundle, state_block)
            .await
            .map_err(|e| Abort::cancel(ReasonCode::AllRelaysFailed, format!("simulation unavailable: {e}")))?;
        if !outcome.success {
            return Err(Abort::cancel(
                ReasonCode::SimulationReverted,
                outcome.revert_reason.unwrap_or_else(|| "reverted".to_string()),
            ));
        }
        match outcome.returned_amount() {
            Some(output) if output < plan.params.min_repayment => {
                return Err(Abort::cancel(
                    ReasonCode::SimulationBelowMinimum,
                    format!(
                        "simulated output {output} below required {}",
                        plan.params.min_repayment
                    ),
                ));
            }
            Some(_) => {}
            None => debug!("simulation returned no output, relying on the on-chain guards"),
        }
        if outcome.gas_used > plan.gas_limit {
            return Err(Abort::cancel(
                ReasonCode::InvalidPlan,
                format!("simulated gas {} over limit {}", outcome.gas_used, plan.gas_limit),
            ));
        }
        debug!(gas_used = outcome.gas_used, coinbase_diff = %outcome.coinbase_diff, "simulation passed");
        Ok(())
    }

    /// Private relays first; the public mempool only when policy allows it
    async fn submit(
        &self,
        execution: &ExecutionConfig,
        bundle: &Bundle,
        raw: Bytes,
        lease: NonceLease,
    ) -> Result<(Route, Option<NonceLease>), Abort> {
        let report = self.relays.submit(bundle).await;
        for relay in &report.degraded {
            self.events.emit(StrategyEvent::VenueDegraded {
                subject: health_subject(relay),
                class: ErrorClass::Transient,
                detail: "relay circuit opened".to_string(),
            });
        }
        if let Some(receipt) = report.receipt {
            return Ok((Route::Relay(receipt), Some(lease)));
        }

        let refused = report
            .failures
            .iter()
            .map(|(relay, error)| format!("{relay}: {error}"))
            .collect::<Vec<_>>()
            .join("; ");
        if execution.public_fallback != PublicFallback::AfterRelaysFail {
            return Err(Abort::cancel(ReasonCode::AllRelaysFailed, refused));
        }

        log_warning!("All relays refused the bundle, falling back to the public mempool");
        match self.reader.send_raw_transaction(raw).await {
            Ok(hash) => {
                lease.commit();
                self.stats.lock().public_submissions += 1;
                Ok((Route::Public(hash), None))
            }
            Err(e) => {
                drop(lease);
                if e.is_nonce_too_low() {
                    if let Err(resync) = self.nonces.resync().await {
                        log_error!("Nonce resync failed: {}", resync);
                    }
                }
                Err(Abort::cancel(ReasonCode::PublicSubmitFailed, e))
            }
        }
    }

    /// Poll until inclusion, revert, or the block and time bounds pass
    async fn track(
        &self,
        execution: &ExecutionConfig,
        route: &Route,
        target_block: u64,
        lease: Option<NonceLease>,
        claim: &Claim<'_>,
    ) -> Result<Landing, Abort> {
        let last_block = target_block + execution.max_inclusion_blocks;
        let deadline = Instant::now() + Duration::from_millis(execution.max_inclusion_ms);
        let mut poll = interval(Duration::from_millis(execution.inclusion_poll_ms.max(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cancel_sent = false;

        loop {
            poll.tick().await;
            let block = match self.reader.block_number().await {
                Ok(block) => Some(block),
                Err(e) => {
                    debug!(error = %e, "block number unavailable while tracking");
                    None
                }
            };

            if let Some(block) = block {
                match route {
                    Route::Relay(receipt) => match self.relays.inclusion_status(receipt, block).await {
                        Ok(InclusionStatus::Included { block: landed }) => {
                            self.relays.record_outcome(&receipt.relay, true);
                            if let Some(lease) = lease {
                                lease.commit();
                            }
                            return Ok(Landing {
                                block: landed,
                                relay: Some(receipt.relay.clone()),
                            });
                        }
                        Ok(status) => debug!(?status, block, "bundle pending"),
                        Err(e) => debug!(error = %e, "inclusion status unavailable"),
                    },
                    Route::Public(hash) => match self.reader.receipt(*hash).await {
                        Ok(Some(ReceiptStatus::Success { block_number, .. })) => {
                            return Ok(Landing {
                                block: block_number,
                                relay: None,
                            });
                        }
                        Ok(Some(ReceiptStatus::Reverted { block_number })) => {
                            return Err(Abort::reverted(format!("reverted in block {block_number}")));
                        }
                        Ok(None) => {}
                        Err(e) => debug!(error = %e, "receipt unavailable"),
                    },
                }
            }

            if claim.is_cancelled() && !cancel_sent {
                cancel_sent = true;
                if let Route::Relay(receipt) = route {
                    if let Err(e) = self.relays.cancel(receipt).await {
                        debug!(error = %e, "bundle cancellation failed");
                    }
                }
            }

            let blocks_passed = block.is_some_and(|block| block > last_block);
            if blocks_passed || Instant::now() >= deadline {
                if let Route::Relay(receipt) = route {
                    self.relays.record_outcome(&receipt.relay, false);
                }
                return Err(if cancel_sent {
                    Abort::cancel(ReasonCode::Superseded, "cancelled after submission")
                } else {
                    Abort::expired(format!("not included by block {last_block}"))
                });
            }
        }
    }

    /// Executes opportunities until the trigger hangs up
    pub async fn run(
        self: Arc<Self>,
        mut opportunities: mpsc::Receiver<Opportunity>,
        mut config: watch::Receiver<Arc<StrategyConfig>>,
    ) -> OrchestratorStats {
        let limit = Arc::new(Semaphore::new(self.settings.read().execution.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        let mut config_open = true;

        loop {
            tokio::select! {
                next = opportunities.recv() => match next {
                    Some(opportunity) => {
                        let Ok(permit) = limit.clone().acquire_owned().await else {
                            break;
                        };
                        let orchestrator = self.clone();
                        tasks.spawn(async move {
                            let _permit = permit;
                            orchestrator.execute(opportunity).await
                        });
                    }
                    None => break,
                },
                changed = config.changed(), if config_open => match changed {
                    Ok(()) => {
                        let latest = config.borrow_and_update().clone();
                        self.reconfigure(&latest);
                    }
                    Err(_) => config_open = false,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "execution task failed");
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "execution task failed");
            }
        }
        let stats = self.stats();
        info!(received = stats.received, included = stats.included, failed = stats.failed, "orchestrator stopped");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::pathfinder::tests::{addr, cp_edge, triangle, E18};
    use crate::pathfinder::SearchRequest;
    use crate::profit::FlatCosts;
    use mev::{RegistryConfig, RelayError, ScriptedRelay, SimulationOutcome};
    use network::{GasSample, HealthConfig, HealthTracker, StaticChainReader};
    use rust_decimal_macros::dec;
    use types::now_ns;

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    struct Harness {
        orchestrator: Orchestrator,
        graph: Arc<MarketGraph>,
        reader: Arc<StaticChainReader>,
        relay: Arc<ScriptedRelay>,
        nonces: Arc<NonceManager>,
        events: EventBus,
    }

    fn strategy_config() -> StrategyConfig {
        let mut config = StrategyConfig::default();
        config.profit.min_profit_bps = 1;
        config.profit.min_net_profit = dec!(0);
        config.execution.executor_contract = addr(0xee);
        config.execution.max_inclusion_ms = 5_000;
        config.execution.inclusion_poll_ms = 100;
        config
    }

    fn harness(config: &StrategyConfig) -> Harness {
        let graph = Arc::new(triangle());
        let reader = Arc::new(StaticChainReader::new());
        reader.set_block_number(100);
        reader.set_gas(GasSample {
            block_number: 100,
            base_fee: U256::from(30_000_000_000u64),
            priority_fee: U256::from(2_000_000_000u64),
            gas_used: U256::from(15_000_000u64),
            gas_limit: U256::from(30_000_000u64),
        });

        let relay = Arc::new(ScriptedRelay::new("scripted"));
        let health = Arc::new(HealthTracker::new(HealthConfig::default()));
        let mut registry = RelayRegistry::new(RegistryConfig::default(), health);
        registry.register(relay.clone(), 0);

        let signer: LocalWallet = KEY.parse().unwrap();
        let chain: Arc<dyn ChainReader> = reader.clone();
        let nonces = Arc::new(NonceManager::new(signer.address(), chain.clone()));
        let gas = Arc::new(GasOracle::new(config.gas.clone()));
        let events = EventBus::new(64);

        let orchestrator = Orchestrator::new(
            config,
            ExecutionContext {
                graph: graph.clone(),
                costs: Arc::new(FlatCosts::default()),
                capital: CapitalSelector::from_config(&config.capital.providers),
                nonces: nonces.clone(),
                signer,
                reader: chain,
                gas,
                relays: Arc::new(registry),
                events: events.clone(),
            },
        );
        Harness {
            orchestrator,
            graph,
            reader,
            relay,
            nonces,
            events,
        }
    }

    fn opportunity(graph: &MarketGraph) -> Opportunity {
        let config = strategy_config();
        let finder = PathFinder::new(
            config.search.clone(),
            amm::CurveEngine::default(),
            config.sizing.to_sizing(),
            vec![addr(1)],
        );
        let outcome = finder.find(&graph.snapshot(), &SearchRequest::default(), &FlatCosts::default());
        Opportunity::new(outcome.paths[0].clone(), 0.2)
    }

    #[tokio::test(start_paused = true)]
    async fn test_bundle_included_commits_nonce() {
        let h = harness(&strategy_config());
        h.relay.include_at(Some(100));

        let report = h.orchestrator.execute(opportunity(&h.graph)).await;
        assert_eq!(report.status(), OpportunityStatus::Included);
        assert_eq!(report.reason(), Some(ReasonCode::Included));
        assert_eq!(report.relay.as_deref(), Some("scripted"));
        assert_eq!(h.relay.submitted().len(), 1);
        assert_eq!(h.relay.simulated(), 1);
        assert_eq!(h.relay.submitted()[0].target_block, 101);
        assert_eq!(h.nonces.peek_next(), Some(U256::one()));
        assert_eq!(h.events.count("execution_succeeded"), 1);

        let history: Vec<_> = report.opportunity.history.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            history,
            vec![
                OpportunityStatus::Detected,
                OpportunityStatus::Validated,
                OpportunityStatus::Submitted,
                OpportunityStatus::Included
            ]
        );
        assert_eq!(h.orchestrator.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_revert_is_never_submitted() {
        let h = harness(&strategy_config());
        h.relay.set_simulation(SimulationOutcome {
            success: false,
            gas_used: 180_000,
            coinbase_diff: U256::zero(),
            revert_reason: Some("hop 2: insufficient output".to_string()),
            return_data: None,
        });

        let report = h.orchestrator.execute(opportunity(&h.graph)).await;
        assert_eq!(report.status(), OpportunityStatus::Cancelled);
        assert_eq!(report.reason(), Some(ReasonCode::SimulationReverted));
        assert!(h.relay.submitted().is_empty());
        assert!(h.reader.sent_transactions().is_empty());
        // Released lease hands the nonce back
        assert_eq!(h.nonces.peek_next(), Some(U256::zero()));
        assert_eq!(h.events.count("execution_failed"), 1);
    }

    fn word(amount: U256) -> Bytes {
        let mut data = [0u8; 32];
        amount.to_big_endian(&mut data);
        Bytes::from(data.to_vec())
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_output_below_repayment_is_not_submitted() {
        let h = harness(&strategy_config());
        let detected = opportunity(&h.graph);
        // One wei short of repaying the loan
        h.relay.set_simulation(SimulationOutcome {
            success: true,
            gas_used: 200_000,
            coinbase_diff: U256::zero(),
            revert_reason: None,
            return_data: Some(word(detected.path.amount_in - U256::one())),
        });

        let report = h.orchestrator.execute(detected).await;
        assert_eq!(report.status(), OpportunityStatus::Cancelled);
        assert_eq!(report.reason(), Some(ReasonCode::SimulationBelowMinimum));
        assert!(h.relay.submitted().is_empty());
        assert_eq!(h.nonces.peek_next(), Some(U256::zero()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_output_covering_repayment_is_submitted() {
        let h = harness(&strategy_config());
        h.relay.include_at(Some(100));
        let detected = opportunity(&h.graph);
        h.relay.set_simulation(SimulationOutcome {
            success: true,
            gas_used: 200_000,
            coinbase_diff: U256::zero(),
            revert_reason: None,
            return_data: Some(word(detected.path.gross_output)),
        });

        let report = h.orchestrator.execute(detected).await;
        assert_eq!(report.status(), OpportunityStatus::Included);
        assert_eq!(h.relay.submitted().len(), 1);
    }

    fn signed_nonce(raw: &Bytes) -> U256 {
        use ethers::utils::rlp::Rlp;
        let (transaction, _) = TypedTransaction::decode_signed(&Rlp::new(raw)).unwrap();
        *transaction.nonce().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_submissions_are_serialized() {
        let mut config = strategy_config();
        config.execution.latency_budget_ms = 60_000;
        let h = harness(&config);
        // A second triangle through A that shares no venue with the first
        for byte in 4..=5 {
            h.graph.add_asset(types::Asset::new(addr(byte), 18, 137)).unwrap();
        }
        h.graph.upsert_edge(cp_edge(0x20, 1, 4, 1_000 * E18, 1_000 * E18)).unwrap();
        h.graph.upsert_edge(cp_edge(0x21, 4, 5, 1_000 * E18, 1_000 * E18)).unwrap();
        h.graph.upsert_edge(cp_edge(0x22, 5, 1, 1_000 * E18, 1_050 * E18)).unwrap();

        let finder = PathFinder::new(
            config.search.clone(),
            amm::CurveEngine::default(),
            config.sizing.to_sizing(),
            vec![addr(1)],
        );
        let paths = finder
            .find(&h.graph.snapshot(), &SearchRequest::default(), &FlatCosts::default())
            .paths;
        let through = |venue: u8| {
            paths
                .iter()
                .find(|path| path.contains_venue(addr(venue)))
                .cloned()
                .map(|path| Opportunity::new(path, 0.2))
                .unwrap()
        };
        let (first, second) = (through(0x10), through(0x20));

        // Neither bundle lands: the first must expire before the second signs
        let (a, b) = tokio::join!(h.orchestrator.execute(first), h.orchestrator.execute(second));
        assert_eq!(a.status(), OpportunityStatus::Expired);
        assert_eq!(b.status(), OpportunityStatus::Expired);

        let submitted = h.relay.submitted();
        assert_eq!(submitted.len(), 2);
        // The expired lease was handed back and reused instead of stacking N+1
        assert_eq!(signed_nonce(&submitted[0].transactions[0]), U256::zero());
        assert_eq!(signed_nonce(&submitted[1].transactions[0]), U256::zero());
        assert_eq!(h.nonces.peek_next(), Some(U256::zero()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_opportunity_is_cancelled() {
        let h = harness(&strategy_config());
        let mut late = opportunity(&h.graph);
        late.detected_at_ns = now_ns() - 10_000_000_000;
        let report = h.orchestrator.execute(late).await;
        assert_eq!(report.reason(), Some(ReasonCode::LatencyBudgetExceeded));

        let stale = opportunity(&h.graph);
        h.graph
            .upsert_edge(cp_edge(0x12, 3, 1, 1_000 * E18, 1_000 * E18))
            .unwrap();
        let report = h.orchestrator.execute(stale).await;
        assert_eq!(report.status(), OpportunityStatus::Cancelled);
        assert_eq!(report.reason(), Some(ReasonCode::BelowProfitFloor));
        assert!(report.plan.is_none());
        assert_eq!(h.relay.simulated(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capital_falls_through_to_next_source() {
        let mut config = strategy_config();
        // Cheapest provider does not list the start asset
        config.capital.providers[0].assets = vec![addr(9)];
        let h = harness(&config);
        h.relay.include_at(Some(100));

        let report = h.orchestrator.execute(opportunity(&h.graph)).await;
        assert_eq!(report.status(), OpportunityStatus::Included);
        let plan = report.plan.unwrap();
        assert_eq!(plan.provider, "aave");
        assert_eq!(plan.params.provider_kind, crate::config::ProviderKind::AaveV3);
        assert!(plan.params.min_repayment > plan.params.loan_amount);

        let mut config = strategy_config();
        for provider in &mut config.capital.providers {
            provider.assets = vec![addr(9)];
        }
        let h = harness(&config);
        let report = h.orchestrator.execute(opportunity(&h.graph)).await;
        assert_eq!(report.reason(), Some(ReasonCode::NoCapitalSource));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pricier_capital_source_is_charged_in_profit() {
        let mut config = strategy_config();
        // Cheapest provider is listed but cannot produce a valid plan
        config.capital.providers[0].contract = Address::zero();
        let h = harness(&config);
        h.relay.include_at(Some(100));

        let detected = opportunity(&h.graph);
        let before = detected.path.net_profit;
        let report = h.orchestrator.execute(detected).await;
        assert_eq!(report.status(), OpportunityStatus::Included);
        let plan = report.plan.unwrap();
        assert_eq!(plan.provider, "aave");
        assert!(plan.loan_fee > U256::zero());
        let after = report.opportunity.path.net_profit;
        assert_eq!(after, before - I256::from_raw(plan.loan_fee));
        assert_eq!(plan.params.expected_profit, after.unsigned_abs());

        // A fee that eats the whole profit fails the floor instead of executing
        let mut config = strategy_config();
        config.capital.providers[0].contract = Address::zero();
        config.capital.providers[1].fee_bps = 9_000;
        let h = harness(&config);
        let report = h.orchestrator.execute(opportunity(&h.graph)).await;
        assert_eq!(report.status(), OpportunityStatus::Cancelled);
        assert_eq!(report.reason(), Some(ReasonCode::BelowProfitFloor));
        assert!(report.plan.is_none());
        assert!(h.relay.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_public_fallback_after_relays_refuse() {
        let mut config = strategy_config();
        config.execution.public_fallback = PublicFallback::AfterRelaysFail;
        let h = harness(&config);
        h.relay.fail_submissions(Some(RelayError::Rejected {
            relay: "scripted".to_string(),
            method: "eth_sendBundle".to_string(),
            message: "bundle underpriced".to_string(),
        }));

        let report = h.orchestrator.execute(opportunity(&h.graph)).await;
        assert_eq!(h.reader.sent_transactions().len(), 1);
        // No receipt ever appears, so the time bound ends tracking
        assert_eq!(report.status(), OpportunityStatus::Expired);
        assert_eq!(report.reason(), Some(ReasonCode::InclusionTimeout));
        assert_eq!(h.nonces.peek_next(), Some(U256::one()));
        assert_eq!(h.orchestrator.stats().public_submissions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_refusal_without_fallback() {
        let h = harness(&strategy_config());
        h.relay.fail_submissions(Some(RelayError::transport("scripted", "connection reset")));

        let report = h.orchestrator.execute(opportunity(&h.graph)).await;
        assert_eq!(report.reason(), Some(ReasonCode::AllRelaysFailed));
        assert!(h.reader.sent_transactions().is_empty());
        assert_eq!(h.nonces.peek_next(), Some(U256::zero()));
    }

    #[test]
    fn test_more_profitable_execution_supersedes() {
        let h = harness(&strategy_config());
        let mut first = opportunity(&h.graph);
        first.path.net_profit = I256::from(1_000i64);
        let mut second = opportunity(&h.graph);
        second.path.net_profit = I256::from(5_000i64);
        let mut third = opportunity(&h.graph);
        third.path.net_profit = I256::from(2_000i64);

        let incumbent = h.orchestrator.claim(&first, true).unwrap();
        assert!(!incumbent.is_cancelled());
        let better = h.orchestrator.claim(&second, true).unwrap();
        assert!(incumbent.is_cancelled());
        assert!(!better.is_cancelled());

        match h.orchestrator.claim(&third, true) {
            Err(abort) => assert_eq!(abort.reason, ReasonCode::Superseded),
            Ok(_) => panic!("less profitable execution must yield"),
        }

        drop(incumbent);
        drop(better);
        assert_eq!(h.orchestrator.in_flight(), 0);
        let without_supersede = h.orchestrator.claim(&first, false).unwrap();
        assert!(h.orchestrator.claim(&second, false).is_err());
        drop(without_supersede);
    }
}
