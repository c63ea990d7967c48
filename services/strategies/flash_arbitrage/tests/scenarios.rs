//! End-to-end scenarios across pipeline, trigger, search and execution

use codec::{DeltaPayload, FeedDelta};
use ethers::signers::{LocalWallet, Signer};
use flash_arbitrage::capital::CapitalSelector;
use flash_arbitrage::config::{DropPolicy, PipelineConfig, ProviderKind, SearchConfig, SearchStrategy};
use flash_arbitrage::pipeline::{ChangeSignal, ProcessOutcome};
use flash_arbitrage::{
    EventBus, ExecutionContext, FlatCosts, GasOracle, NonceManager, Orchestrator, PathFinder,
    Pipeline, RawDelta, SearchRequest, SignalQueue, StrategyConfig, Trigger,
};
use mev::{RegistryConfig, RelayRegistry, ScriptedRelay, SimulationOutcome};
use network::{ChainReader, GasSample, HealthConfig, HealthTracker, StaticChainReader};
use proptest::prelude::*;
use rust_decimal_macros::dec;
use state_market::MarketGraph;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use types::{
    Address, Asset, CurveState, Opportunity, OpportunityStatus, ReasonCode, VenueEdge,
    VenueProtocol, I256, U256,
};

const E18: u128 = 1_000_000_000_000_000_000;
const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

fn pool(venue: u8, a: u8, b: u8, r0: u128, r1: u128) -> VenueEdge {
    VenueEdge {
        venue: addr(venue),
        protocol: VenueProtocol::UniswapV2,
        asset0: addr(a),
        asset1: addr(b),
        state: CurveState::ConstantProduct {
            reserve0: U256::from(r0),
            reserve1: U256::from(r1),
        },
        fee_bps: 30,
        gas_estimate: 120_000,
        last_update_ns: 0,
        healthy: true,
    }
}

/// Mispriced A → B → C → A triangle, plus fairly priced pools around it
fn market() -> Arc<MarketGraph> {
    let graph = MarketGraph::new();
    for byte in 1..=5 {
        graph.add_asset(Asset::new(addr(byte), 18, 137)).unwrap();
    }
    graph.upsert_edge(pool(0x10, 1, 2, 1_000 * E18, 1_000 * E18)).unwrap();
    graph.upsert_edge(pool(0x11, 2, 3, 1_000 * E18, 1_000 * E18)).unwrap();
    graph.upsert_edge(pool(0x12, 3, 1, 1_000 * E18, 1_050 * E18)).unwrap();
    graph.upsert_edge(pool(0x13, 1, 4, 2_000 * E18, 2_000 * E18)).unwrap();
    graph.upsert_edge(pool(0x14, 4, 5, 500 * E18, 500 * E18)).unwrap();
    graph.upsert_edge(pool(0x15, 5, 1, 800 * E18, 800 * E18)).unwrap();
    Arc::new(graph)
}

fn strategy_config() -> StrategyConfig {
    let mut config = StrategyConfig::default();
    config.markets.base_assets = vec![addr(1)];
    config.profit.min_profit_bps = 1;
    config.profit.min_net_profit = dec!(0);
    config.trigger.max_risk_score = dec!(1);
    config.pruning.min_liquidity_units = dec!(0);
    config.pruning.min_quality = 0.0;
    config.pruning.max_impact_bps = 10_000;
    config.execution.executor_contract = addr(0xee);
    config.execution.max_inclusion_ms = 5_000;
    config.execution.inclusion_poll_ms = 100;
    config
}

fn best_opportunity(graph: &MarketGraph, config: &StrategyConfig) -> Opportunity {
    let finder = PathFinder::new(
        config.search.clone(),
        amm::CurveEngine::default(),
        config.sizing.to_sizing(),
        vec![addr(1)],
    );
    let outcome = finder.find(&graph.snapshot(), &SearchRequest::default(), &FlatCosts::default());
    Opportunity::new(outcome.paths[0].clone(), 0.2)
}

fn reserves(venue: u8, sequence: u64, r0: u128, r1: u128) -> RawDelta {
    RawDelta::new(
        "scenario",
        FeedDelta {
            venue: addr(venue),
            sequence,
            block_number: 100 + sequence,
            observed_at_ns: sequence,
            payload: DeltaPayload::Reserves {
                reserve0: U256::from(r0),
                reserve1: U256::from(r1),
            },
        },
    )
}

struct Execution {
    orchestrator: Arc<Orchestrator>,
    graph: Arc<MarketGraph>,
    reader: Arc<StaticChainReader>,
    relay: Arc<ScriptedRelay>,
    nonces: Arc<NonceManager>,
}

fn execution(config: &StrategyConfig) -> Execution {
    let graph = market();
    let reader = Arc::new(StaticChainReader::new());
    reader.set_block_number(100);
    reader.set_gas(GasSample {
        block_number: 100,
        base_fee: U256::from(30_000_000_000u64),
        priority_fee: U256::from(2_000_000_000u64),
        gas_used: U256::from(12_000_000u64),
        gas_limit: U256::from(30_000_000u64),
    });

    let relay = Arc::new(ScriptedRelay::new("scripted"));
    let health = Arc::new(HealthTracker::new(HealthConfig::default()));
    let mut registry = RelayRegistry::new(RegistryConfig::default(), health);
    registry.register(relay.clone(), 0);

    let signer: LocalWallet = KEY.parse().unwrap();
    let chain: Arc<dyn ChainReader> = reader.clone();
    let nonces = Arc::new(NonceManager::new(signer.address(), chain.clone()));
    let orchestrator = Orchestrator::new(
        config,
        ExecutionContext {
            graph: graph.clone(),
            costs: Arc::new(FlatCosts::default()),
            capital: CapitalSelector::from_config(&config.capital.providers),
            nonces: nonces.clone(),
            signer,
            reader: chain,
            gas: Arc::new(GasOracle::new(config.gas.clone())),
            relays: Arc::new(registry),
            events: EventBus::new(64),
        },
    );
    Execution {
        orchestrator: Arc::new(orchestrator),
        graph,
        reader,
        relay,
        nonces,
    }
}

#[test]
fn scenario_a_bellman_ford_finds_the_triangle_in_order() {
    let graph = market();
    let snapshot = graph.snapshot();
    let finder = PathFinder::new(
        SearchConfig {
            strategy: SearchStrategy::BellmanFord,
            ..SearchConfig::default()
        },
        amm::CurveEngine::default(),
        strategy_config().sizing.to_sizing(),
        vec![addr(1)],
    );

    let outcome = finder.find(&snapshot, &SearchRequest::default(), &FlatCosts::default());
    assert_eq!(outcome.strategy, SearchStrategy::BellmanFord);
    assert_eq!(outcome.paths.len(), 1, "only the triangle is mispriced");

    let path = &outcome.paths[0];
    assert_eq!(path.start_asset(), addr(1));
    assert_eq!(path.venues(), vec![addr(0x10), addr(0x11), addr(0x12)]);
    assert!(path.net_profit > I256::zero());
    assert!(path.gross_output > path.amount_in);

    // Re-quoting each hop on the same snapshot lands on the same output
    let engine = amm::CurveEngine::default();
    let mut amount = path.amount_in;
    for hop in &path.hops {
        let edge = snapshot.edge(&hop.venue).unwrap();
        amount = engine
            .quote(&edge.state, edge.fee_bps, amount, hop.direction)
            .unwrap()
            .amount_out;
    }
    assert_eq!(amount, path.gross_output);
}

#[tokio::test]
async fn scenario_b_sub_noise_updates_never_reach_the_trigger() {
    let config = strategy_config();
    let graph = market();
    let before = graph.edge(&addr(0x10)).unwrap();

    let queue = Arc::new(SignalQueue::new(16, DropPolicy::DropOldest));
    let pipeline = Arc::new(Pipeline::new(
        PipelineConfig::default(),
        graph.clone(),
        amm::CurveEngine::default(),
        queue.clone(),
    ));
    let trigger = Trigger::new(&config, graph.clone(), Arc::new(FlatCosts::default()), EventBus::new(64));

    let (ingest_tx, ingest_rx) = mpsc::channel(64);
    let (opportunity_tx, mut opportunity_rx) = mpsc::channel(16);
    let (_config_tx, config_rx) = watch::channel(Arc::new(config));
    let pipeline_task = tokio::spawn(pipeline.clone().run(ingest_rx));
    let trigger_task = tokio::spawn(trigger.run(queue.clone(), opportunity_tx, config_rx));

    // One wei of drift on a 1000-token pool
    for sequence in 1..=20u64 {
        let drift = u128::from(sequence % 2);
        ingest_tx
            .send(reserves(0x10, sequence, 1_000 * E18 + drift, 1_000 * E18))
            .await
            .unwrap();
    }
    drop(ingest_tx);
    pipeline_task.await.unwrap();
    let stats = trigger_task.await.unwrap();

    assert_eq!(stats.signals, 0);
    assert_eq!(stats.fires, 0);
    assert!(opportunity_rx.recv().await.is_none());
    let pipeline_stats = pipeline.metrics().stats();
    assert_eq!(pipeline_stats.received, 20);
    assert_eq!(pipeline_stats.filtered, 20);
    assert_eq!(pipeline_stats.emitted, 0);
    assert_eq!(graph.edge(&addr(0x10)).unwrap().state, before.state);
}

#[tokio::test]
async fn scenario_b_real_move_reaches_the_trigger() {
    let config = strategy_config();
    let graph = market();
    let queue = Arc::new(SignalQueue::new(16, DropPolicy::DropOldest));
    let pipeline = Arc::new(Pipeline::new(
        PipelineConfig::default(),
        graph.clone(),
        amm::CurveEngine::default(),
        queue.clone(),
    ));
    let trigger = Trigger::new(&config, graph.clone(), Arc::new(FlatCosts::default()), EventBus::new(64));

    let (ingest_tx, ingest_rx) = mpsc::channel(64);
    let (opportunity_tx, mut opportunity_rx) = mpsc::channel(16);
    let (_config_tx, config_rx) = watch::channel(Arc::new(config));
    let pipeline_task = tokio::spawn(pipeline.clone().run(ingest_rx));
    let trigger_task = tokio::spawn(trigger.run(queue.clone(), opportunity_tx, config_rx));

    // A gets cheaper on 0x10: the cycle through it widens
    ingest_tx
        .send(reserves(0x10, 1, 990 * E18, 1_010 * E18))
        .await
        .unwrap();
    drop(ingest_tx);
    pipeline_task.await.unwrap();
    let stats = trigger_task.await.unwrap();

    assert_eq!(stats.signals, 1);
    assert_eq!(stats.triggered, 1);
    let opportunity = opportunity_rx.recv().await.unwrap();
    assert!(opportunity.path.contains_venue(addr(0x10)));
    assert_eq!(opportunity.status, OpportunityStatus::Detected);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_capital_fallback_still_assembles_a_transaction() {
    let mut config = strategy_config();
    // Balancer does not lend the start asset; Aave does
    config.capital.providers[0].assets = vec![addr(9)];
    let h = execution(&config);
    h.relay.include_at(Some(100));

    let report = h.orchestrator.execute(best_opportunity(&h.graph, &config)).await;
    assert_eq!(report.status(), OpportunityStatus::Included);

    let plan = report.plan.expect("plan built");
    assert_eq!(plan.provider, "aave");
    assert_eq!(plan.params.provider_kind, ProviderKind::AaveV3);
    assert_eq!(plan.to, addr(0xee));
    assert!(!plan.calldata.is_empty());
    assert!(plan.params.min_repayment > plan.params.loan_amount);

    let submitted = h.relay.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].transaction_hashes().first().copied(), report.opportunity.tx_hash);
    assert_eq!(h.nonces.peek_next(), Some(U256::one()));
}

#[tokio::test(start_paused = true)]
async fn scenario_d_simulated_revert_prevents_submission() {
    let config = strategy_config();
    let h = execution(&config);
    h.relay.set_simulation(SimulationOutcome {
        success: false,
        gas_used: 210_000,
        coinbase_diff: U256::zero(),
        revert_reason: Some("insufficient output".to_string()),
        return_data: None,
    });

    let (opportunity_tx, opportunity_rx) = mpsc::channel(4);
    let (_config_tx, config_rx) = watch::channel(Arc::new(config.clone()));
    let runner = tokio::spawn(h.orchestrator.clone().run(opportunity_rx, config_rx));
    opportunity_tx
        .send(best_opportunity(&h.graph, &config))
        .await
        .unwrap();
    drop(opportunity_tx);
    let stats = runner.await.unwrap();

    assert_eq!(stats.received, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.submitted, 0);
    assert_eq!(h.relay.simulated(), 1);
    assert!(h.relay.submitted().is_empty());
    assert!(h.reader.sent_transactions().is_empty());
    assert_eq!(h.nonces.peek_next(), Some(U256::zero()));
}

#[tokio::test(start_paused = true)]
async fn scenario_d_revert_reason_is_recorded() {
    let config = strategy_config();
    let h = execution(&config);
    h.relay.set_simulation(SimulationOutcome {
        success: false,
        gas_used: 210_000,
        coinbase_diff: U256::zero(),
        revert_reason: Some("insufficient output".to_string()),
        return_data: None,
    });

    let report = h.orchestrator.execute(best_opportunity(&h.graph, &config)).await;
    assert_eq!(report.status(), OpportunityStatus::Cancelled);
    assert_eq!(report.reason(), Some(ReasonCode::SimulationReverted));
    assert!(report.detail.unwrap_or_default().contains("insufficient output"));
}

#[test]
fn scenario_e_pipeline_overflow_drops_oldest() {
    let graph = market();
    let queue = Arc::new(SignalQueue::new(4, DropPolicy::DropOldest));
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        graph,
        amm::CurveEngine::default(),
        queue.clone(),
    );

    let mut dropped = Vec::new();
    for sequence in 1..=10u64 {
        // Swing the pool by 2% each time so every delta clears the noise floor
        let (r0, r1) = if sequence % 2 == 1 {
            (990 * E18, 1_010 * E18)
        } else {
            (1_010 * E18, 990 * E18)
        };
        match pipeline.process(reserves(0x10, sequence, r0, r1)) {
            ProcessOutcome::Emitted { dropped: Some(_) } => dropped.push(sequence),
            ProcessOutcome::Emitted { dropped: None } => {}
            other => panic!("delta {} not emitted: {:?}", sequence, other),
        }
        assert!(queue.len() <= queue.capacity());
    }

    assert_eq!(dropped, vec![5, 6, 7, 8, 9, 10]);
    assert_eq!(pipeline.metrics().stats().dropped, 6);
    let kept: Vec<u64> = std::iter::from_fn(|| queue.try_pop()).map(|s| s.sequence).collect();
    assert_eq!(kept, vec![7, 8, 9, 10]);
}

fn signal(index: usize, priority: u64) -> ChangeSignal {
    ChangeSignal {
        venue: addr((index % 200) as u8),
        projected: None,
        priority,
        invalidate_only: false,
        feed: Arc::from("scenario"),
        sequence: index as u64,
        received_at: Instant::now(),
    }
}

proptest! {
    #[test]
    fn scenario_e_drop_oldest_is_exact(capacity in 1usize..16, count in 0usize..64) {
        let queue = SignalQueue::new(capacity, DropPolicy::DropOldest);
        for index in 0..count {
            let dropped = queue.push(signal(index, 1));
            prop_assert!(queue.len() <= capacity);
            match dropped {
                Some(old) => prop_assert_eq!(old.sequence as usize, index - capacity),
                None => prop_assert!(index < capacity),
            }
        }
        let kept: Vec<usize> = std::iter::from_fn(|| queue.try_pop()).map(|s| s.sequence as usize).collect();
        let expected: Vec<usize> = (count.saturating_sub(capacity)..count).collect();
        prop_assert_eq!(kept, expected);
    }

    #[test]
    fn scenario_e_drop_lowest_priority_is_exact(
        capacity in 1usize..12,
        priorities in prop::collection::vec(0u64..8, 0..48),
    ) {
        let queue = SignalQueue::new(capacity, DropPolicy::DropLowestPriority);
        // Mirror of the queue: (priority, sequence) in arrival order
        let mut model: Vec<(u64, usize)> = Vec::new();
        for (index, &priority) in priorities.iter().enumerate() {
            let dropped = queue.push(signal(index, priority));
            prop_assert!(queue.len() <= capacity);

            if model.len() < capacity {
                prop_assert!(dropped.is_none());
                model.push((priority, index));
                continue;
            }
            let (victim, &(lowest, victim_seq)) = model
                .iter()
                .enumerate()
                .min_by_key(|(position, (p, _))| (*p, *position))
                .unwrap();
            let dropped = dropped.expect("full queue drops something");
            if priority < lowest {
                prop_assert_eq!(dropped.sequence as usize, index);
            } else {
                prop_assert_eq!(dropped.sequence as usize, victim_seq);
                model.remove(victim);
                model.push((priority, index));
            }
        }
        let kept: Vec<usize> = std::iter::from_fn(|| queue.try_pop()).map(|s| s.sequence as usize).collect();
        let expected: Vec<usize> = model.iter().map(|(_, sequence)| *sequence).collect();
        prop_assert_eq!(kept, expected);
    }
}
