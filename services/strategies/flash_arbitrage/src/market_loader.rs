//! Market bootstrap
//!
//! Registers the configured assets and venues in the market graph before any feed
//! connects. Constant-product venues are seeded with reserves read from chain; every
//! other venue starts with an empty state and becomes tradable on its first feed delta.

use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};
use network::ChainReader;
use serde::Serialize;
use state_market::MarketGraph;
use std::path::Path;
use tracing::{debug, warn};
use types::{now_ns, Asset, CurveKind, CurveState, VenueEdge, U256};

use crate::config::{MarketsConfig, VenueEntry};
use crate::log_success;

/// Concurrent reserve reads during bootstrap
const RESERVE_FETCH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub assets: usize,
    pub venues: usize,
    /// Venues whose reserves came from chain
    pub seeded: usize,
    /// Venues waiting for their first feed delta
    pub awaiting_feed: usize,
}

/// Venue list kept outside the main configuration file
pub fn load_venue_file(path: &Path) -> Result<Vec<VenueEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read venue file {}", path.display()))?;
    let venues: Vec<VenueEntry> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse venue file {}", path.display()))?;
    debug!("Read {} venues from {:?}", venues.len(), path);
    Ok(venues)
}

/// State a venue starts with before any observation
fn empty_state(kind: CurveKind) -> CurveState {
    match kind {
        CurveKind::ConstantProduct => CurveState::ConstantProduct {
            reserve0: U256::zero(),
            reserve1: U256::zero(),
        },
        CurveKind::StableSwap => CurveState::StableSwap {
            balance0: U256::zero(),
            balance1: U256::zero(),
            amplification: U256::one(),
            precision0: U256::one(),
            precision1: U256::one(),
        },
        CurveKind::Concentrated => CurveState::Concentrated {
            sqrt_price_x96: U256::zero(),
            liquidity: 0,
            tick: 0,
            sqrt_price_lower_x96: U256::zero(),
            sqrt_price_upper_x96: U256::zero(),
        },
    }
}

fn edge_for(entry: &VenueEntry, state: CurveState) -> VenueEdge {
    VenueEdge {
        venue: entry.address,
        protocol: entry.protocol,
        asset0: entry.asset0,
        asset1: entry.asset1,
        state,
        fee_bps: entry.fee_bps,
        gas_estimate: entry.gas_estimate,
        last_update_ns: now_ns(),
        healthy: true,
    }
}

/// Register assets and venues; reserve reads are skipped when `reader` is `None`
pub async fn load_markets(
    graph: &MarketGraph,
    markets: &MarketsConfig,
    reader: Option<&dyn ChainReader>,
) -> Result<LoadReport> {
    let mut report = LoadReport::default();
    for entry in &markets.assets {
        graph
            .add_asset(Asset::new(entry.address, entry.decimals, markets.chain_id))
            .with_context(|| format!("Failed to register asset {:?}", entry.address))?;
        report.assets += 1;
    }

    let states: Vec<(usize, CurveState)> = stream::iter(0..markets.venues.len())
        .map(|index| {
            let entry = &markets.venues[index];
            async move {
            let kind = entry.protocol.curve_kind();
            let state = match (kind, reader) {
                (CurveKind::ConstantProduct, Some(reader)) => match reader.reserves(entry.address).await {
                    Ok((reserve0, reserve1)) => CurveState::ConstantProduct { reserve0, reserve1 },
                    Err(e) => {
                        warn!("Reserves for {:?} unavailable, waiting for feed: {}", entry.address, e);
                        empty_state(kind)
                    }
                },
                _ => empty_state(kind),
            };
            (index, state)
            }
        })
        .buffer_unordered(RESERVE_FETCH_CONCURRENCY)
        .collect()
        .await;

    let mut states = states;
    states.sort_by_key(|(index, _)| *index);
    for (index, state) in states {
        let entry = &markets.venues[index];
        if state.is_empty() {
            report.awaiting_feed += 1;
        } else {
            report.seeded += 1;
        }
        graph
            .upsert_edge(edge_for(entry, state))
            .with_context(|| format!("Failed to register venue {:?}", entry.address))?;
        report.venues += 1;
    }

    log_success!(
        "Market graph loaded: {} assets, {} venues ({} seeded, {} awaiting feed)",
        report.assets,
        report.venues,
        report.seeded,
        report.awaiting_feed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssetEntry;
    use network::StaticChainReader;
    use types::{Address, VenueProtocol};

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn venue(byte: u8, protocol: VenueProtocol, a: u8, b: u8) -> VenueEntry {
        VenueEntry {
            address: addr(byte),
            protocol,
            asset0: addr(a),
            asset1: addr(b),
            fee_bps: 30,
            gas_estimate: 120_000,
        }
    }

    fn markets() -> MarketsConfig {
        MarketsConfig {
            assets: (1..=3)
                .map(|byte| AssetEntry {
                    address: addr(byte),
                    decimals: 18,
                    symbol: None,
                })
                .collect(),
            venues: vec![
                venue(0x10, VenueProtocol::UniswapV2, 1, 2),
                venue(0x11, VenueProtocol::QuickswapV2, 2, 3),
                venue(0x12, VenueProtocol::UniswapV3, 3, 1),
                venue(0x13, VenueProtocol::CurveStable, 1, 3),
            ],
            ..MarketsConfig::default()
        }
    }

    #[tokio::test]
    async fn test_seeds_constant_product_reserves() {
        let reader = StaticChainReader::new();
        reader.set_reserves(addr(0x10), (U256::from(1_000u64), U256::from(2_000u64)));
        // 0x11 has no reserves on chain and waits for the feed

        let graph = MarketGraph::new();
        let report = load_markets(&graph, &markets(), Some(&reader)).await.unwrap();
        assert_eq!(report.assets, 3);
        assert_eq!(report.venues, 4);
        assert_eq!(report.seeded, 1);
        assert_eq!(report.awaiting_feed, 3);

        let seeded = graph.edge(&addr(0x10)).unwrap();
        assert_eq!(
            seeded.state,
            CurveState::ConstantProduct {
                reserve0: U256::from(1_000u64),
                reserve1: U256::from(2_000u64)
            }
        );
        assert_eq!(graph.edge(&addr(0x12)).unwrap().curve_kind(), CurveKind::Concentrated);
        assert_eq!(graph.edge(&addr(0x13)).unwrap().curve_kind(), CurveKind::StableSwap);
    }

    #[tokio::test]
    async fn test_unknown_asset_is_an_error() {
        let mut config = markets();
        config.venues.push(venue(0x14, VenueProtocol::UniswapV2, 1, 9));
        let graph = MarketGraph::new();
        assert!(load_markets(&graph, &config, None).await.is_err());
    }

    #[test]
    fn test_venue_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("venues.json");
        let venues = markets().venues;
        std::fs::write(&path, serde_json::to_string(&venues).unwrap()).unwrap();
        assert_eq!(load_venue_file(&path).unwrap(), venues);
        assert!(load_venue_file(&dir.path().join("missing.json")).is_err());
    }
}
