//! Breadth-first beam search
//!
//! Expands partial walks level by level from each anchor and keeps only the
//! `beam_width` walks with the best cumulative log spot rate at each level.

use super::{canonical_key, spot_product, CycleLimits};
use amm::CurveEngine;
use state_market::GraphSnapshot;
use std::collections::HashSet;
use types::{Address, DirectedEdge};

#[derive(Clone)]
struct Partial {
    edges: Vec<DirectedEdge>,
    current: Address,
    log_rate: f64,
}

pub fn enumerate(
    snapshot: &GraphSnapshot,
    engine: &CurveEngine,
    anchors: &[Address],
    limits: &CycleLimits,
    beam_width: usize,
) -> Vec<Vec<DirectedEdge>> {
    let mut seen: HashSet<Vec<(Address, bool)>> = HashSet::new();
    let mut cycles = Vec::new();

    for anchor in anchors {
        let mut frontier = vec![Partial {
            edges: Vec::new(),
            current: *anchor,
            log_rate: 0.0,
        }];

        for depth in 1..=limits.max_hops {
            let mut next_frontier = Vec::new();
            for partial in &frontier {
                for directed in snapshot.neighbors(&partial.current) {
                    if partial.edges.iter().any(|e| e.venue() == directed.venue()) {
                        continue;
                    }
                    let rate = engine.spot_rate(&directed.edge.state, directed.edge.fee_bps, directed.direction);
                    if !(rate.is_finite() && rate > 0.0) {
                        continue;
                    }
                    let next = directed.asset_out();
                    let mut edges = partial.edges.clone();
                    edges.push(directed.clone());

                    if next == *anchor {
                        let eligible = depth >= limits.min_hops
                            && limits
                                .required_venue
                                .map_or(true, |venue| edges.iter().any(|e| e.venue() == venue))
                            && spot_product(engine, &edges) >= limits.min_spot_product;
                        if eligible && seen.insert(canonical_key(&edges)) {
                            cycles.push(edges);
                            if cycles.len() >= limits.max_candidates {
                                return cycles;
                            }
                        }
                        continue;
                    }
                    let revisits = partial.edges.iter().any(|e| e.asset_in() == next);
                    if revisits || depth >= limits.max_hops {
                        continue;
                    }
                    next_frontier.push(Partial {
                        edges,
                        current: next,
                        log_rate: partial.log_rate + rate.ln(),
                    });
                }
            }
            next_frontier.sort_by(|a, b| b.log_rate.total_cmp(&a.log_rate));
            next_frontier.truncate(beam_width.max(1));
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }
    }
    cycles
}
