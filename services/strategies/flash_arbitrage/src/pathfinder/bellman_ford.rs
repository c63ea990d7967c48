//! Negative-cycle detection on `-ln(spot rate)` weights
//!
//! A cycle whose spot rates multiply to more than one has negative total weight. After
//! `|V| - 1` relaxation rounds, any edge that still relaxes leads back into such a cycle
//! through the predecessor chain.

use super::{canonical_key, spot_product, CycleLimits};
use amm::CurveEngine;
use state_market::GraphSnapshot;
use std::collections::{HashMap, HashSet};
use types::{Address, DirectedEdge};

struct WeightedEdge {
    from: usize,
    to: usize,
    weight: f64,
    directed: DirectedEdge,
}

pub fn enumerate(
    snapshot: &GraphSnapshot,
    engine: &CurveEngine,
    limits: &CycleLimits,
) -> Vec<Vec<DirectedEdge>> {
    let assets = snapshot.active_assets();
    let index: HashMap<Address, usize> = assets
        .iter()
        .enumerate()
        .map(|(i, asset)| (*asset, i))
        .collect();

    let mut edges = Vec::new();
    for asset in &assets {
        for directed in snapshot.neighbors(asset) {
            let rate = engine.spot_rate(&directed.edge.state, directed.edge.fee_bps, directed.direction);
            if !(rate.is_finite() && rate > 0.0) {
                continue;
            }
            let (Some(&from), Some(&to)) = (index.get(&directed.asset_in()), index.get(&directed.asset_out()))
            else {
                continue;
            };
            edges.push(WeightedEdge {
                from,
                to,
                weight: -rate.ln(),
                directed: directed.clone(),
            });
        }
    }

    let n = assets.len();
    if n < 2 || edges.is_empty() {
        return Vec::new();
    }

    // Virtual source at distance zero to every vertex
    let mut dist = vec![0.0f64; n];
    let mut pred: Vec<Option<usize>> = vec![None; n];
    for _ in 0..n - 1 {
        let mut changed = false;
        for (i, edge) in edges.iter().enumerate() {
            let candidate = dist[edge.from] + edge.weight;
            if candidate < dist[edge.to] - f64::EPSILON {
                dist[edge.to] = candidate;
                pred[edge.to] = Some(i);
                changed = true;
            }
        }
        if !changed {
            return Vec::new();
        }
    }

    let mut seen: HashSet<Vec<(Address, bool)>> = HashSet::new();
    let mut cycles = Vec::new();
    for edge in &edges {
        if cycles.len() >= limits.max_candidates {
            break;
        }
        if dist[edge.from] + edge.weight >= dist[edge.to] - f64::EPSILON {
            continue;
        }
        let Some(cycle) = extract_cycle(&edges, &pred, edge.to, n) else {
            continue;
        };
        if cycle.len() < limits.min_hops || cycle.len() > limits.max_hops {
            continue;
        }
        let distinct: HashSet<Address> = cycle.iter().map(DirectedEdge::venue).collect();
        if distinct.len() != cycle.len() {
            continue;
        }
        if let Some(required) = limits.required_venue {
            if !distinct.contains(&required) {
                continue;
            }
        }
        if spot_product(engine, &cycle) < limits.min_spot_product {
            continue;
        }
        if seen.insert(canonical_key(&cycle)) {
            cycles.push(cycle);
        }
    }
    cycles
}

fn extract_cycle(
    edges: &[WeightedEdge],
    pred: &[Option<usize>],
    start: usize,
    n: usize,
) -> Option<Vec<DirectedEdge>> {
    // Step back n times so the vertex is on the cycle, not on a tail leading into it
    let mut vertex = start;
    for _ in 0..n {
        vertex = edges[pred[vertex]?].from;
    }

    let anchor = vertex;
    let mut cycle = Vec::new();
    loop {
        let edge = &edges[pred[vertex]?];
        cycle.push(edge.directed.clone());
        vertex = edge.from;
        if vertex == anchor || cycle.len() > n {
            break;
        }
    }
    if vertex != anchor {
        return None;
    }
    cycle.reverse();
    Some(cycle)
}
