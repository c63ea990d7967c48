//! Hop-by-hop cycle pricing and sizing

use crate::profit::CostModel;
use amm::{AmmError, AmmResult, CurveEngine, SizingConfig, TradeSizer};
use state_market::GraphSnapshot;
use std::collections::HashMap;
use types::{Address, CandidatePath, DirectedEdge, Hop, I256, U256};

/// Rotate a cycle so it starts at a base asset; any start is fine when none are set
pub fn rotate_to_base(edges: &[DirectedEdge], base_assets: &[Address]) -> Option<Vec<DirectedEdge>> {
    if edges.is_empty() {
        return None;
    }
    let start = if base_assets.is_empty() {
        0
    } else {
        edges
            .iter()
            .position(|edge| base_assets.contains(&edge.asset_in()))?
    };
    let mut rotated = edges[start..].to_vec();
    rotated.extend_from_slice(&edges[..start]);
    Some(rotated)
}

/// Price `amount_in` through each edge in order, feeding each output into the next hop.
///
/// Fails on the first hop that cannot price, is unsafe or returns nothing.
pub fn price_hops(engine: &CurveEngine, edges: &[DirectedEdge], amount_in: U256) -> AmmResult<Vec<Hop>> {
    let mut hops = Vec::with_capacity(edges.len());
    let mut amount = amount_in;
    for directed in edges {
        let edge = &directed.edge;
        let quote = engine.quote(&edge.state, edge.fee_bps, amount, directed.direction)?;
        if quote.is_unsafe {
            return Err(AmmError::InsufficientLiquidity {
                requested: amount.to_string(),
                available: "exceeds safe reserve fraction".to_string(),
            });
        }
        if quote.amount_out.is_zero() {
            return Err(AmmError::ZeroInput);
        }
        hops.push(Hop {
            venue: edge.venue,
            protocol: edge.protocol,
            asset_in: directed.asset_in(),
            asset_out: directed.asset_out(),
            direction: directed.direction,
            amount_in: amount,
            amount_out: quote.amount_out,
            fee_bps: edge.fee_bps,
            gas_estimate: edge.gas_estimate,
            price_impact_bps: quote.price_impact_bps,
        });
        amount = quote.amount_out;
    }
    Ok(hops)
}

fn signed(value: U256) -> Option<I256> {
    (!value.bit(255)).then(|| I256::from_raw(value))
}

fn net_of(hops: &[Hop], gas_cost: U256, fee_cost: U256) -> Option<I256> {
    let first = hops.first()?;
    let last = hops.last()?;
    let costs = gas_cost.checked_add(fee_cost)?;
    signed(last.amount_out)?
        .checked_sub(signed(first.amount_in)?)?
        .checked_sub(signed(costs)?)
}

/// Size and price a closed cycle at the net-profit-maximizing input
pub fn price_cycle(
    engine: &CurveEngine,
    sizing: &SizingConfig,
    snapshot: &GraphSnapshot,
    edges: &[DirectedEdge],
    costs: &dyn CostModel,
    priced_at_ns: u64,
) -> Option<CandidatePath> {
    let first = edges.first()?;
    let max_input = engine
        .max_safe_input(&first.edge.state, first.direction)
        .ok()?;

    let sizer = TradeSizer::new(sizing.clone());
    let sized = sizer.maximize(max_input, |amount| {
        let hops = price_hops(engine, edges, amount).ok()?;
        let path_costs = costs.costs(snapshot, &hops)?;
        net_of(&hops, path_costs.gas_cost, path_costs.fee_cost)
    })?;

    let hops = price_hops(engine, edges, sized.amount_in).ok()?;
    let path_costs = costs.costs(snapshot, &hops)?;
    CandidatePath::from_hops(hops, path_costs.gas_cost, path_costs.fee_cost, priced_at_ns).ok()
}

/// Keep the best-ranked path per venue set
pub fn dedup_by_signature(paths: Vec<CandidatePath>) -> Vec<CandidatePath> {
    let mut best: HashMap<Vec<Address>, CandidatePath> = HashMap::new();
    for path in paths {
        let signature = path.venue_signature();
        match best.get(&signature) {
            Some(existing) if existing.rank_cmp(&path).is_le() => {}
            _ => {
                best.insert(signature, path);
            }
        }
    }
    let mut paths: Vec<CandidatePath> = best.into_values().collect();
    types::rank_paths(&mut paths);
    paths
}
