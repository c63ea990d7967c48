//! Exhaustive depth-first cycle enumeration
//!
//! Walks simple cycles back to each anchor. No venue and no intermediate asset is
//! visited twice. Used for small graphs and for searches that must include one venue.

use super::{canonical_key, spot_product, CycleLimits};
use amm::CurveEngine;
use state_market::GraphSnapshot;
use std::collections::HashSet;
use types::{Address, DirectedEdge};

pub fn enumerate(
    snapshot: &GraphSnapshot,
    engine: &CurveEngine,
    anchors: &[Address],
    limits: &CycleLimits,
) -> Vec<Vec<DirectedEdge>> {
    let mut walker = Walker {
        snapshot,
        engine,
        limits,
        seen: HashSet::new(),
        cycles: Vec::new(),
        stack: Vec::with_capacity(limits.max_hops),
        visited: HashSet::new(),
    };
    for anchor in anchors {
        if walker.cycles.len() >= limits.max_candidates {
            break;
        }
        walker.visited.clear();
        walker.visited.insert(*anchor);
        walker.walk(*anchor, *anchor);
    }
    walker.cycles
}

struct Walker<'a> {
    snapshot: &'a GraphSnapshot,
    engine: &'a CurveEngine,
    limits: &'a CycleLimits,
    seen: HashSet<Vec<(Address, bool)>>,
    cycles: Vec<Vec<DirectedEdge>>,
    stack: Vec<DirectedEdge>,
    visited: HashSet<Address>,
}

impl Walker<'_> {
    fn walk(&mut self, anchor: Address, current: Address) {
        for directed in self.snapshot.neighbors(&current) {
            if self.cycles.len() >= self.limits.max_candidates {
                return;
            }
            if self.stack.iter().any(|e| e.venue() == directed.venue()) {
                continue;
            }
            let next = directed.asset_out();
            let depth = self.stack.len() + 1;

            if next == anchor {
                if depth >= self.limits.min_hops {
                    self.stack.push(directed.clone());
                    self.accept();
                    self.stack.pop();
                }
                continue;
            }
            if depth >= self.limits.max_hops || self.visited.contains(&next) {
                continue;
            }

            self.visited.insert(next);
            self.stack.push(directed.clone());
            self.walk(anchor, next);
            self.stack.pop();
            self.visited.remove(&next);
        }
    }

    fn accept(&mut self) {
        if let Some(required) = self.limits.required_venue {
            if !self.stack.iter().any(|e| e.venue() == required) {
                return;
            }
        }
        if spot_product(self.engine, &self.stack) < self.limits.min_spot_product {
            return;
        }
        if self.seen.insert(canonical_key(&self.stack)) {
            self.cycles.push(self.stack.clone());
        }
    }
}
