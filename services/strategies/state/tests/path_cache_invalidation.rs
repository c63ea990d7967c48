//! Property tests for venue invalidation

use proptest::prelude::*;
use state_market::{PathCache, PathCacheConfig};
use std::collections::HashSet;
use types::{Address, CandidatePath, Direction, Hop, VenueProtocol, U256};

fn cycle(venues: &[u8]) -> CandidatePath {
    let n = venues.len();
    let hops = venues
        .iter()
        .enumerate()
        .map(|(i, venue)| {
            let asset_in = (i as u8) + 1;
            let asset_out = if i + 1 == n { 1 } else { asset_in + 1 };
            Hop {
                venue: Address::repeat_byte(*venue),
                protocol: VenueProtocol::UniswapV2,
                asset_in: Address::repeat_byte(asset_in),
                asset_out: Address::repeat_byte(asset_out),
                direction: Direction::ZeroForOne,
                amount_in: U256::from(1_000u64 + i as u64),
                amount_out: U256::from(1_001u64 + i as u64),
                fee_bps: 30,
                gas_estimate: 100_000,
                price_impact_bps: 1,
            }
        })
        .collect();
    CandidatePath::from_hops(hops, U256::zero(), U256::zero(), 0).unwrap()
}

fn venue_lists() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(0x10u8..0x18, 2..=4), 1..40)
}

proptest! {
    #[test]
    fn invalidation_removes_exactly_touching_entries(
        lists in venue_lists(),
        target in 0x10u8..0x18,
    ) {
        let mut cache = PathCache::new(PathCacheConfig {
            capacity: 10_000,
            ttl_ms: 60_000,
            min_score: 0,
        });
        let mut keys = HashSet::new();
        for venues in &lists {
            let path = cycle(venues);
            keys.insert(path.key());
            prop_assert!(cache.put(path, true));
        }
        let target = Address::repeat_byte(target);
        let touching: HashSet<_> = keys
            .iter()
            .filter(|key| key.venues.contains(&target))
            .cloned()
            .collect();

        let removed = cache.invalidate_by_venue(&target);
        let removed_keys: HashSet<_> = removed.iter().map(|p| p.key()).collect();

        prop_assert_eq!(&removed_keys, &touching);
        prop_assert_eq!(removed.len(), touching.len());
        prop_assert_eq!(cache.len(), keys.len() - touching.len());
        for key in keys.difference(&touching) {
            prop_assert!(cache.contains(key));
        }

        // Second invalidation of the same venue is a no-op
        prop_assert!(cache.invalidate_by_venue(&target).is_empty());
        prop_assert_eq!(cache.len(), keys.len() - touching.len());
    }
}
