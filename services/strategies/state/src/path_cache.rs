//! Path Cache
//!
//! Bounded store of profitable paths, indexed by every venue a path touches so that a
//! venue update invalidates exactly the affected entries. Entries expire after a TTL;
//! once expired entries are gone, least-recently-used entries are evicted to stay within
//! capacity.
//!
//! The cache is owned by the trigger task and takes `&mut self`; it holds no locks.
//! Time comes from `tokio::time::Instant` so tests can drive expiry with a paused clock.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};
use types::{rank_paths, Address, CandidatePath, PathKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathCacheConfig {
    pub capacity: usize,
    pub ttl_ms: u64,
    /// Paths must score strictly above this to be cached
    pub min_score: i64,
}

impl Default for PathCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ttl_ms: 2_000,
            min_score: 0,
        }
    }
}

impl PathCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub inserted: u64,
    pub rejected: u64,
    pub expired: u64,
    pub evicted: u64,
    pub invalidated: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    path: CandidatePath,
    expires_at: Instant,
    tick: u64,
}

#[derive(Debug)]
pub struct PathCache {
    config: PathCacheConfig,
    entries: HashMap<PathKey, CacheEntry>,
    by_venue: HashMap<Address, HashSet<PathKey>>,
    by_start: HashMap<Address, HashSet<PathKey>>,
    /// LRU order: lowest tick is least recently used
    lru: BTreeMap<u64, PathKey>,
    tick: u64,
    stats: PathCacheStats,
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new(PathCacheConfig::default())
    }
}

impl PathCache {
    pub fn new(config: PathCacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            by_venue: HashMap::new(),
            by_start: HashMap::new(),
            lru: BTreeMap::new(),
            tick: 0,
            stats: PathCacheStats::default(),
        }
    }

    pub fn config(&self) -> &PathCacheConfig {
        &self.config
    }

    /// Apply new limits; shrinking capacity evicts immediately
    pub fn reconfigure(&mut self, config: PathCacheConfig) {
        self.config = config;
        self.purge_expired();
        self.evict_over_capacity();
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Unexpired paths starting at `start_asset`, best first
    pub fn get(&mut self, start_asset: &Address) -> Vec<CandidatePath> {
        self.purge_expired();

        let keys: Vec<PathKey> = match self.by_start.get(start_asset) {
            Some(keys) => keys.iter().cloned().collect(),
            None => {
                self.stats.misses += 1;
                return Vec::new();
            }
        };

        let mut paths = Vec::with_capacity(keys.len());
        for key in keys {
            let tick = self.next_tick();
            if let Some(entry) = self.entries.get_mut(&key) {
                self.lru.remove(&entry.tick);
                entry.tick = tick;
                self.lru.insert(tick, key);
                paths.push(entry.path.clone());
            }
        }

        if paths.is_empty() {
            self.stats.misses += 1;
        } else {
            self.stats.hits += 1;
        }
        rank_paths(&mut paths);
        paths
    }

    /// Store a profitable path; returns false when it was rejected by the score floor
    pub fn put(&mut self, path: CandidatePath, is_profitable: bool) -> bool {
        if !is_profitable || path.score <= self.config.min_score {
            self.stats.rejected += 1;
            trace!(score = path.score, "path below cache floor");
            return false;
        }

        let key = path.key();
        self.remove(&key);
        self.purge_expired();

        let tick = self.next_tick();
        for venue in path.venues() {
            self.by_venue.entry(venue).or_default().insert(key.clone());
        }
        self.by_start
            .entry(key.start_asset)
            .or_default()
            .insert(key.clone());
        self.lru.insert(tick, key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                path,
                expires_at: Instant::now() + self.config.ttl(),
                tick,
            },
        );
        self.stats.inserted += 1;

        self.evict_over_capacity();
        true
    }

    /// Remove every entry touching `venue` and hand the paths back for re-validation
    pub fn invalidate_by_venue(&mut self, venue: &Address) -> Vec<CandidatePath> {
        let keys = match self.by_venue.remove(venue) {
            Some(keys) => keys,
            None => return Vec::new(),
        };

        let removed: Vec<CandidatePath> = keys
            .iter()
            .filter_map(|key| self.remove(key))
            .map(|entry| entry.path)
            .collect();

        self.stats.invalidated += removed.len() as u64;
        if !removed.is_empty() {
            debug!(venue = ?venue, removed = removed.len(), "cache entries invalidated");
        }
        removed
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<PathKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        self.stats.expired += expired.len() as u64;
        expired.len()
    }

    fn evict_over_capacity(&mut self) {
        while self.entries.len() > self.config.capacity {
            let key = match self.lru.iter().next() {
                Some((_, key)) => key.clone(),
                None => break,
            };
            self.remove(&key);
            self.stats.evicted += 1;
        }
    }

    fn remove(&mut self, key: &PathKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(&entry.tick);
        for venue in entry.path.venues() {
            if let Some(keys) = self.by_venue.get_mut(&venue) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_venue.remove(&venue);
                }
            }
        }
        if let Some(keys) = self.by_start.get_mut(&key.start_asset) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_start.remove(&key.start_asset);
            }
        }
        Some(entry)
    }

    pub fn contains(&self, key: &PathKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Venues with at least one cached path
    pub fn indexed_venues(&self) -> usize {
        self.by_venue.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> PathCacheStats {
        PathCacheStats {
            entries: self.entries.len(),
            ..self.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{Direction, Hop, VenueProtocol, U256};

    fn hop(venue: u8, asset_in: u8, asset_out: u8, amount_in: u64, amount_out: u64) -> Hop {
        Hop {
            venue: Address::repeat_byte(venue),
            protocol: VenueProtocol::UniswapV2,
            asset_in: Address::repeat_byte(asset_in),
            asset_out: Address::repeat_byte(asset_out),
            direction: Direction::ZeroForOne,
            amount_in: U256::from(amount_in),
            amount_out: U256::from(amount_out),
            fee_bps: 30,
            gas_estimate: 100_000,
            price_impact_bps: 5,
        }
    }

    /// Two-hop cycle 1 -> 2 -> 1 through venues `a` and `b`
    fn path(a: u8, b: u8, output: u64) -> CandidatePath {
        CandidatePath::from_hops(
            vec![hop(a, 1, 2, 1_000, 2_000), hop(b, 2, 1, 2_000, output)],
            U256::zero(),
            U256::zero(),
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_put_respects_floor() {
        let mut cache = PathCache::new(PathCacheConfig {
            min_score: 10_000,
            ..Default::default()
        });
        assert!(!cache.put(path(0x10, 0x11, 1_005), true));
        assert!(!cache.put(path(0x10, 0x11, 1_100), false));
        assert!(cache.put(path(0x10, 0x11, 1_100), true));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().rejected, 2);
    }

    #[test]
    fn test_get_returns_ranked_paths() {
        let mut cache = PathCache::default();
        cache.put(path(0x10, 0x11, 1_050), true);
        cache.put(path(0x12, 0x13, 1_200), true);

        let paths = cache.get(&Address::repeat_byte(1));
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].gross_output, U256::from(1_200u64));
        assert!(cache.get(&Address::repeat_byte(2)).is_empty());
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_invalidate_by_venue_is_exact_and_idempotent() {
        let mut cache = PathCache::default();
        cache.put(path(0x10, 0x11, 1_050), true);
        cache.put(path(0x10, 0x12, 1_060), true);
        cache.put(path(0x13, 0x14, 1_070), true);

        let removed = cache.invalidate_by_venue(&Address::repeat_byte(0x10));
        assert_eq!(removed.len(), 2);
        assert!(removed
            .iter()
            .all(|p| p.contains_venue(Address::repeat_byte(0x10))));
        assert_eq!(cache.len(), 1);
        assert!(cache
            .invalidate_by_venue(&Address::repeat_byte(0x10))
            .is_empty());
        assert!(cache
            .invalidate_by_venue(&Address::repeat_byte(0x99))
            .is_empty());
        // Sibling venue index must not keep dangling keys
        assert_eq!(cache.indexed_venues(), 2);
    }

    #[test]
    fn test_lru_eviction_over_capacity() {
        let mut cache = PathCache::new(PathCacheConfig {
            capacity: 2,
            ..Default::default()
        });
        let oldest = path(0x10, 0x11, 1_050);
        cache.put(oldest.clone(), true);
        cache.put(path(0x12, 0x13, 1_060), true);
        cache.put(path(0x14, 0x15, 1_070), true);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&oldest.key()));
        assert_eq!(cache.stats().evicted, 1);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let mut cache = PathCache::new(PathCacheConfig {
            capacity: 2,
            ..Default::default()
        });
        let first = path(0x10, 0x11, 1_050);
        let second = path(0x12, 0x13, 1_060);
        cache.put(first.clone(), true);
        cache.put(second.clone(), true);
        // Touch both, then reinsert second so first becomes least recent
        cache.get(&Address::repeat_byte(1));
        cache.put(second.clone(), true);
        cache.put(path(0x14, 0x15, 1_070), true);

        assert!(!cache.contains(&first.key()));
        assert!(cache.contains(&second.key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_and_purge() {
        let mut cache = PathCache::new(PathCacheConfig {
            ttl_ms: 100,
            ..Default::default()
        });
        cache.put(path(0x10, 0x11, 1_050), true);
        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(cache.get(&Address::repeat_byte(1)).len(), 1);

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(cache.get(&Address::repeat_byte(1)).is_empty());
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.stats().expired, 1);
        assert_eq!(cache.indexed_venues(), 0);
    }
}
