//! Nonce management for the signing account
//!
//! Every transaction built for an opportunity holds a [`NonceLease`]. A lease that is
//! dropped without being committed hands its nonce back, and the next reservation reuses
//! the lowest returned nonce first so the account never leaves a gap behind.

use crate::error::{StrategyError, StrategyResult};
use network::ChainReader;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use types::{Address, U256};

#[derive(Debug, Default)]
struct NonceState {
    /// Next never-issued nonce, `None` until synced from chain
    next: Option<U256>,
    /// Chain count at the last sync; anything below it is already mined
    floor: U256,
    released: BTreeSet<U256>,
}

pub struct NonceManager {
    account: Address,
    reader: Arc<dyn ChainReader>,
    state: Mutex<NonceState>,
}

impl NonceManager {
    pub fn new(account: Address, reader: Arc<dyn ChainReader>) -> Self {
        Self {
            account,
            reader,
            state: Mutex::new(NonceState::default()),
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub async fn reserve(self: &Arc<Self>) -> StrategyResult<NonceLease> {
        if self.state.lock().next.is_none() {
            self.sync().await?;
        }

        let mut state = self.state.lock();
        let nonce = match state.released.pop_first() {
            Some(nonce) => nonce,
            None => {
                let next = state
                    .next
                    .ok_or_else(|| StrategyError::Nonce("nonce state not synced".to_string()))?;
                state.next = Some(next.saturating_add(U256::one()));
                next
            }
        };
        debug!("Reserved nonce {} for {:?}", nonce, self.account);
        Ok(NonceLease {
            nonce,
            manager: Some(self.clone()),
        })
    }

    /// Drop local state and reload the pending count from chain
    pub async fn resync(&self) -> StrategyResult<U256> {
        let on_chain = self.sync().await?;
        info!("Nonce resynced for {:?}: next={}", self.account, on_chain);
        Ok(on_chain)
    }

    async fn sync(&self) -> StrategyResult<U256> {
        let on_chain = self.reader.transaction_count(self.account).await?;
        let mut state = self.state.lock();
        state.next = Some(on_chain);
        state.floor = on_chain;
        state.released.clear();
        Ok(on_chain)
    }

    fn release(&self, nonce: U256) {
        let mut state = self.state.lock();
        if nonce < state.floor {
            return;
        }
        match state.next {
            Some(next) if nonce.saturating_add(U256::one()) == next => {
                state.next = Some(nonce);
                // Collapse any returned nonces now adjacent to the top
                while let Some(top) = state.next.and_then(|n| n.checked_sub(U256::one())) {
                    if !state.released.remove(&top) {
                        break;
                    }
                    state.next = Some(top);
                }
            }
            Some(next) if nonce < next => {
                state.released.insert(nonce);
            }
            _ => {}
        }
        debug!("Released nonce {} for {:?}", nonce, self.account);
    }

    pub fn peek_next(&self) -> Option<U256> {
        let state = self.state.lock();
        state.released.first().copied().or(state.next)
    }
}

/// A reserved nonce, returned to the manager on drop unless committed
pub struct NonceLease {
    nonce: U256,
    manager: Option<Arc<NonceManager>>,
}

impl NonceLease {
    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    /// The nonce was consumed by a broadcast transaction
    pub fn commit(mut self) -> U256 {
        self.manager = None;
        self.nonce
    }
}

impl Drop for NonceLease {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.take() {
            manager.release(self.nonce);
        }
    }
}

impl std::fmt::Debug for NonceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceLease")
            .field("nonce", &self.nonce)
            .field("committed", &self.manager.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use network::StaticChainReader;

    fn manager(start: u64) -> (Arc<NonceManager>, Arc<StaticChainReader>) {
        let account = Address::repeat_byte(0x42);
        let reader = Arc::new(StaticChainReader::new());
        reader.set_nonce(account, U256::from(start));
        (
            Arc::new(NonceManager::new(account, reader.clone())),
            reader,
        )
    }

    #[tokio::test]
    async fn test_committed_leases_advance() {
        let (nonces, _) = manager(7);
        let first = nonces.reserve().await.unwrap();
        let second = nonces.reserve().await.unwrap();
        assert_eq!(first.commit(), U256::from(7u64));
        assert_eq!(second.commit(), U256::from(8u64));
        assert_eq!(nonces.peek_next(), Some(U256::from(9u64)));
    }

    #[tokio::test]
    async fn test_dropped_lease_is_reused() {
        let (nonces, _) = manager(0);
        let a = nonces.reserve().await.unwrap();
        let b = nonces.reserve().await.unwrap();
        let c = nonces.reserve().await.unwrap();
        drop(a);
        c.commit();
        let reused = nonces.reserve().await.unwrap();
        assert_eq!(reused.nonce(), U256::zero());
        b.commit();
        reused.commit();
        assert_eq!(nonces.peek_next(), Some(U256::from(3u64)));
    }

    #[tokio::test]
    async fn test_top_release_collapses() {
        let (nonces, _) = manager(10);
        let a = nonces.reserve().await.unwrap();
        let b = nonces.reserve().await.unwrap();
        drop(a);
        drop(b);
        assert_eq!(nonces.peek_next(), Some(U256::from(10u64)));
        assert_eq!(nonces.reserve().await.unwrap().commit(), U256::from(10u64));
    }

    #[tokio::test]
    async fn test_resync_follows_chain() {
        let (nonces, reader) = manager(3);
        nonces.reserve().await.unwrap().commit();
        reader.set_nonce(nonces.account(), U256::from(20u64));
        assert_eq!(nonces.resync().await.unwrap(), U256::from(20u64));
        assert_eq!(nonces.reserve().await.unwrap().commit(), U256::from(20u64));
    }
}
