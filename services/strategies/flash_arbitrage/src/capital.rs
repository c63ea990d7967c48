//! Capital sources
//!
//! A capital source lends the start asset for the duration of one transaction. The
//! selector orders candidates by fee, then by configured priority, and the orchestrator
//! falls through them until one yields a valid plan.

use crate::config::{CapitalProviderConfig, ProviderKind};
use crate::profit::fee_for;
use std::sync::Arc;
use types::{Address, U256};

/// Snapshot of what a provider offers for one opportunity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapitalDescriptor {
    pub provider: String,
    pub kind: ProviderKind,
    pub fee_bps: u32,
    pub priority: u32,
    pub supported_assets: Vec<Address>,
    pub max_available: U256,
    pub callback_contract: Address,
}

pub trait CapitalSource: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, asset: Address, amount: U256) -> bool;

    /// Fee owed on top of the principal, `None` when the loan cannot be made
    fn quote_fee(&self, asset: Address, amount: U256) -> Option<U256>;

    /// Contract that lends and calls back into the executor
    fn callback_contract(&self) -> Address;

    fn descriptor(&self) -> CapitalDescriptor;
}

/// Flash-loan pool described entirely by configuration
#[derive(Debug, Clone)]
pub struct FlashLoanProvider {
    config: CapitalProviderConfig,
}

impl FlashLoanProvider {
    pub fn new(config: CapitalProviderConfig) -> Self {
        Self { config }
    }
}

impl CapitalSource for FlashLoanProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supports(&self, asset: Address, amount: U256) -> bool {
        let listed = self.config.assets.is_empty() || self.config.assets.contains(&asset);
        listed && !amount.is_zero() && amount <= self.config.max_available
    }

    fn quote_fee(&self, asset: Address, amount: U256) -> Option<U256> {
        self.supports(asset, amount)
            .then(|| fee_for(amount, self.config.fee_bps))
    }

    fn callback_contract(&self) -> Address {
        self.config.contract
    }

    fn descriptor(&self) -> CapitalDescriptor {
        CapitalDescriptor {
            provider: self.config.name.clone(),
            kind: self.config.kind,
            fee_bps: self.config.fee_bps,
            priority: self.config.priority,
            supported_assets: self.config.assets.clone(),
            max_available: self.config.max_available,
            callback_contract: self.config.contract,
        }
    }
}

/// A candidate source with its quoted fee
#[derive(Clone)]
pub struct CapitalQuote {
    pub source: Arc<dyn CapitalSource>,
    pub descriptor: CapitalDescriptor,
    pub fee: U256,
}

impl std::fmt::Debug for CapitalQuote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapitalQuote")
            .field("descriptor", &self.descriptor)
            .field("fee", &self.fee)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct CapitalSelector {
    sources: Vec<Arc<dyn CapitalSource>>,
}

impl CapitalSelector {
    pub fn new(sources: Vec<Arc<dyn CapitalSource>>) -> Self {
        Self { sources }
    }

    pub fn from_config(providers: &[CapitalProviderConfig]) -> Self {
        Self::new(
            providers
                .iter()
                .cloned()
                .map(|config| Arc::new(FlashLoanProvider::new(config)) as Arc<dyn CapitalSource>)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sources able to fund `amount` of `asset`: lowest fee first, then priority
    pub fn candidates(&self, asset: Address, amount: U256) -> Vec<CapitalQuote> {
        let mut quotes: Vec<CapitalQuote> = self
            .sources
            .iter()
            .filter(|source| source.supports(asset, amount))
            .filter_map(|source| {
                let fee = source.quote_fee(asset, amount)?;
                Some(CapitalQuote {
                    source: source.clone(),
                    descriptor: source.descriptor(),
                    fee,
                })
            })
            .collect();
        quotes.sort_by(|a, b| {
            a.fee
                .cmp(&b.fee)
                .then(a.descriptor.priority.cmp(&b.descriptor.priority))
        });
        quotes
    }

    /// Fee rate of the cheapest source for this loan, used when sizing
    pub fn cheapest_fee_bps(&self, asset: Address, amount: U256) -> Option<u32> {
        self.candidates(asset, amount)
            .first()
            .map(|quote| quote.descriptor.fee_bps)
    }
}
