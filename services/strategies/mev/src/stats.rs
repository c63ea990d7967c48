//! Per-relay submission statistics

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayStats {
    pub submitted: u64,
    pub included: u64,
    pub not_included: u64,
    pub failed: u64,
    pub total_latency_ms: u64,
}

impl RelayStats {
    /// Bundles with a known outcome
    pub fn resolved(&self) -> u64 {
        self.included + self.not_included
    }

    pub fn inclusion_rate(&self) -> Option<f64> {
        match self.resolved() {
            0 => None,
            resolved => Some(self.included as f64 / resolved as f64),
        }
    }

    pub fn average_latency_ms(&self) -> Option<u64> {
        match self.submitted {
            0 => None,
            submitted => Some(self.total_latency_ms / submitted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let mut stats = RelayStats::default();
        assert_eq!(stats.inclusion_rate(), None);
        stats.submitted = 4;
        stats.included = 3;
        stats.not_included = 1;
        stats.total_latency_ms = 400;
        assert_eq!(stats.inclusion_rate(), Some(0.75));
        assert_eq!(stats.average_latency_ms(), Some(100));
    }
}
