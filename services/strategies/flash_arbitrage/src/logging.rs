//! Standardized emoji logging for the strategy runtime
//!
//! Every component logs its headline events through these macros so a scrolling log
//! reads the same whether it came from a feed, the trigger or the orchestrator.
//! Structured fields still go through plain `tracing` calls.

/// Standard emoji set for strategy logging
pub struct LogEmoji;

impl LogEmoji {
    // Status indicators
    pub const SUCCESS: &'static str = "✅"; // Operation succeeded
    pub const ERROR: &'static str = "❌"; // Operation failed
    pub const WARNING: &'static str = "⚠️"; // Degraded but running

    // Module-specific
    pub const SEARCH: &'static str = "🔍"; // Path search / cache lookups
    pub const CHART: &'static str = "📊"; // Metrics
    pub const EXECUTE: &'static str = "⚡"; // Execution steps
    pub const MONEY: &'static str = "💰"; // Profit
    pub const NETWORK: &'static str = "🌐"; // Feeds and relays
    pub const GAS: &'static str = "⛽"; // Gas oracle
}

#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::SUCCESS, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        tracing::error!("{} {}", $crate::logging::LogEmoji::ERROR, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        tracing::warn!("{} {}", $crate::logging::LogEmoji::WARNING, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_search {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::SEARCH, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_metrics {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::CHART, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_execution {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::EXECUTE, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_profit {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::MONEY, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_network {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::NETWORK, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_gas {
    ($($arg:tt)*) => {
        tracing::debug!("{} {}", $crate::logging::LogEmoji::GAS, format!($($arg)*))
    };
}
