//! # Ouro Configuration
//!
//! Layered loading (defaults, TOML file, environment file, `OURO_` variables), the
//! [`Validate`] contract every section implements, and [`ConfigHandle`] for values that
//! change while the engine runs: venue allow-lists, thresholds, hop limits, pruning,
//! debounce windows, cache sizing and relay lists.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .with_file("config/ouro.toml")
//!     .load(&StrategyConfig::default())?;
//! let handle = ConfigHandle::new(config)?;
//! let snapshot = handle.current();
//! ```

pub mod error;
pub mod handle;
pub mod loader;

pub use error::{ensure, SettingsError, SettingsResult, Validate};
pub use handle::ConfigHandle;
pub use loader::{expand_env, from_file, save_to_file, ConfigLoader, ENV_PREFIX};
