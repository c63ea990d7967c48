//! Layered configuration loading
//!
//! Sources, lowest precedence first: the base TOML file, an optional environment file
//! (`<dir>/environments/<env>.toml`), then `OURO_`-prefixed environment variables with
//! `__` separating nested keys (`OURO_TRIGGER__DEBOUNCE_MS=25`).

use crate::error::Validate;
use anyhow::{Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const ENV_PREFIX: &str = "OURO";

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    base: Option<PathBuf>,
    environment: Option<String>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            base: None,
            environment: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.base = Some(path.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Merge all sources over `defaults`, deserialize and validate
    pub fn load<T>(&self, defaults: &T) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Validate,
    {
        let defaults_toml =
            toml::to_string(defaults).context("Failed to serialize configuration defaults")?;
        let mut builder =
            Config::builder().add_source(File::from_str(&defaults_toml, FileFormat::Toml));

        if let Some(base) = &self.base {
            info!("Loading configuration file: {:?}", base);
            builder = builder.add_source(File::from(base.as_path()).required(true));

            if let Some(env) = &self.environment {
                let env_file = environment_file(base, env);
                if env_file.exists() {
                    info!("Loading environment config: {:?}", env_file);
                    builder = builder.add_source(File::from(env_file));
                } else {
                    warn!("Environment config not found: {:?}", env_file);
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: T = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config
            .validate()
            .context("Configuration failed validation")?;
        debug!("Configuration loaded");
        Ok(config)
    }
}

fn environment_file(base: &Path, environment: &str) -> PathBuf {
    base.parent()
        .unwrap_or_else(|| Path::new("."))
        .join("environments")
        .join(format!("{environment}.toml"))
}

/// Read one TOML file without layering
pub fn from_file<T: DeserializeOwned + Validate>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {path:?}"))?;
    let config: T = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {path:?}"))?;
    config.validate()?;
    Ok(config)
}

pub fn save_to_file<T: Serialize>(config: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write config file {path:?}"))?;
    Ok(())
}

/// Expand `$VAR` / `${VAR}` references, e.g. API keys inside endpoint URLs
pub fn expand_env(value: &str) -> Result<String> {
    let expanded = shellexpand::env(value)
        .with_context(|| format!("Failed to expand environment in '{value}'"))?;
    Ok(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ensure, SettingsResult};
    use serde::Deserialize;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Section {
        debounce_ms: u64,
        label: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        max_hops: usize,
        trigger: Section,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                max_hops: 4,
                trigger: Section {
                    debounce_ms: 50,
                    label: "default".to_string(),
                },
            }
        }
    }

    impl Validate for Sample {
        fn validate(&self) -> SettingsResult<()> {
            ensure(self.max_hops >= 2, "max_hops", "must be at least 2")
        }
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ouro.toml");
        fs::write(&path, "max_hops = 3\n[trigger]\nlabel = \"file\"\n").unwrap();

        let loaded = ConfigLoader::new()
            .with_env_prefix("OURO_TEST_FILE")
            .with_file(&path)
            .load(&Sample::default())
            .unwrap();
        assert_eq!(loaded.max_hops, 3);
        assert_eq!(loaded.trigger.label, "file");
        assert_eq!(loaded.trigger.debounce_ms, 50);
    }

    #[test]
    fn test_environment_file_layer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ouro.toml");
        fs::write(&path, "max_hops = 3\n").unwrap();
        fs::create_dir(dir.path().join("environments")).unwrap();
        fs::write(dir.path().join("environments/staging.toml"), "max_hops = 5\n").unwrap();

        let loaded = ConfigLoader::new()
            .with_env_prefix("OURO_TEST_ENVFILE")
            .with_file(&path)
            .with_environment("staging")
            .load(&Sample::default())
            .unwrap();
        assert_eq!(loaded.max_hops, 5);
    }

    #[test]
    fn test_validation_failure_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ouro.toml");
        fs::write(&path, "max_hops = 1\n").unwrap();

        let result = ConfigLoader::new()
            .with_env_prefix("OURO_TEST_INVALID")
            .with_file(&path)
            .load(&Sample::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        save_to_file(&Sample::default(), &path).unwrap();
        let reloaded: Sample = from_file(&path).unwrap();
        assert_eq!(reloaded, Sample::default());
    }

    #[test]
    fn test_expand_env() {
        std::env::set_var("OURO_TEST_API_KEY", "abc123");
        assert_eq!(
            expand_env("https://rpc.example/v2/${OURO_TEST_API_KEY}").unwrap(),
            "https://rpc.example/v2/abc123"
        );
    }
}
