use thiserror::Error;

pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Configuration channel closed")]
    Closed,
}

impl SettingsError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Implemented by every configuration section
pub trait Validate {
    fn validate(&self) -> SettingsResult<()>;
}

/// Fail with `field` unless `condition` holds
pub fn ensure(condition: bool, field: &str, reason: &str) -> SettingsResult<()> {
    if condition {
        Ok(())
    } else {
        Err(SettingsError::invalid(field, reason))
    }
}
