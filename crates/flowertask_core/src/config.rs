//! Engine configuration.
//!
//! # Responsibility
//! - Parse host-supplied JSON configuration with defaults for missing keys.
//! - Validate values before the service is built.
//!
//! # Invariants
//! - `undo_timeout_ms` is within `MIN_UNDO_TIMEOUT_MS..=MAX_UNDO_TIMEOUT_MS`.

use crate::service::undo_buffer::DEFAULT_UNDO_TIMEOUT;
use crate::view::projection::{TaskFilter, TaskSort};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const MIN_UNDO_TIMEOUT_MS: u64 = 500;
pub const MAX_UNDO_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct EngineConfig {
    /// How long a deleted task stays undoable in the UI.
    pub undo_timeout_ms: u64,
    pub default_filter: TaskFilter,
    pub default_sort: TaskSort,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            undo_timeout_ms: DEFAULT_UNDO_TIMEOUT.as_millis() as u64,
            default_filter: TaskFilter::All,
            default_sort: TaskSort::None,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON configuration object.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_UNDO_TIMEOUT_MS..=MAX_UNDO_TIMEOUT_MS).contains(&self.undo_timeout_ms) {
            return Err(ConfigError::UndoTimeoutOutOfRange(self.undo_timeout_ms));
        }
        Ok(())
    }

    pub fn undo_timeout(&self) -> Duration {
        Duration::from_millis(self.undo_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    UndoTimeoutOutOfRange(u64),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(details) => write!(f, "invalid engine config: {details}"),
            Self::UndoTimeoutOutOfRange(value) => write!(
                f,
                "undoTimeoutMs must be within {MIN_UNDO_TIMEOUT_MS}..={MAX_UNDO_TIMEOUT_MS}, got {value}"
            ),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig};
    use crate::view::projection::{TaskFilter, TaskSort};
    use std::time::Duration;

    #[test]
    fn empty_object_uses_defaults() {
        let config = EngineConfig::from_json_str("{}").expect("defaults should parse");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.undo_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn parses_camel_case_keys() {
        let config = EngineConfig::from_json_str(
            r#"{"undoTimeoutMs": 4000, "defaultFilter": "overdue", "defaultSort": "dueDateAsc"}"#,
        )
        .expect("config should parse");
        assert_eq!(config.undo_timeout_ms, 4000);
        assert_eq!(config.default_filter, TaskFilter::Overdue);
        assert_eq!(config.default_sort, TaskSort::DueDateAsc);
    }

    #[test]
    fn rejects_out_of_range_timeout_and_unknown_keys() {
        let err = EngineConfig::from_json_str(r#"{"undoTimeoutMs": 0}"#)
            .expect_err("zero timeout must be rejected");
        assert_eq!(err, ConfigError::UndoTimeoutOutOfRange(0));

        let err = EngineConfig::from_json_str(r#"{"undoTimeout": 3000}"#)
            .expect_err("unknown key must be rejected");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
