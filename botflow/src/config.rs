//! Configuration types for state persistence and logging.

use serde::{Deserialize, Serialize};

/// Configuration shared by every state scope built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Longest storage key a scope may produce before the conversation id is hashed.
    #[serde(default = "default_max_key_length")]
    pub max_key_length: usize,
    /// Write with the `"*"` token instead of the token observed at load.
    #[serde(default)]
    pub last_writer_wins: bool,
}

fn default_max_key_length() -> usize {
    254
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_key_length: default_max_key_length(),
            last_writer_wins: false,
        }
    }
}

impl StateConfig {
    /// Creates a state configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum storage key length.
    #[must_use]
    pub fn with_max_key_length(mut self, max_key_length: usize) -> Self {
        self.max_key_length = max_key_length;
        self
    }

    /// Opts into last-writer-wins writes.
    #[must_use]
    pub fn with_last_writer_wins(mut self, enabled: bool) -> Self {
        self.last_writer_wins = enabled;
        self
    }
}

/// Logging configuration used by [`crate::observability::init_tracing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Sets the filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Enables or disables JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Top-level configuration for a bot host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotflowConfig {
    /// State persistence settings.
    #[serde(default)]
    pub state: StateConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BotflowConfig {
    /// Parses a configuration document, filling unspecified fields with defaults.
    pub fn from_json_str(raw: &str) -> crate::errors::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
