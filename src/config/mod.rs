//! Engine configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(String),

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Row count at which row layout sorting switches from merge sort to
    /// LSD radix sort.
    pub radix_sort_threshold: u32,
    /// `IN` on integer ids uses a bit vector when the largest list value is
    /// at most `list_len * ratio`.
    pub in_list_bitvector_ratio: u32,
    pub regex_enabled: bool,
    pub use_indexes: bool,
    pub use_specialized_storage: bool,
    /// Maximum cached plans per dataframe; 0 disables caching.
    pub plan_cache_capacity: usize,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            radix_sort_threshold: 4096,
            in_list_bitvector_ratio: 16,
            regex_enabled: true,
            use_indexes: true,
            use_specialized_storage: true,
            plan_cache_capacity: 64,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: EngineConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.radix_sort_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "radix_sort_threshold",
                reason: "must be > 0".into(),
            });
        }
        if self.in_list_bitvector_ratio == 0 {
            return Err(ConfigError::Invalid {
                field: "in_list_bitvector_ratio",
                reason: "must be > 0".into(),
            });
        }
        self.severity()?;
        Ok(())
    }

    /// Minimum log severity named by `log_level`.
    pub fn severity(&self) -> ConfigResult<Severity> {
        match Severity::parse(&self.log_level) {
            Some(Severity::Fatal) | None => Err(ConfigError::Invalid {
                field: "log_level",
                reason: format!(
                    "'{}' is not one of trace, info, warn, error",
                    self.log_level
                ),
            }),
            Some(s) => Ok(s),
        }
    }
}
