//! Pipeline tuning: batch size, retry policy and optional role grants.

use icenet_common::Identifier;
use serde::{Deserialize, Serialize};
use storage::{Grants, RetryPolicy};

use crate::error::{IngestionError, Result};

/// Rows per insert statement unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub batch_size: usize,
    pub retry: RetryPolicy,
    /// Role granted SELECT on every table and view
    pub reader_role: Option<String>,
    /// Role granted INSERT, DELETE and UPDATE on every table
    pub writer_role: Option<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            reader_role: None,
            writer_role: None,
        }
    }
}

impl IngestionConfig {
    /// Load from `ICENET_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            batch_size: parse_or(&lookup, "ICENET_BATCH_SIZE", defaults.batch_size)?,
            retry: RetryPolicy {
                max_retries: parse_or(&lookup, "ICENET_MAX_RETRIES", defaults.retry.max_retries)?,
                base_delay_secs: parse_or(&lookup, "ICENET_RETRY_BASE_SECS", defaults.retry.base_delay_secs)?,
            },
            reader_role: non_empty(lookup("ICENET_READER_ROLE")),
            writer_role: non_empty(lookup("ICENET_WRITER_ROLE")),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestionError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        self.retry
            .validate()
            .map_err(|e| IngestionError::InvalidConfig(e.to_string()))?;
        self.grants()?;
        Ok(())
    }

    /// Validated role grants.
    pub fn grants(&self) -> Result<Grants> {
        let role = |name: &Option<String>| -> Result<Option<Identifier>> {
            name.as_deref()
                .map(|n| Identifier::new(n))
                .transpose()
                .map_err(|e| IngestionError::InvalidConfig(e.to_string()))
        };
        Ok(Grants {
            reader_role: role(&self.reader_role)?,
            writer_role: role(&self.writer_role)?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| IngestionError::InvalidConfig(format!("{key} has an invalid value '{raw}'"))),
        None => Ok(default),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
