//! Ingester configuration.

use anyhow::{Context, Result};
use ingestion::IngestionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use storage::DatabaseConfig;

/// Top-level ingester configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngesterConfig {
    /// PostgreSQL connection settings
    pub database: DatabaseConfig,

    /// Batching, retries and role grants
    pub ingestion: IngestionConfig,
}

impl IngesterConfig {
    /// Load configuration from a YAML file with `database:` and `ingestion:` sections.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `PSQL_*` and `ICENET_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            ingestion: IngestionConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate()?;
        self.ingestion.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::SslMode;

    #[test]
    fn test_yaml_sections() {
        let config = IngesterConfig::from_yaml_str(
            r#"
database:
  host: db.example.org
  database: icenet
  username: ingest
  password: secret
  ssl_mode: prefer
ingestion:
  batch_size: 5000
  retry:
    max_retries: 3
    base_delay_secs: 0.5
  reader_role: icenetreader
"#,
        )
        .unwrap();

        assert_eq!(config.database.host, "db.example.org");
        assert_eq!(config.database.ssl_mode, SslMode::Prefer);
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.ingestion.batch_size, 5000);
        assert_eq!(config.ingestion.retry.max_retries, 3);
        assert_eq!(config.ingestion.reader_role.as_deref(), Some("icenetreader"));
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = IngesterConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.ingestion.batch_size, 100_000);
        assert_eq!(config.database.ssl_mode, SslMode::Require);
    }

    #[test]
    fn test_invalid_yaml_values_are_rejected() {
        assert!(IngesterConfig::from_yaml_str("ingestion:\n  batch_size: 0\n").is_err());
        assert!(IngesterConfig::from_yaml_str("database:\n  host: ''\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(IngesterConfig::from_yaml(dir.path().join("absent.yaml")).is_err());
    }
}
