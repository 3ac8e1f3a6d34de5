//! Database connection configuration.

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::fmt;
use std::str::FromStr;

use crate::error::{StorageError, StorageResult};

/// Transport encryption requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    Disable,
    Prefer,
    #[default]
    Require,
}

impl FromStr for SslMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            other => Err(StorageError::InvalidConfig(format!(
                "unknown sslmode '{}', expected disable, prefer or require",
                other
            ))),
        }
    }
}

impl From<SslMode> for PgSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
        }
    }
}

/// Connection settings for the forecast database.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub ssl_mode: SslMode,
    /// Log in as `user@host` (Azure single-server convention)
    pub qualify_username_with_host: bool,
    pub application_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "icenet".to_string(),
            username: "icenet".to_string(),
            password: String::new(),
            ssl_mode: SslMode::Require,
            qualify_username_with_host: false,
            application_name: "icenet-ingester".to_string(),
        }
    }
}

// Keep the password out of logs.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ssl_mode", &self.ssl_mode)
            .field("qualify_username_with_host", &self.qualify_username_with_host)
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl DatabaseConfig {
    /// Load configuration from `PSQL_*` environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to
    /// defaults for absent keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StorageResult<Self> {
        let defaults = Self::default();

        let port = match lookup("PSQL_PORT") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| StorageError::InvalidConfig(format!("PSQL_PORT '{}' is not a port", v)))?,
            None => defaults.port,
        };
        let ssl_mode = match lookup("PSQL_SSLMODE") {
            Some(v) => v.parse()?,
            None => defaults.ssl_mode,
        };
        let qualify_username_with_host = lookup("PSQL_QUALIFY_USER")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.qualify_username_with_host);

        let config = Self {
            host: lookup("PSQL_HOST").unwrap_or(defaults.host),
            port,
            database: lookup("PSQL_DB").unwrap_or(defaults.database),
            username: lookup("PSQL_USER").unwrap_or(defaults.username),
            password: lookup("PSQL_PWD").unwrap_or(defaults.password),
            ssl_mode,
            qualify_username_with_host,
            application_name: defaults.application_name,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.host.trim().is_empty() {
            return Err(StorageError::InvalidConfig("database host is empty".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(StorageError::InvalidConfig("database name is empty".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(StorageError::InvalidConfig("database username is empty".to_string()));
        }
        Ok(())
    }

    /// Name presented to the server at login.
    pub fn login_name(&self) -> String {
        if self.qualify_username_with_host && !self.username.contains('@') {
            format!("{}@{}", self.username, self.host)
        } else {
            self.username.clone()
        }
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.login_name())
            .password(&self.password)
            .ssl_mode(self.ssl_mode.into())
            .application_name(&self.application_name)
    }

    /// `host:port/database` for log lines.
    pub fn describe(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}
