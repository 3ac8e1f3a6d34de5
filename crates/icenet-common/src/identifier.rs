//! Validated SQL identifiers.
//!
//! Table, view and role names are interpolated into DDL/DML text, so they are
//! restricted to a conservative lower-case subset that never needs quoting.
//! Row values are always passed as bound parameters and never go through here.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CommonError, CommonResult};

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1).
const MAX_IDENTIFIER_LEN: usize = 63;

/// A SQL identifier that is safe to interpolate unquoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validate and wrap an identifier.
    ///
    /// Must start with a lower-case ASCII letter or underscore, continue with
    /// lower-case letters, digits or underscores, and fit in 63 bytes.
    pub fn new(value: impl Into<String>) -> CommonResult<Self> {
        let value = value.into();
        let invalid = |reason| CommonError::InvalidIdentifier {
            value: value.clone(),
            reason,
        };

        let mut chars = value.chars();
        match chars.next() {
            None => return Err(invalid("identifier is empty")),
            Some(c) if !(c.is_ascii_lowercase() || c == '_') => {
                return Err(invalid("must start with a lower-case letter or underscore"))
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Err(invalid("only lower-case letters, digits and underscores are allowed"));
        }
        if value.len() > MAX_IDENTIFIER_LEN {
            return Err(invalid("longer than 63 bytes"));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a new identifier by appending a suffix (e.g. an index name).
    pub fn with_suffix(&self, suffix: &str) -> CommonResult<Self> {
        Self::new(format!("{}_{}", self.0, suffix))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(Identifier::new("north_cell").is_ok());
        assert!(Identifier::new("_private").is_ok());
        assert!(Identifier::new("forecast_meta2").is_ok());
    }

    #[test]
    fn test_rejects_injection_attempts() {
        assert!(Identifier::new("north_cell; DROP TABLE x").is_err());
        assert!(Identifier::new("\"quoted\"").is_err());
        assert!(Identifier::new("North").is_err());
        assert!(Identifier::new("1table").is_err());
        assert!(Identifier::new("").is_err());
    }

    #[test]
    fn test_length_limit() {
        assert!(Identifier::new("a".repeat(63)).is_ok());
        assert!(Identifier::new("a".repeat(64)).is_err());
    }

    #[test]
    fn test_with_suffix() {
        let base = Identifier::new("north_forecast").unwrap();
        let idx = base.with_suffix("date_forecast_generated_idx").unwrap();
        assert_eq!(idx.as_str(), "north_forecast_date_forecast_generated_idx");
    }

    #[test]
    fn test_try_from_validates() {
        assert!(Identifier::try_from("icenetreader".to_string()).is_ok());
        assert!(Identifier::try_from("Robert'); --".to_string()).is_err());
    }
}
