//! Configuration structures.
//!
//! Configuration is loaded from a JSON file or built from defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::{Error, Result};

/// Global kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Scan session configuration.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Badge authorization configuration.
    #[serde(default)]
    pub badge: BadgeConfig,

    /// Loan ledger backend.
    #[serde(default)]
    pub store: StoreConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Parse a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject configurations the kernel cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scan.cooldown.is_zero() {
            return Err(Error::validation("scan.cooldown must be greater than zero"));
        }
        if self.badge.accepted_codes.iter().all(|c| c.trim().is_empty()) {
            return Err(Error::validation(
                "badge.accepted_codes must contain at least one non-empty code",
            ));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.sqlite_path.is_none() {
            return Err(Error::validation(
                "store.sqlite_path is required for the sqlite backend",
            ));
        }
        Ok(())
    }
}

/// Scan session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Suppression window after an invalid or unauthorized scan.
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(7000),
        }
    }
}

/// Badge authorization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BadgeConfig {
    /// Codes that unlock tool registration.
    pub accepted_codes: Vec<String>,
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            accepted_codes: vec!["123456789".to_string()],
        }
    }
}

/// Ledger backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Loan ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file for the sqlite backend.
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scan.cooldown, Duration::from_secs(7));
        assert_eq!(config.badge.accepted_codes, vec!["123456789".to_string()]);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = Config::from_json_str(r#"{"scan": {"cooldown": "3s 500ms"}}"#).unwrap();
        assert_eq!(config.scan.cooldown, Duration::from_millis(3500));
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_rejects_empty_badge_set() {
        let err = Config::from_json_str(r#"{"badge": {"accepted_codes": []}}"#).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_rejects_zero_cooldown() {
        let err = Config::from_json_str(r#"{"scan": {"cooldown": "0s"}}"#).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_sqlite_requires_path() {
        let err = Config::from_json_str(r#"{"store": {"backend": "sqlite"}}"#).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"badge": {{"accepted_codes": ["A1", "B2"]}}}}"#).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.badge.accepted_codes.len(), 2);
    }
}
