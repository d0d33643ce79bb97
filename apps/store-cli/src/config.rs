//! Centralized configuration for store-cli.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than halfway through a command.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost when the process exits)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl FromStr for StorageProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("memory") {
            Ok(Self::Memory)
        } else if s.eq_ignore_ascii_case("sqlite") {
            Ok(Self::Sqlite)
        } else {
            Err(ConfigError {
                field: "STORAGE_PROVIDER",
                message: format!("Unknown provider '{}', expected 'memory' or 'sqlite'", s),
            })
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// CLI configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage provider (default: sqlite)
    pub storage_provider: StorageProvider,
    /// SQLite database path (default: ./data/records.db)
    pub db_path: PathBuf,
    /// Log format
    pub log_format: LogFormat,
    /// Upper bound on each store operation (default: 5000 ms)
    pub op_timeout: Duration,
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_provider = match lookup("STORAGE_PROVIDER") {
            Some(raw) => raw.trim().parse()?,
            None => StorageProvider::Sqlite,
        };

        let db_path = lookup("DB_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/records.db"));

        let log_format =
            LogFormat::from_str(&lookup("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        let op_timeout = match lookup("STORE_OP_TIMEOUT_MS") {
            None => Duration::from_millis(5000),
            Some(raw) => {
                let ms: u64 = raw.trim().parse().map_err(|e| ConfigError {
                    field: "STORE_OP_TIMEOUT_MS",
                    message: format!("Invalid number '{}': {}", raw, e),
                })?;
                if ms == 0 {
                    return Err(ConfigError {
                        field: "STORE_OP_TIMEOUT_MS",
                        message: "Must be greater than zero".into(),
                    });
                }
                Duration::from_millis(ms)
            }
        };

        Ok(Self {
            storage_provider,
            db_path,
            log_format,
            op_timeout,
        })
    }

    /// Log a warning when data will not outlive the process.
    pub fn warn_if_ephemeral(&self) {
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!(
                "STORAGE_PROVIDER=memory: records are kept in memory and discarded on exit."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn storage_provider_parsing() {
        assert_eq!("memory".parse::<StorageProvider>().unwrap(), StorageProvider::Memory);
        assert_eq!("MEMORY".parse::<StorageProvider>().unwrap(), StorageProvider::Memory);
        assert_eq!("sqlite".parse::<StorageProvider>().unwrap(), StorageProvider::Sqlite);
    }

    #[test]
    fn misspelled_provider_fails_fast() {
        let err = Config::from_lookup(lookup(&[("STORAGE_PROVIDER", "memroy")])).unwrap_err();
        assert_eq!(err.field, "STORAGE_PROVIDER");
        assert!(err.message.contains("memroy"));
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("anything"), LogFormat::Pretty);
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.storage_provider, StorageProvider::Sqlite);
        assert_eq!(cfg.db_path, PathBuf::from("./data/records.db"));
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.op_timeout, Duration::from_secs(5));
    }

    #[test]
    fn explicit_values_are_used() {
        let cfg = Config::from_lookup(lookup(&[
            ("STORAGE_PROVIDER", "memory"),
            ("DB_PATH", "/tmp/x.db"),
            ("LOG_FORMAT", "json"),
            ("STORE_OP_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(cfg.storage_provider, StorageProvider::Memory);
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.op_timeout, Duration::from_millis(250));
    }

    #[test]
    fn bad_timeout_fails_fast() {
        let err = Config::from_lookup(lookup(&[("STORE_OP_TIMEOUT_MS", "soon")])).unwrap_err();
        assert_eq!(err.field, "STORE_OP_TIMEOUT_MS");
        let err = Config::from_lookup(lookup(&[("STORE_OP_TIMEOUT_MS", "0")])).unwrap_err();
        assert!(err.message.contains("greater than zero"));
    }
}
