#![forbid(unsafe_code)]

use crate::pool::PoolConfig;
use crate::store::StoreError;
use ld_core::BaseUri;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BASE_TABLE: &str = "lddb";
const DEFAULT_BASE_URI: &str = "https://id.example.org/";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub const ENV_BASE_TABLE: &str = "LDSTORE_BASE_TABLE";
pub const ENV_BASE_URI: &str = "LDSTORE_BASE_URI";
pub const ENV_MAX_CONNECTIONS: &str = "LDSTORE_MAX_CONNECTIONS";
pub const ENV_VERSIONING: &str = "LDSTORE_VERSIONING";

/// Storage configuration.
///
/// - `base_table` names the main table; the derived tables append
///   `__identifiers`, `__versions`, `__dependencies`, `__settings` and
///   `__profiles`. Only ASCII letters, digits and `_` are accepted.
/// - `base_uri` must be an absolute http(s) uri without query or fragment.
/// - `pool.max_connections` must be at least `pool.max_nesting`.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub storage_dir: PathBuf,
    #[serde(default = "default_base_table")]
    pub base_table: String,
    #[serde(default = "default_base_uri")]
    pub base_uri: String,
    #[serde(default = "default_versioning")]
    pub versioning: bool,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub pool: PoolConfig,
}

fn default_base_table() -> String {
    DEFAULT_BASE_TABLE.to_string()
}

fn default_base_uri() -> String {
    DEFAULT_BASE_URI.to_string()
}

const fn default_versioning() -> bool {
    true
}

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl StoreConfig {
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            base_table: default_base_table(),
            base_uri: default_base_uri(),
            versioning: default_versioning(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool: PoolConfig::default(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join(format!("{}.db", self.base_table))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn parsed_base_uri(&self) -> Result<BaseUri, StoreError> {
        BaseUri::try_new(self.base_uri.as_str())
            .map_err(|_| StoreError::InvalidInput("invalid base_uri"))
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.base_table.is_empty()
            || !self
                .base_table
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            return Err(StoreError::InvalidInput("invalid base_table"));
        }
        self.parsed_base_uri()?;
        self.pool.validate()?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Applies `LDSTORE_*` overrides read through `lookup`; invalid values are
    /// logged and ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_BASE_TABLE) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                self.base_table = trimmed.to_string();
            }
        }

        if let Some(raw) = lookup(ENV_BASE_URI) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                match BaseUri::try_new(trimmed) {
                    Ok(base) => self.base_uri = base.as_str().to_string(),
                    Err(err) => tracing::warn!("invalid {ENV_BASE_URI}, ignoring: {err}"),
                }
            }
        }

        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                match trimmed.parse::<usize>() {
                    Ok(value) => self.pool.max_connections = value,
                    Err(err) => {
                        tracing::warn!("invalid {ENV_MAX_CONNECTIONS}, ignoring: {err}")
                    }
                }
            }
        }

        if let Some(raw) = lookup(ENV_VERSIONING) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "" => {}
                "1" | "true" | "yes" | "on" => self.versioning = true,
                "0" | "false" | "no" | "off" => self.versioning = false,
                other => tracing::warn!("invalid {ENV_VERSIONING}, ignoring: {other}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let config = StoreConfig::from_json_str(r#"{"storage_dir": "/tmp/ld"}"#).unwrap();
        assert_eq!(config.base_table, "lddb");
        assert_eq!(config.base_uri, "https://id.example.org/");
        assert!(config.versioning);
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.db_path(), PathBuf::from("/tmp/ld/lddb.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(StoreConfig::from_json_str(r#"{"storage_dir": "/tmp", "bogus": 1}"#).is_err());
    }

    #[test]
    fn validate_rejects_unsafe_table_names_and_bad_pools() {
        let mut config = StoreConfig::new("/tmp/ld");
        config.base_table = "lddb; DROP TABLE x".to_string();
        assert!(config.validate().is_err());

        let mut config = StoreConfig::new("/tmp/ld");
        config.pool.max_connections = 2;
        config.pool.max_nesting = 3;
        assert!(config.validate().is_err());

        let mut config = StoreConfig::new("/tmp/ld");
        config.base_uri = "ftp://nope".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn overrides_apply_and_invalid_values_are_ignored() {
        let mut config = StoreConfig::new("/tmp/ld");
        config.apply_overrides_from(lookup(&[
            (ENV_BASE_TABLE, " bibdb "),
            (ENV_BASE_URI, "https://libris.example.org"),
            (ENV_MAX_CONNECTIONS, "32"),
            (ENV_VERSIONING, "off"),
        ]));
        assert_eq!(config.base_table, "bibdb");
        assert_eq!(config.base_uri, "https://libris.example.org/");
        assert_eq!(config.pool.max_connections, 32);
        assert!(!config.versioning);

        config.apply_overrides_from(lookup(&[
            (ENV_BASE_URI, "not a uri"),
            (ENV_MAX_CONNECTIONS, "many"),
            (ENV_VERSIONING, "maybe"),
        ]));
        assert_eq!(config.base_uri, "https://libris.example.org/");
        assert_eq!(config.pool.max_connections, 32);
        assert!(!config.versioning);
    }
}
