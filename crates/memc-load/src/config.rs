//! Run and shard configuration
//!
//! Both are plain values built once in `main` and passed to constructors.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use memc_load_common::{LoadError, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Defaults
// ============================================================================

/// Default input pattern; skips files already marked with a leading dot.
pub const DEFAULT_PATTERN: &str = "./[!.]*.tsv.gz";

/// Default number of writer workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default per-operation store timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Default number of write attempts per record.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Default pause between write attempts in seconds.
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 3;

/// Default capacity of the line and record channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Built-in device types and their memcached endpoints.
pub const DEFAULT_SHARDS: [(&str, &str); 4] = [
    ("idfa", "127.0.0.1:33013"),
    ("gaid", "127.0.0.1:33014"),
    ("adid", "127.0.0.1:33015"),
    ("dvid", "127.0.0.1:33016"),
];

// ============================================================================
// Run configuration
// ============================================================================

/// Settings consumed by the loader core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of concurrent writer workers
    pub workers: usize,

    /// Timeout applied to each store operation
    pub timeout: Duration,

    /// Total write attempts per record, including the first one
    pub retry_attempts: u32,

    /// Fixed pause between failed attempts
    pub retry_backoff: Duration,

    /// Log writes instead of performing them, and leave input files in place
    pub dry_run: bool,

    /// Capacity of the line and record channels
    pub channel_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
            dry_run: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl RunConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(LoadError::Config("workers must be greater than 0".to_string()));
        }

        if self.retry_attempts == 0 {
            return Err(LoadError::Config(
                "retry attempts must be greater than 0".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(LoadError::Config("timeout must be greater than 0".to_string()));
        }

        if self.channel_capacity == 0 {
            return Err(LoadError::Config(
                "channel capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Shard configuration
// ============================================================================

/// Mapping of device type to store endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShardConfig {
    endpoints: BTreeMap<String, String>,
}

impl ShardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four built-in device types on their default local ports.
    pub fn with_defaults() -> Self {
        DEFAULT_SHARDS
            .iter()
            .map(|(name, addr)| ShardSpec::new(*name, *addr))
            .collect()
    }

    /// Add or replace the endpoint for a device type.
    pub fn insert(&mut self, spec: ShardSpec) {
        self.endpoints.insert(spec.device_type, spec.endpoint);
    }

    pub fn endpoint(&self, device_type: &str) -> Option<&str> {
        self.endpoints.get(device_type).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.endpoints.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(LoadError::Config("at least one shard is required".to_string()));
        }

        for (name, endpoint) in &self.endpoints {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(LoadError::Config(format!("invalid device type {:?}", name)));
            }
            if endpoint.trim().is_empty() {
                return Err(LoadError::Config(format!("empty endpoint for device type {}", name)));
            }
        }

        Ok(())
    }
}

impl FromIterator<ShardSpec> for ShardConfig {
    fn from_iter<I: IntoIterator<Item = ShardSpec>>(iter: I) -> Self {
        let mut config = Self::new();
        for spec in iter {
            config.insert(spec);
        }
        config
    }
}

/// One `device_type=host:port` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSpec {
    pub device_type: String,
    pub endpoint: String,
}

impl ShardSpec {
    pub fn new(device_type: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            device_type: device_type.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl FromStr for ShardSpec {
    type Err = LoadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (name, endpoint) = s
            .split_once('=')
            .ok_or_else(|| LoadError::Config(format!("expected NAME=HOST:PORT, got {:?}", s)))?;

        let (name, endpoint) = (name.trim(), endpoint.trim());
        if name.is_empty() || endpoint.is_empty() {
            return Err(LoadError::Config(format!("expected NAME=HOST:PORT, got {:?}", s)));
        }

        Ok(Self::new(name, endpoint))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_defaults_are_valid() {
        let config = RunConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.retry_backoff, Duration::from_secs(3));
        assert!(!config.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_config_rejects_zero_values() {
        let cases = [
            RunConfig { workers: 0, ..RunConfig::default() },
            RunConfig { retry_attempts: 0, ..RunConfig::default() },
            RunConfig { timeout: Duration::ZERO, ..RunConfig::default() },
            RunConfig { channel_capacity: 0, ..RunConfig::default() },
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(LoadError::Config(_))), "{:?}", config);
        }
    }

    #[test]
    fn test_default_shards() {
        let shards = ShardConfig::with_defaults();
        assert_eq!(shards.len(), 4);
        assert_eq!(shards.endpoint("idfa"), Some("127.0.0.1:33013"));
        assert_eq!(shards.endpoint("dvid"), Some("127.0.0.1:33016"));
        assert_eq!(shards.endpoint("imei"), None);
        assert!(shards.validate().is_ok());
    }

    #[test]
    fn test_shard_spec_parsing_and_override() {
        let spec: ShardSpec = "imei=10.0.0.5:11211".parse().unwrap();
        assert_eq!(spec, ShardSpec::new("imei", "10.0.0.5:11211"));

        assert!("imei".parse::<ShardSpec>().is_err());
        assert!("=10.0.0.5:11211".parse::<ShardSpec>().is_err());
        assert!("imei=".parse::<ShardSpec>().is_err());

        let mut shards = ShardConfig::with_defaults();
        shards.insert(spec);
        shards.insert("idfa=cache-1:11211".parse().unwrap());
        assert_eq!(shards.len(), 5);
        assert_eq!(shards.endpoint("idfa"), Some("cache-1:11211"));
    }

    #[test]
    fn test_empty_shard_config_is_invalid() {
        assert!(ShardConfig::new().validate().is_err());
    }
}
