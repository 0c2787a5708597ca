//! Runtime configuration for decoding and media scanning

use crate::error::SiftError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default per-probe budget for page evaluation
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default budget for fetching remote ciphertext
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Characters taken after a bare packer signature when no precise block boundary exists
pub const DEFAULT_FALLBACK_WINDOW: usize = 15_000;

/// Unpacked output at or below this length is treated as a failed unpack
pub const DEFAULT_MIN_UNPACKED_LEN: usize = 100;

/// Minimum length of the preferred packer dictionary literal
pub const DEFAULT_MIN_DICTIONARY_LEN: usize = 50;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Configuration shared by the decoders, the harvester and the scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiftConfig {
    /// Budget for a single page probe
    #[serde(with = "humantime_serde_compat")]
    pub probe_timeout: Duration,
    /// Budget for fetching ciphertext over HTTP
    #[serde(with = "humantime_serde_compat")]
    pub fetch_timeout: Duration,
    /// Overall budget for a scan; remaining probes are skipped once it passes
    #[serde(with = "humantime_serde_compat::option")]
    pub scan_deadline: Option<Duration>,
    /// Window size for the windowed packer fallback
    pub fallback_window: usize,
    /// Minimum unpacked length accepted by the harvester
    pub min_unpacked_len: usize,
    /// Minimum length of the preferred dictionary literal
    pub min_dictionary_len: usize,
    /// How deep window globals are walked looking for URLs
    pub max_global_depth: usize,
    /// User-Agent header for the HTTP fetcher
    pub user_agent: String,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            scan_deadline: None,
            fallback_window: DEFAULT_FALLBACK_WINDOW,
            min_unpacked_len: DEFAULT_MIN_UNPACKED_LEN,
            min_dictionary_len: DEFAULT_MIN_DICTIONARY_LEN,
            max_global_depth: 6,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SiftConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration overrides from JSON; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self, SiftError> {
        let config: SiftConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration overrides from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SiftError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Set per-probe timeout
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set ciphertext fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set overall scan deadline
    pub fn with_scan_deadline(mut self, deadline: Duration) -> Self {
        self.scan_deadline = Some(deadline);
        self
    }

    /// Set windowed fallback size
    pub fn with_fallback_window(mut self, chars: usize) -> Self {
        self.fallback_window = chars;
        self
    }

    /// Set minimum accepted unpacked length
    pub fn with_min_unpacked_len(mut self, len: usize) -> Self {
        self.min_unpacked_len = len;
        self
    }

    /// Set User-Agent for HTTP fetches
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Reject values that would make probing or harvesting meaningless
    pub fn validate(&self) -> Result<(), SiftError> {
        if self.probe_timeout.is_zero() {
            return Err(SiftError::ConfigError(
                "probeTimeout must be greater than zero".to_string(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(SiftError::ConfigError(
                "fetchTimeout must be greater than zero".to_string(),
            ));
        }
        if self.fallback_window == 0 {
            return Err(SiftError::ConfigError(
                "fallbackWindow must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Durations are written the way the CLI accepts them ("5s", "1m 30s")
mod humantime_serde_compat {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => super::serialize(duration, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.map(|value| humantime::parse_duration(&value).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
