//! Recorder Configuration Settings
//!
//! Configuration types for the recorder, loaded from environment variables.
//! Numeric values that fail to parse fall back to their defaults; asset ids
//! are validated strictly.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::{RetryConfig, SynchronizerConfig};
use crate::domain::subscription::{AssetIdError, AssetSet};
use crate::infrastructure::venue::{EventToggles, KeepAliveConfig, SessionConfig};

/// Production market channel endpoint.
pub const DEFAULT_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

/// Asset id used by the built-in presets and as the fallback target.
pub const DEFAULT_ASSET_ID: &str =
    "109681959945973300464568698402968596289258214226684818748321941747028805721376";

/// Preset used when none is configured.
pub const DEFAULT_PRESET: &str = "single_market";

// =============================================================================
// Presets
// =============================================================================

/// Named lists of asset ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetTable {
    presets: BTreeMap<String, Vec<String>>,
    fallback: Vec<String>,
}

impl Default for PresetTable {
    fn default() -> Self {
        let mut presets = BTreeMap::new();
        presets.insert("single_market".to_string(), vec![DEFAULT_ASSET_ID.to_string()]);
        presets.insert("multiple_markets".to_string(), vec![DEFAULT_ASSET_ID.to_string()]);
        Self {
            presets,
            fallback: vec![DEFAULT_ASSET_ID.to_string()],
        }
    }
}

impl PresetTable {
    /// Add or replace a preset.
    #[must_use]
    pub fn with_preset(mut self, name: impl Into<String>, ids: Vec<String>) -> Self {
        self.presets.insert(name.into(), ids);
        self
    }

    /// Asset ids for `name`; unknown names resolve to the single default asset.
    #[must_use]
    pub fn resolve(&self, name: &str) -> &[String] {
        self.presets.get(name).map_or(&self.fallback, Vec::as_slice)
    }

    /// Whether `name` is a known preset.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.presets.contains_key(name)
    }

    /// Known preset names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }
}

// =============================================================================
// Settings Groups
// =============================================================================

/// Market channel settings.
#[derive(Debug, Clone)]
pub struct VenueSettings {
    /// WebSocket endpoint.
    pub ws_url: String,
    /// Preset the targets came from (`None` when set explicitly).
    pub preset: Option<String>,
    /// Subscription targets.
    pub targets: AssetSet,
    /// Keep-alive probe interval.
    pub keepalive_interval: Duration,
    /// Close handshake and drain deadline.
    pub shutdown_grace: Duration,
}

/// Event log settings.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Directory holding the log files.
    pub data_dir: PathBuf,
    /// Records buffered between dispatcher and writer.
    pub buffer_capacity: usize,
    /// Per-kind persistence switches.
    pub toggles: EventToggles,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            buffer_capacity: 10_000,
            toggles: EventToggles::default(),
        }
    }
}

/// Reference source settings.
#[derive(Debug, Clone)]
pub struct ReferenceSettings {
    /// REST base URL.
    pub base_url: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Interval between `current` polls.
    pub poll_interval: Duration,
    /// Age after which `current` counts as stale.
    pub max_age: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Backoff for period open fetches.
    pub retry: RetryConfig,
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            symbol: "BTCUSDT".to_string(),
            poll_interval: Duration::from_secs(2),
            max_age: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

// =============================================================================
// Recorder Config
// =============================================================================

/// Complete recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Market channel settings.
    pub venue: VenueSettings,
    /// Event log settings.
    pub storage: StorageSettings,
    /// Reference source settings.
    pub reference: ReferenceSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Presets available to this run.
    pub presets: PresetTable,
}

impl RecorderConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the asset id list is empty or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the asset id list is empty or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let presets = PresetTable::default();

        let (preset, targets) = match env.get("RECORDER_ASSET_IDS") {
            Some(raw) => {
                let targets = AssetSet::parse(raw.split(',')).map_err(|source| {
                    ConfigError::InvalidAssetIds {
                        var: "RECORDER_ASSET_IDS",
                        source,
                    }
                })?;
                (None, targets)
            }
            None => {
                let name = env
                    .get("RECORDER_PRESET")
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_PRESET.to_string());
                if !presets.contains(&name) {
                    tracing::warn!(preset = %name, "Unknown preset, using the default asset");
                }
                let targets = AssetSet::parse(presets.resolve(&name)).map_err(|source| {
                    ConfigError::InvalidAssetIds {
                        var: "RECORDER_PRESET",
                        source,
                    }
                })?;
                (Some(name), targets)
            }
        };

        let ws_url = env
            .get("RECORDER_WS_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_WS_URL.to_string());

        let venue = VenueSettings {
            ws_url,
            preset,
            targets,
            keepalive_interval: env
                .period_secs("RECORDER_KEEPALIVE_INTERVAL_SECS", KeepAliveConfig::default().interval),
            shutdown_grace: env.duration_millis("RECORDER_SHUTDOWN_GRACE_MS", Duration::from_secs(3)),
        };

        let storage_defaults = StorageSettings::default();
        let toggle_defaults = storage_defaults.toggles;
        let storage = StorageSettings {
            data_dir: env
                .get("RECORDER_DATA_DIR")
                .filter(|s| !s.trim().is_empty())
                .map_or(storage_defaults.data_dir, PathBuf::from),
            buffer_capacity: env
                .parse("RECORDER_LOG_BUFFER_CAPACITY", storage_defaults.buffer_capacity)
                .max(1),
            toggles: EventToggles {
                snapshots: env.flag("RECORDER_LOG_SNAPSHOTS", toggle_defaults.snapshots),
                price_changes: env.flag("RECORDER_LOG_PRICE_CHANGES", toggle_defaults.price_changes),
                tick_size_changes: env.flag(
                    "RECORDER_LOG_TICK_SIZE_CHANGES",
                    toggle_defaults.tick_size_changes,
                ),
                trades: env.flag("RECORDER_LOG_TRADES", toggle_defaults.trades),
            },
        };

        let reference_defaults = ReferenceSettings::default();
        let retry_defaults = reference_defaults.retry.clone();
        let reference = ReferenceSettings {
            base_url: env
                .get("REFERENCE_BASE_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(reference_defaults.base_url),
            symbol: env
                .get("REFERENCE_SYMBOL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(reference_defaults.symbol),
            poll_interval: env
                .period_millis("REFERENCE_POLL_INTERVAL_MS", reference_defaults.poll_interval),
            max_age: env.duration_secs("REFERENCE_MAX_AGE_SECS", reference_defaults.max_age),
            request_timeout: env.duration_millis(
                "REFERENCE_REQUEST_TIMEOUT_MS",
                reference_defaults.request_timeout,
            ),
            retry: RetryConfig {
                initial_delay: env
                    .duration_millis("REFERENCE_RETRY_INITIAL_MS", retry_defaults.initial_delay),
                max_delay: env.duration_millis("REFERENCE_RETRY_MAX_MS", retry_defaults.max_delay),
                max_attempts: env
                    .parse("REFERENCE_RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts),
                ..retry_defaults
            },
        };

        let server = ServerSettings {
            health_port: env.parse("RECORDER_HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            venue,
            storage,
            reference,
            server,
            presets,
        })
    }

    /// Session parameters derived from the venue settings.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            keepalive: KeepAliveConfig {
                interval: self.venue.keepalive_interval,
            },
            shutdown_grace: self.venue.shutdown_grace,
            ..SessionConfig::new(self.venue.ws_url.clone())
        }
    }

    /// Synchronizer parameters derived from the reference settings.
    #[must_use]
    pub fn synchronizer_config(&self) -> SynchronizerConfig {
        SynchronizerConfig {
            poll_interval: self.reference.poll_interval,
            retry: self.reference.retry.clone(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The asset id list was empty or contained an invalid id.
    #[error("invalid asset ids in {var}: {source}")]
    InvalidAssetIds {
        /// Variable the list came from.
        var: &'static str,
        /// Validation failure.
        #[source]
        source: AssetIdError,
    },
}

// =============================================================================
// Lookup Helpers
// =============================================================================

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    /// Like [`Self::duration_secs`], but zero keeps the default.
    fn period_secs(&self, key: &str, default: Duration) -> Duration {
        Some(self.duration_secs(key, default))
            .filter(|d| !d.is_zero())
            .unwrap_or(default)
    }

    /// Like [`Self::duration_millis`], but zero keeps the default.
    fn period_millis(&self, key: &str, default: Duration) -> Duration {
        Some(self.duration_millis(key, default))
            .filter(|d| !d.is_zero())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }
}
