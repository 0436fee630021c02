//! Configuration Module
//!
//! Handles loading region, lateral and server configuration from environment
//! variables. Region and lateral settings are also plain serde structs so an
//! embedding application can source them from wherever it likes.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::EvictionPolicyKind;

/// Per-region memory store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Region name; defines the namespace of the store
    pub region_name: String,
    /// Maximum number of elements held in memory, 0 = unbounded
    pub max_objects: usize,
    /// Eviction ordering used by the underlying store
    pub eviction_policy: EvictionPolicyKind,
    /// Whether a shrinker is registered with the shared scheduler
    pub use_memory_shrinker: bool,
    /// Shrinker period in seconds
    pub shrinker_interval_secs: u64,
    /// Region-level idle bound; elements idle longer are reclaimed by the shrinker
    pub max_memory_idle_secs: Option<u64>,
    /// Maximum number of elements spooled by a single shrinker run
    pub max_spool_per_run: Option<usize>,
    /// Hand reclaimed elements to the secondary store before removing them
    pub spool_on_shrink: bool,
    /// Number of victims freed when an insert hits the capacity bound
    pub spool_chunk_size: usize,
}

impl RegionConfig {
    /// Creates a config for `region_name` with default settings.
    pub fn new(region_name: impl Into<String>) -> Self {
        Self {
            region_name: region_name.into(),
            ..Self::default()
        }
    }

    /// Maximum size as seen by the eviction-ordered store.
    pub fn max_size(&self) -> Option<usize> {
        (self.max_objects > 0).then_some(self.max_objects)
    }

    pub fn shrinker_interval(&self) -> Duration {
        Duration::from_secs(self.shrinker_interval_secs.max(1))
    }

    pub fn max_memory_idle(&self) -> Option<Duration> {
        self.max_memory_idle_secs.map(Duration::from_secs)
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            region_name: "default".to_string(),
            max_objects: 1000,
            eviction_policy: EvictionPolicyKind::Lru,
            use_memory_shrinker: false,
            shrinker_interval_secs: 30,
            max_memory_idle_secs: None,
            max_spool_per_run: None,
            spool_on_shrink: false,
            spool_chunk_size: 2,
        }
    }
}

/// Settings for joining the lateral propagation group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateralConfig {
    /// Group every peer joins
    pub group_name: String,
    /// Transport string handed to the transport unchanged
    pub transport: String,
    /// Upper bound on the connect-and-join sequence, in milliseconds
    pub connect_timeout_ms: u64,
}

impl LateralConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Regions initialized at start-up
    pub regions: Vec<String>,
    /// Template applied to every region
    pub region_defaults: RegionConfig,
    /// Admin HTTP port
    pub server_port: u16,
    /// Lateral settings, present only when `LATERAL_GROUP` is set
    pub lateral: Option<LateralConfig>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REGIONS` - Comma separated region names (default: `default`)
    /// - `MAX_OBJECTS` - Per-region capacity, 0 = unbounded (default: 1000)
    /// - `EVICTION_POLICY` - `lru`, `mru` or `fifo` (default: `lru`)
    /// - `USE_MEMORY_SHRINKER` - Enable the shrinker (default: false)
    /// - `SHRINKER_INTERVAL_SECS` - Shrinker period (default: 30)
    /// - `MAX_MEMORY_IDLE_SECS` - Region idle bound (default: none)
    /// - `MAX_SPOOL_PER_RUN` - Spool cap per shrinker run (default: none)
    /// - `SPOOL_ON_SHRINK` - Spool reclaimed elements (default: false)
    /// - `SPOOL_CHUNK_SIZE` - Victims freed per overflow (default: 2)
    /// - `SERVER_PORT` - Admin HTTP port (default: 3000)
    /// - `LATERAL_GROUP` - Lateral group name (default: none, lateral disabled)
    /// - `LATERAL_TRANSPORT` - Transport string (default: `239.255.0.1:6780`)
    /// - `LATERAL_CONNECT_TIMEOUT_MS` - Connect bound (default: 5000)
    pub fn from_env() -> Self {
        let defaults = RegionConfig::default();

        let region_defaults = RegionConfig {
            region_name: defaults.region_name.clone(),
            max_objects: parse_var("MAX_OBJECTS").unwrap_or(defaults.max_objects),
            eviction_policy: parse_var("EVICTION_POLICY").unwrap_or(defaults.eviction_policy),
            use_memory_shrinker: parse_var("USE_MEMORY_SHRINKER")
                .unwrap_or(defaults.use_memory_shrinker),
            shrinker_interval_secs: parse_var("SHRINKER_INTERVAL_SECS")
                .unwrap_or(defaults.shrinker_interval_secs),
            max_memory_idle_secs: parse_var("MAX_MEMORY_IDLE_SECS"),
            max_spool_per_run: parse_var("MAX_SPOOL_PER_RUN"),
            spool_on_shrink: parse_var("SPOOL_ON_SHRINK").unwrap_or(defaults.spool_on_shrink),
            spool_chunk_size: parse_var("SPOOL_CHUNK_SIZE").unwrap_or(defaults.spool_chunk_size),
        };

        let regions = env::var("REGIONS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|names| !names.is_empty())
            .unwrap_or_else(|| vec![defaults.region_name.clone()]);

        let lateral = env::var("LATERAL_GROUP")
            .ok()
            .filter(|g| !g.is_empty())
            .map(|group_name| LateralConfig {
                group_name,
                transport: env::var("LATERAL_TRANSPORT")
                    .unwrap_or_else(|_| "239.255.0.1:6780".to_string()),
                connect_timeout_ms: parse_var("LATERAL_CONNECT_TIMEOUT_MS").unwrap_or(5000),
            });

        Self {
            regions,
            region_defaults,
            server_port: parse_var("SERVER_PORT").unwrap_or(3000),
            lateral,
        }
    }

    /// Region config for `name`, built from the defaults template.
    pub fn region(&self, name: &str) -> RegionConfig {
        RegionConfig {
            region_name: name.to_string(),
            ..self.region_defaults.clone()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            regions: vec!["default".to_string()],
            region_defaults: RegionConfig::default(),
            server_port: 3000,
            lateral: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
