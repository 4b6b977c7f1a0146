//! Configuration loading and typed config structures for RoadPulse.
//!
//! The canonical configuration lives in `roadpulse-config.yaml` at the
//! project root. Every section is optional: a missing file, an empty file or
//! a missing key all fall back to the defaults below.
//!
//! | Section | Key | Default |
//! |---------|-----|---------|
//! | `scheduler` | `tick_interval_ms` | 30000 |
//! | `sampler` | `seed` | none (OS entropy) |
//! | `sampler` | `incident_probability` | 0.05 |
//! | `sampler` | `noise_amplitude` | 0.15 |
//! | `sampler` | `utc_offset_minutes` | 0 |
//! | `broker` | `connection_buffer` | 64 |
//! | `cache` | `incident_retention` | `keep_all` |
//! | `infrastructure` | `observer_port` | 3000 |
//! | `infrastructure` | `database_url` | none (in-memory store) |
//! | `logging` | `level` / `json` | `info` / `false` |
//!
//! `DATABASE_URL` and `PORT` override the infrastructure section.

use std::path::Path;
use std::time::Duration;

use chrono::FixedOffset;
use roadpulse_types::RoadSegment;
use serde::Deserialize;

use crate::broker::DEFAULT_CONNECTION_BUFFER;
use crate::cache::IncidentRetention;
use crate::network::{NetworkError, RoadNetwork};
use crate::sampler::{DEFAULT_INCIDENT_PROBABILITY, DEFAULT_NOISE_AMPLITUDE, SamplerSettings};

/// Largest accepted UTC offset magnitude, in minutes.
const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of its accepted range.
    #[error("invalid config value for {key}: {reason}")]
    Invalid {
        /// Dotted path of the offending key.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

const fn invalid(key: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { key, reason }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `roadpulse-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Tick timing.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Traffic sampler parameters.
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Subscription broker parameters.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// State cache parameters.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Listener port and database connection.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Custom road network; the built-in network is used when absent.
    #[serde(default)]
    pub network: Option<Vec<RoadSegment>>,
}

impl SimulationConfig {
    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if an override or value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.infrastructure.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    /// Environment overrides apply either way.
    ///
    /// # Errors
    ///
    /// See [`from_file`](Self::from_file).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Self::default();
        config.infrastructure.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(invalid("scheduler.tick_interval_ms", "must be positive".into()));
        }
        if self.broker.connection_buffer == 0 {
            return Err(invalid("broker.connection_buffer", "must be positive".into()));
        }
        self.sampler.settings().map(|_| ())
    }

    /// Build the road network from the `network` section or the built-in table.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] if the configured segments are invalid.
    pub fn road_network(&self) -> Result<RoadNetwork, NetworkError> {
        match &self.network {
            Some(segments) => RoadNetwork::new(segments.clone()),
            None => RoadNetwork::default_network(),
        }
    }
}

/// Tick timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Real-time milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl SchedulerConfig {
    /// The tick interval as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Traffic sampler parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SamplerConfig {
    /// Seed for reproducible runs; OS entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Per-segment, per-tick incident probability.
    #[serde(default = "default_incident_probability")]
    pub incident_probability: f64,

    /// Half-width of the uniform congestion noise.
    #[serde(default = "default_noise_amplitude")]
    pub noise_amplitude: f64,

    /// Offset from UTC, in minutes, used for hour-of-day.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl SamplerConfig {
    /// The UTC offset as a [`FixedOffset`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the offset exceeds 18 hours.
    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        let minutes = self.utc_offset_minutes;
        if minutes.unsigned_abs() > MAX_UTC_OFFSET_MINUTES.unsigned_abs() {
            return Err(invalid(
                "sampler.utc_offset_minutes",
                format!("{minutes} exceeds +/-{MAX_UTC_OFFSET_MINUTES}"),
            ));
        }
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| invalid("sampler.utc_offset_minutes", format!("{minutes} is out of range")))
    }

    /// Validated sampler settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for probabilities or amplitudes
    /// outside `[0, 1]` and for out-of-range offsets.
    pub fn settings(&self) -> Result<SamplerSettings, ConfigError> {
        if !(0.0..=1.0).contains(&self.incident_probability) {
            return Err(invalid(
                "sampler.incident_probability",
                format!("{} is outside [0, 1]", self.incident_probability),
            ));
        }
        if !(0.0..=1.0).contains(&self.noise_amplitude) {
            return Err(invalid(
                "sampler.noise_amplitude",
                format!("{} is outside [0, 1]", self.noise_amplitude),
            ));
        }
        Ok(SamplerSettings {
            incident_probability: self.incident_probability,
            noise_amplitude: self.noise_amplitude,
            utc_offset: self.utc_offset()?,
        })
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            seed: None,
            incident_probability: default_incident_probability(),
            noise_amplitude: default_noise_amplitude(),
            utc_offset_minutes: 0,
        }
    }
}

/// Subscription broker parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerConfig {
    /// Capacity of each connection's outbound queue.
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            connection_buffer: default_connection_buffer(),
        }
    }
}

/// State cache parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Whether finished incidents are kept or evicted.
    #[serde(default)]
    pub incident_retention: IncidentRetention,
}

/// Listener port and database connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// `PostgreSQL` connection string; the in-memory store is used when absent.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Observer HTTP/WebSocket port.
    #[serde(default = "default_observer_port")]
    pub observer_port: u16,
}

impl InfrastructureConfig {
    /// Override values with `DATABASE_URL` and `PORT` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `PORT` is not a valid port.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `PORT` is not a valid port.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(port) = lookup("PORT") {
            self.observer_port = port
                .trim()
                .parse()
                .map_err(|e| invalid("PORT", format!("{port:?}: {e}")))?;
        }
        Ok(())
    }
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            observer_port: default_observer_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_tick_interval_ms() -> u64 {
    30_000
}

const fn default_incident_probability() -> f64 {
    DEFAULT_INCIDENT_PROBABILITY
}

const fn default_noise_amplitude() -> f64 {
    DEFAULT_NOISE_AMPLITUDE
}

const fn default_connection_buffer() -> usize {
    DEFAULT_CONNECTION_BUFFER
}

const fn default_observer_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_owned()
}
