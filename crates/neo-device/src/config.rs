//! Device Configuration
//!
//! Read from a TOML file:
//!
//! ```toml
//! [device]
//! id = 260001
//! name = "AHU-1 controller"
//!
//! [runtime]
//! tick_interval_ms = 1000
//! out_of_range = "clamp"
//!
//! [[analog_output]]
//! instance = 1
//! name = "Supply fan speed"
//! units = "percent"
//! min_pres_value = 0.0
//! max_pres_value = 100.0
//!
//! [analog_output.reporting]
//! high_limit = 90.0
//! deadband = 2.0
//! limit_enable = { high = true }
//! event_enable = { to_offnormal = true, to_normal = true }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use bacnet_objects::{AnalogOutputOptions, AnalogOutputSettings, OutOfRangePolicy, WritePolicy};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "NEO_CONFIG";

/// Environment variable overriding `runtime.tick_interval_ms`
pub const TICK_ENV: &str = "NEO_TICK_MS";

/// Used when neither the command line nor the environment names a file
pub const DEFAULT_CONFIG_PATH: &str = "neo-device.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Whole configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub device: DeviceInfo,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Empty means the demo object set
    #[serde(default, rename = "analog_output")]
    pub analog_outputs: Vec<AnalogOutputSettings>,
}

/// Device object identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: u32,
    pub name: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            id: 260001,
            name: "neo-device".to_string(),
        }
    }
}

/// Object table options and the reporting period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_intrinsic_reporting")]
    pub intrinsic_reporting: bool,
    #[serde(default)]
    pub out_of_range: OutOfRangePolicy,
    #[serde(default)]
    pub reject_reserved_priority: bool,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_capacity() -> usize {
    AnalogOutputOptions::default().capacity
}

fn default_intrinsic_reporting() -> bool {
    AnalogOutputOptions::default().intrinsic_reporting
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            capacity: default_capacity(),
            intrinsic_reporting: default_intrinsic_reporting(),
            out_of_range: OutOfRangePolicy::default(),
            reject_reserved_priority: false,
        }
    }
}

impl RuntimeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn object_options(&self) -> AnalogOutputOptions {
        AnalogOutputOptions {
            capacity: self.capacity,
            intrinsic_reporting: self.intrinsic_reporting,
            write_policy: WritePolicy {
                out_of_range: self.out_of_range,
                reject_reserved_priority: self.reject_reserved_priority,
            },
        }
    }
}

/// Command line, then `NEO_CONFIG`, then the default file name
pub fn resolve_path(cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

impl DeviceConfig {
    /// Load and validate `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        info!(
            path = %path.display(),
            analog_outputs = config.analog_outputs.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `NEO_TICK_MS`
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let tick_ms = std::env::var(TICK_ENV).ok();
        self.apply_tick_override(tick_ms.as_deref())
    }

    /// Override the tick period from its textual form
    pub fn apply_tick_override(&mut self, tick_ms: Option<&str>) -> Result<(), ConfigError> {
        let Some(raw) = tick_ms else {
            return Ok(());
        };
        let ms = raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::Invalid(format!("{TICK_ENV}={raw:?}: {e}")))?;
        debug!(tick_interval_ms = ms, "Tick interval overridden");
        self.runtime.tick_interval_ms = ms;
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "runtime.tick_interval_ms must be positive".into(),
            ));
        }
        if self.analog_outputs.len() > self.runtime.capacity {
            return Err(ConfigError::Invalid(format!(
                "{} analog outputs configured, capacity is {}",
                self.analog_outputs.len(),
                self.runtime.capacity
            )));
        }

        let mut seen = HashSet::new();
        for ao in &self.analog_outputs {
            if !seen.insert(ao.instance) {
                return Err(ConfigError::Invalid(format!(
                    "analog output instance {} configured twice",
                    ao.instance
                )));
            }
            if ao.min_pres_value > ao.max_pres_value {
                return Err(ConfigError::Invalid(format!(
                    "analog output {}: min_pres_value exceeds max_pres_value",
                    ao.instance
                )));
            }
        }
        Ok(())
    }
}
