//! Configuration structures for the PTP clock driver.
//!
//! Supports TOML deserialization with sensible defaults for
//! development and explicit values for production deployment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default PHC name exposed to the clock service.
pub const DEFAULT_CLOCK_NAME: &str = "thunder_ptp";

/// Largest supported frequency adjustment (100%) in parts per billion.
pub const DEFAULT_MAX_ADJ_PPB: u32 = 1_000_000_000;

/// Top-level driver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Clock engine configuration.
    pub clock: ClockConfig,

    /// Nominal clock rate source.
    pub rate: RateConfig,

    /// Register window configuration.
    pub device: DeviceConfig,

    /// Sampling loop configuration.
    pub monitor: MonitorConfig,
}

/// Clock engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Name registered with the clock service (truncated to 15 bytes).
    ///
    /// An empty name falls back to the clock variant's own name.
    pub name: String,

    /// Largest accepted frequency adjustment magnitude in ppb.
    pub max_adj_ppb: u32,

    /// What to do with adjustments beyond `max_adj_ppb`.
    pub out_of_range: OutOfRangePolicy,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CLOCK_NAME.to_string(),
            max_adj_ppb: DEFAULT_MAX_ADJ_PPB,
            out_of_range: OutOfRangePolicy::Reject,
        }
    }
}

/// Policy for frequency adjustments outside `[-max_adj, max_adj]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutOfRangePolicy {
    /// Return an error and leave the compensation untouched.
    #[default]
    Reject,
    /// Saturate the request to `±max_adj`.
    Clamp,
}

/// Where the nominal tick frequency comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Rate source selection.
    pub source: RateSourceKind,

    /// Rate used when `source = "fixed"`.
    pub fixed_hz: u64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            source: RateSourceKind::Rst,
            fixed_hz: 0,
        }
    }
}

/// Supported rate sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateSourceKind {
    /// Read the SCLK multiplier from the reset/fuses block.
    #[default]
    Rst,
    /// Use `fixed_hz` verbatim.
    Fixed,
}

/// Register window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Register access backend.
    pub driver: DeviceDriver,

    /// Memory-mappable resource of the PTP block BAR (mmio only).
    pub ptp_resource: Option<PathBuf>,

    /// Memory-mappable resource of the RST block BAR (mmio only, optional).
    pub rst_resource: Option<PathBuf>,

    /// Whether the simulated RST block is present.
    pub sim_rst_present: bool,

    /// SCLK multiplier fused into the simulated RST block.
    pub sim_sclk_multiplier: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            driver: DeviceDriver::Simulated,
            ptp_resource: None,
            rst_resource: None,
            sim_rst_present: true,
            sim_sclk_multiplier: 16,
        }
    }
}

/// Supported register access backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDriver {
    /// In-memory hardware model for testing.
    #[default]
    Simulated,
    /// Memory-mapped PCI BAR resources.
    Mmio,
}

/// Sampling loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between clock samples.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Samples to take before exiting (0 = until signalled).
    pub max_samples: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_samples: 0,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock.max_adj_ppb == 0 || self.clock.max_adj_ppb > DEFAULT_MAX_ADJ_PPB {
            return Err(ConfigError::Invalid(format!(
                "clock.max_adj_ppb must be in 1..={DEFAULT_MAX_ADJ_PPB}, got {}",
                self.clock.max_adj_ppb
            )));
        }
        if self.rate.source == RateSourceKind::Fixed && self.rate.fixed_hz == 0 {
            return Err(ConfigError::Invalid(
                "rate.fixed_hz must be non-zero when rate.source = \"fixed\"".into(),
            ));
        }
        if self.device.driver == DeviceDriver::Mmio && self.device.ptp_resource.is_none() {
            return Err(ConfigError::Invalid(
                "device.ptp_resource is required when device.driver = \"mmio\"".into(),
            ));
        }
        if self.monitor.interval.is_zero() {
            return Err(ConfigError::Invalid("monitor.interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Semantically invalid configuration.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for crate::error::PtpError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
