//! Configuration management for dronelink.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::{DEFAULT_MAX_PAYLOAD, MAX_LAST_POINTS};
use crate::storage::{RecordFormat, StorageBackend, TIME_FORMAT};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "dronelink";

/// Default CSV output, relative to the working directory.
const CSV_FILE_NAME: &str = "drone_coordinates.csv";

/// Default `SQLite` database file name.
const DATABASE_FILE_NAME: &str = "points.db";

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "DRONELINK_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `DRONELINK_`, sections split by `__`)
/// 2. TOML config file at `~/.config/dronelink/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ingestion server configuration.
    pub server: ServerConfig,
    /// Consumer loop configuration.
    pub pipeline: PipelineConfig,
    /// Persistence configuration.
    pub storage: StorageConfig,
    /// Viewer configuration.
    pub viewer: ViewerConfig,
    /// Producer simulator configuration.
    pub simulator: SimulatorConfig,
}

/// Ingestion server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Largest payload accepted on a connection, in bytes.
    pub max_payload_bytes: usize,
}

/// Consumer loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Initial window capacity, until a producer sends `last_points_number`.
    pub last_points_number: usize,
    /// Longest single wait on an empty queue, in milliseconds.
    pub poll_interval_ms: u64,
}

/// Persistence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which sink to write to.
    pub backend: StorageBackend,
    /// Output path. Defaults to `drone_coordinates.csv` in the working
    /// directory for CSV and `~/.local/share/dronelink/points.db` for `SQLite`.
    pub path: Option<PathBuf>,
    /// CSV field separator.
    pub field_separator: char,
    /// CSV decimal separator.
    pub decimal_separator: char,
    /// CSV digits after the decimal separator.
    pub precision: usize,
}

/// Viewer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Poll the windows while serving.
    pub enabled: bool,
    /// Interval between frames in milliseconds.
    pub update_interval_ms: u64,
    /// Margin added on every side of the computed axis bounds.
    pub plot_margin: f64,
}

/// Producer simulator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Server to connect to.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Number of simulated drones per batch.
    pub drones: usize,
    /// Window capacity announced to the server.
    pub last_points_number: usize,
    /// Delay between batches in milliseconds.
    pub interval_ms: u64,
    /// Total simulated time in milliseconds.
    pub run_time_ms: u64,
    /// Noise bound; samples are drawn with a standard deviation of a third of it.
    pub noise_limit: f64,
    /// RNG seed, 0 for entropy.
    pub seed: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5050,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            last_points_number: 20,
            poll_interval_ms: 1000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let format = RecordFormat::default();
        Self {
            backend: StorageBackend::Csv,
            path: None, // Resolved per backend at runtime
            field_separator: format.field_separator,
            decimal_separator: format.decimal_separator,
            precision: format.precision,
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            update_interval_ms: 100,
            plot_margin: 50.0,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5050,
            drones: 3,
            last_points_number: 20,
            interval_ms: 10,
            run_time_ms: 1000,
            noise_limit: 1.5,
            seed: 0,
        }
    }
}

impl ServerConfig {
    /// The `host:port` string to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PipelineConfig {
    /// Get the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ViewerConfig {
    /// Get the update interval as a Duration.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

impl SimulatorConfig {
    /// The `host:port` string to connect to.
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the batch interval as a Duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Number of batches sent over the run: `ceil(run_time / interval)`.
    #[must_use]
    pub fn batch_count(&self) -> u64 {
        if self.interval_ms == 0 {
            return 0;
        }
        self.run_time_ms.div_ceil(self.interval_ms)
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(Error::ConfigValidation {
                message: message.to_string(),
            })
        };

        if self.server.port == 0 {
            return invalid("server.port must be greater than 0");
        }
        if self.server.max_payload_bytes == 0 {
            return invalid("server.max_payload_bytes must be greater than 0");
        }
        if self.pipeline.last_points_number == 0 {
            return invalid("pipeline.last_points_number must be greater than 0");
        }
        if self.pipeline.last_points_number > MAX_LAST_POINTS {
            return invalid(&format!(
                "pipeline.last_points_number must not exceed {MAX_LAST_POINTS}"
            ));
        }
        if self.pipeline.poll_interval_ms == 0 {
            return invalid("pipeline.poll_interval_ms must be greater than 0");
        }
        if self.storage.field_separator == self.storage.decimal_separator {
            return invalid("storage.field_separator and storage.decimal_separator must differ");
        }
        for (name, separator) in [
            ("field_separator", self.storage.field_separator),
            ("decimal_separator", self.storage.decimal_separator),
        ] {
            if clashes_with_number(separator) {
                return invalid(&format!(
                    "storage.{name} {separator:?} cannot be a digit, sign or line break"
                ));
            }
        }
        if clashes_with_timestamp(self.storage.field_separator) {
            return invalid(&format!(
                "storage.field_separator {:?} appears in timestamps",
                self.storage.field_separator
            ));
        }
        if self.viewer.update_interval_ms == 0 {
            return invalid("viewer.update_interval_ms must be greater than 0");
        }
        if !self.viewer.plot_margin.is_finite() || self.viewer.plot_margin < 0.0 {
            return invalid("viewer.plot_margin must be a non-negative number");
        }
        if self.simulator.drones == 0 {
            return invalid("simulator.drones must be greater than 0");
        }
        if self.simulator.last_points_number == 0 {
            return invalid("simulator.last_points_number must be greater than 0");
        }
        if self.simulator.last_points_number > MAX_LAST_POINTS {
            return invalid(&format!(
                "simulator.last_points_number must not exceed {MAX_LAST_POINTS}"
            ));
        }
        if self.simulator.interval_ms == 0 {
            return invalid("simulator.interval_ms must be greater than 0");
        }
        if !self.simulator.noise_limit.is_finite() || self.simulator.noise_limit < 0.0 {
            return invalid("simulator.noise_limit must be a non-negative number");
        }

        Ok(())
    }

    /// Get the record output path, resolving the backend default if not set.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| match self.storage.backend {
                StorageBackend::Csv => PathBuf::from(CSV_FILE_NAME),
                StorageBackend::Sqlite => Self::default_data_dir().join(DATABASE_FILE_NAME),
            })
    }

    /// Record layout used by the CSV sink and by replay.
    #[must_use]
    pub fn record_format(&self) -> RecordFormat {
        RecordFormat {
            field_separator: self.storage.field_separator,
            decimal_separator: self.storage.decimal_separator,
            precision: self.storage.precision,
        }
    }
}

/// Characters a formatted number may contain, plus line breaks.
fn clashes_with_number(separator: char) -> bool {
    separator.is_ascii_digit() || matches!(separator, '-' | '+' | '\n' | '\r')
}

/// Whether `separator` occurs in a timestamp written with [`TIME_FORMAT`].
fn clashes_with_timestamp(separator: char) -> bool {
    chrono::NaiveDateTime::default()
        .format(TIME_FORMAT)
        .to_string()
        .contains(separator)
}
