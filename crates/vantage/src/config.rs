//! # Hub Configuration
//!
//! Loaded once at startup from TOML. Every section is optional.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 50505
//! queue_capacity = 4096
//! echo_messages = false
//!
//! [world]
//! max_x = 1000.0
//! max_y = 750.0
//! floor = 0.1
//!
//! [[calibration]]
//! client_id = "lab-kinect"
//! min_x = -5000.0
//! min_y = -1000.0
//! min_z = 0.0
//! max_x = 5000.0
//! max_y = -1000.0
//! max_z = 15000.0
//! ```

use std::collections::HashSet;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vantage_core::{CalibrationBounds, HubState, WorldBounds};
use vantage_networking::{ServerConfig, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY};

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The file we tried to read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is outside its allowed range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The bind address does not resolve.
    #[error("cannot resolve bind address {0}")]
    BadAddress(String),
}

/// Complete hub configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Socket options.
    #[serde(default)]
    pub server: ServerSection,

    /// Virtual world extent.
    #[serde(default)]
    pub world: WorldBounds,

    /// Calibration known before devices connect.
    #[serde(default)]
    pub calibration: Vec<CalibrationEntry>,
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    /// Host or IP to bind.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// UDP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Datagrams buffered between receiver and worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Log every inbound message at `info`.
    #[serde(default)]
    pub echo_messages: bool,
}

/// One `[[calibration]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    /// Device the bounds belong to.
    pub client_id: String,

    /// Raw min/max per axis.
    #[serde(flatten)]
    pub bounds: CalibrationBounds,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            queue_capacity: default_queue_capacity(),
            echo_messages: false,
        }
    }
}

impl HubConfig {
    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// I/O, parse or validation failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// Calibration bounds with `min > max` are accepted: they mirror an axis.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let world = &self.world;
        if !world.floor.is_finite() || world.floor < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "world.floor must be finite and >= 0, got {}",
                world.floor
            )));
        }
        for (name, value) in [("world.max_x", world.max_x), ("world.max_y", world.max_y)] {
            if !value.is_finite() || value <= world.floor {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be finite and greater than world.floor ({}), got {value}",
                    world.floor
                )));
            }
        }

        if self.server.queue_capacity == 0 {
            return Err(ConfigError::Invalid("server.queue_capacity must be > 0".into()));
        }

        let mut seen = HashSet::new();
        for entry in &self.calibration {
            if entry.client_id.is_empty() {
                return Err(ConfigError::Invalid("calibration.client_id must not be empty".into()));
            }
            if !seen.insert(entry.client_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "calibration for {:?} is listed twice",
                    entry.client_id
                )));
            }
            let b = &entry.bounds;
            if [b.min_x, b.min_y, b.min_z, b.max_x, b.max_y, b.max_z]
                .iter()
                .any(|v| !v.is_finite())
            {
                return Err(ConfigError::Invalid(format!(
                    "calibration for {:?} has a non-finite bound",
                    entry.client_id
                )));
            }
        }

        Ok(())
    }

    /// Socket settings for [`vantage_networking::HubServer::bind`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::BadAddress`] if `server.bind` does not resolve.
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let label = format!("{}:{}", self.server.bind, self.server.port);
        let bind_address: SocketAddr = (self.server.bind.as_str(), self.server.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(ConfigError::BadAddress(label))?;

        Ok(ServerConfig {
            bind_address,
            queue_capacity: self.server.queue_capacity,
            echo_messages: self.server.echo_messages,
            ..ServerConfig::default()
        })
    }

    /// Initial hub state: configured world plus pre-seeded calibration.
    #[must_use]
    pub fn hub_state(&self) -> HubState {
        self.calibration
            .iter()
            .fold(HubState::new(self.world), |state, entry| {
                state.with_calibration(entry.client_id.as_str(), entry.bounds)
            })
    }
}
