//! Server and client configuration.
//!
//! Settings come from an optional TOML file with `[server]` and `[client]`
//! tables; command-line flags override individual values.

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Default bind/connect host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default TCP port.
pub const DEFAULT_PORT: u16 = 8080;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

/// Game server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    host: String,

    /// Port to bind; 0 lets the OS choose.
    #[serde(default = "default_port")]
    port: u16,

    /// Upper bound on a single frame write before the peer is dropped.
    #[serde(default = "default_write_timeout_ms")]
    write_timeout_ms: u64,

    /// Send a `ServerFull` frame before closing refused connections.
    #[serde(default)]
    notify_full: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            write_timeout_ms: default_write_timeout_ms(),
            notify_full: false,
        }
    }
}

impl ServerConfig {
    /// Overrides the bind host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Overrides the bind port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides the write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enables or disables the `ServerFull` notice.
    pub fn with_notify_full(mut self, notify_full: bool) -> Self {
        self.notify_full = notify_full;
        self
    }

    /// `host:port` string for binding.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Write timeout as a duration.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Game client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host.
    #[serde(default = "default_host")]
    host: String,

    /// Server port.
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ClientConfig {
    /// Overrides the server host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Overrides the server port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port` string for connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Contents of a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct Settings {
    /// `[server]` table.
    #[serde(default)]
    server: ServerConfig,

    /// `[client]` table.
    #[serde(default)]
    client: ClientConfig,
}

impl Settings {
    /// Loads settings from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let settings = Self::from_toml(&content)?;
        info!(server = %settings.server.address(), "Config loaded successfully");
        Ok(settings)
    }

    /// Parses settings from TOML text.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))
    }

    /// Loads from `path` when given, otherwise returns defaults.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Splits into the server and client parts.
    pub fn into_parts(self) -> (ServerConfig, ClientConfig) {
        (self.server, self.client)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
