//! Configuration file structures for the functions emulator.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ServerConfigFile`]: Serving process settings
//! - [`EmulatorSettings`]: Session defaults (project, debug)
//! - [`AdminConfig`]: Admin API settings
//! - [`FunctionEntry`]: Function deployed right after startup

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::RuntimeConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [runtime.execution]
/// timeout_ms = 5000
///
/// [server]
/// bind_addr = "127.0.0.1:8010"
/// region = "us-central1"
///
/// [emulator]
/// project_id = "my-project"
///
/// [admin]
/// enabled = true
/// token = "your-secret-token"
///
/// [[functions]]
/// name = "hello"
/// path = "./functions/hello.wasm"
///
/// [[functions]]
/// name = "on_upload"
/// path = "./functions/storage.wasm"
/// trigger = "storage"
/// resource = "uploads"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration (engine + execution settings).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Serving process configuration.
    #[serde(default)]
    pub server: ServerConfigFile,

    /// Session defaults.
    #[serde(default)]
    pub emulator: EmulatorSettings,

    /// Admin API configuration.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Functions to deploy after startup.
    #[serde(default)]
    pub functions: Vec<FunctionEntry>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Serving process configuration from config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfigFile {
    /// Bind address (e.g., "127.0.0.1:8010").
    #[serde(default = "defaults::bind_addr")]
    pub bind_addr: String,

    /// Region segment used in synthesized HTTP endpoints.
    #[serde(default = "defaults::region")]
    pub region: String,

    /// Request timeout in seconds.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long `stop` waits for the server to drain before aborting it.
    #[serde(default = "defaults::shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfigFile {
    fn default() -> Self {
        Self {
            bind_addr: defaults::bind_addr(),
            region: defaults::region(),
            request_timeout_secs: defaults::request_timeout_secs(),
            shutdown_timeout_secs: defaults::shutdown_timeout_secs(),
        }
    }
}

/// Session defaults used when the emulator is started from the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmulatorSettings {
    /// Project the session is tied to.
    #[serde(default = "defaults::project_id")]
    pub project_id: String,

    /// Start sessions in debug mode.
    #[serde(default)]
    pub debug: bool,
}

impl Default for EmulatorSettings {
    fn default() -> Self {
        Self {
            project_id: defaults::project_id(),
            debug: false,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    /// Enable Admin API.
    #[serde(default)]
    pub enabled: bool,

    /// Authentication token (required when enabled).
    ///
    /// Clients must include this token in the `X-Admin-Token` header.
    pub token: Option<String>,

    /// URL prefix for Admin API endpoints.
    #[serde(default = "defaults::admin_prefix")]
    pub prefix: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: None,
            prefix: defaults::admin_prefix(),
        }
    }
}

impl AdminConfig {
    /// Check if Admin API is properly configured.
    ///
    /// Returns `true` if enabled and token is set.
    pub fn is_configured(&self) -> bool {
        self.enabled && self.token.is_some()
    }
}

/// A function to deploy after startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionEntry {
    /// Function name, also the exported symbol looked up in the module.
    pub name: String,

    /// Path to the module file.
    pub path: String,

    /// Trigger tag: `http`, `background`, `storage`, or `pubsub`.
    #[serde(default = "defaults::trigger")]
    pub trigger: String,

    /// Bucket or topic for event triggers.
    #[serde(default)]
    pub resource: Option<String>,
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub fn bind_addr() -> String {
        "127.0.0.1:8010".to_string()
    }

    pub fn region() -> String {
        "us-central1".to_string()
    }

    pub const fn request_timeout_secs() -> u64 {
        70
    }

    pub const fn shutdown_timeout_secs() -> u64 {
        5
    }

    pub fn project_id() -> String {
        "local-project".to_string()
    }

    pub fn admin_prefix() -> String {
        "/admin".to_string()
    }

    pub fn trigger() -> String {
        "http".to_string()
    }
}
