//! Common types, errors, and configuration for the functions emulator.
//!
//! This crate provides shared functionality used across the emulator workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for runtime, server, and session settings
//! - The TOML configuration file format

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{EngineConfig, ExecutionConfig, RuntimeConfig};
pub use config_file::{
    AdminConfig, ConfigFile, ConfigFileError, EmulatorSettings, FunctionEntry, ServerConfigFile,
};
pub use error::{EmulatorError, RuntimeError};
