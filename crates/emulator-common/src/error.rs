//! Error types for the functions emulator.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`RuntimeError`]: Failures of the Function Executor (loading, compiling, running guest code)
//! - [`EmulatorError`]: Failures surfaced by the controller to its callers

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the Function Executor.
///
/// These errors represent failures that can occur while resolving a function
/// from an on-disk module or while executing it.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The source path does not resolve to a loadable module.
    #[error("Module not found: {path}")]
    ModuleNotFound {
        /// The path that was requested.
        path: PathBuf,
    },

    /// The module was found but could not be compiled.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// The module loaded but does not export a function with the requested name.
    #[error("Function '{function}' is not exported by {path}")]
    FunctionNotFound {
        /// Module path.
        path: PathBuf,
        /// Requested export name.
        function: String,
    },

    /// The export exists but its signature is not one the emulator can call.
    #[error("Function '{function}' has an unsupported signature: {signature}")]
    UnsupportedSignature {
        /// Export name.
        function: String,
        /// Rendered signature of the export.
        signature: String,
    },

    /// Execution exceeded the configured timeout.
    #[error("Execution timeout after {duration_ms}ms")]
    ExecutionTimeout {
        /// The timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// Execution exhausted the configured fuel limit.
    #[error("Fuel exhausted: CPU limit exceeded")]
    FuelExhausted,

    /// A WebAssembly trap occurred during execution.
    #[error("Wasm trap: {message}")]
    Trap {
        /// Description of the trap.
        message: String,
    },

    /// The guest broke the calling convention (missing export, bad pointer, ...).
    #[error("Guest ABI violation: {reason}")]
    Abi {
        /// What the guest got wrong.
        reason: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl RuntimeError {
    /// Create a new `ModuleNotFound` error.
    pub fn module_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ModuleNotFound { path: path.into() }
    }

    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `FunctionNotFound` error.
    pub fn function_not_found(path: impl Into<PathBuf>, function: impl Into<String>) -> Self {
        Self::FunctionNotFound {
            path: path.into(),
            function: function.into(),
        }
    }

    /// Create a new `Trap` error.
    pub fn trap(message: impl Into<String>) -> Self {
        Self::Trap {
            message: message.into(),
        }
    }

    /// Create a new `Abi` error.
    pub fn abi(reason: impl Into<String>) -> Self {
        Self::Abi {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the module itself could not be loaded.
    pub fn is_module_error(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotFound { .. } | Self::CompilationFailed { .. } | Self::Io(_)
        )
    }

    /// Returns `true` if a resource limit was exceeded.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::FuelExhausted | Self::ExecutionTimeout { .. })
    }
}

/// Errors surfaced by the emulator controller.
///
/// Lifecycle errors (`NotRunning`, `AlreadyRunning`) signal misuse of the
/// state machine and are always returned to the caller. Invocation failures
/// inside user functions are *not* errors: they are reported as a normal
/// outcome of `call`.
#[derive(Error, Debug)]
pub enum EmulatorError {
    /// The operation requires a running emulator.
    #[error("Emulator is not running")]
    NotRunning,

    /// `start` was called on a running emulator.
    #[error("Emulator is already running")]
    AlreadyRunning,

    /// The source path does not resolve to a loadable module.
    #[error("Module not found: {path}: {reason}")]
    ModuleNotFound {
        /// Requested module path.
        path: PathBuf,
        /// Why loading failed.
        reason: String,
    },

    /// No function with this name is deployed, or the module does not export it.
    #[error("Function not found: {name}")]
    FunctionNotFound {
        /// Function name.
        name: String,
    },

    /// The function exists but cannot be deployed as requested.
    #[error("Invalid function '{name}': {reason}")]
    InvalidFunction {
        /// Function name.
        name: String,
        /// Validation failure.
        reason: String,
    },

    /// The trigger configuration is not valid.
    #[error("Invalid trigger: {reason}")]
    InvalidTrigger {
        /// Description of the problem.
        reason: String,
    },

    /// The serving process could not bind its listener.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The serving process failed while starting or stopping.
    #[error("Server error: {reason}")]
    Server {
        /// Description of the failure.
        reason: String,
    },

    /// The Function Executor could not be initialized.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl EmulatorError {
    /// Create a new `FunctionNotFound` error.
    pub fn function_not_found(name: impl Into<String>) -> Self {
        Self::FunctionNotFound { name: name.into() }
    }

    /// Create a new `InvalidTrigger` error.
    pub fn invalid_trigger(reason: impl Into<String>) -> Self {
        Self::InvalidTrigger {
            reason: reason.into(),
        }
    }

    /// Create a new `Server` error.
    pub fn server(reason: impl Into<String>) -> Self {
        Self::Server {
            reason: reason.into(),
        }
    }

    /// Map a resolution failure of `function` from the executor to the
    /// controller's taxonomy.
    pub fn from_resolve(name: &str, path: impl Into<PathBuf>, error: RuntimeError) -> Self {
        match error {
            RuntimeError::FunctionNotFound { .. } => Self::function_not_found(name),
            RuntimeError::UnsupportedSignature { signature, .. } => Self::InvalidFunction {
                name: name.to_string(),
                reason: format!("unsupported signature {signature}"),
            },
            other if other.is_module_error() => Self::ModuleNotFound {
                path: path.into(),
                reason: other.to_string(),
            },
            other => Self::Runtime(other),
        }
    }

    /// Returns `true` if this error signals a state machine misuse.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::NotRunning | Self::AlreadyRunning)
    }

    /// Returns `true` if a module or function could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotFound { .. } | Self::FunctionNotFound { .. }
        )
    }
}
