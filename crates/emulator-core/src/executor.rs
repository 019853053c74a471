//! The capability interface between the controller and user code.
//!
//! The controller never loads or runs modules itself. It asks a
//! [`FunctionExecutor`] to resolve `(source_path, function_name)` into a
//! [`Callable`], and later invokes that callable with trigger-shaped data.
//! An invocation either produces a value right away or hands back a
//! [`PendingResult`] the caller awaits.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use emulator_common::RuntimeError;

/// A deferred invocation result.
///
/// Resolution yields the function's value; an `Err` is a rejection and is
/// treated exactly like a thrown error.
pub type PendingResult = Pin<Box<dyn Future<Output = Result<Value, FunctionError>> + Send>>;

/// What a single call into user code produced.
pub enum Invocation {
    /// The function returned synchronously.
    Ready(Value),
    /// The function returned something awaitable.
    Pending(PendingResult),
}

impl Invocation {
    /// Returns `true` if the result is already available.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// A failure raised by user code: a thrown error, a rejection, or a limit hit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FunctionError {
    /// The function threw (or its pending result rejected).
    #[error("{message}")]
    Thrown {
        /// Error description.
        message: String,
        /// Runtime-specific error code, if any.
        code: Option<String>,
    },

    /// The function ran past its deadline.
    #[error("function timed out after {duration_ms}ms")]
    TimedOut {
        /// The deadline in milliseconds.
        duration_ms: u64,
    },
}

impl FunctionError {
    /// Create a new `Thrown` error without a code.
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::Thrown {
            message: message.into(),
            code: None,
        }
    }

    /// Returns `true` if the function exceeded its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

impl From<RuntimeError> for FunctionError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::ExecutionTimeout { duration_ms } => Self::TimedOut { duration_ms },
            RuntimeError::FuelExhausted => Self::Thrown {
                message: RuntimeError::FuelExhausted.to_string(),
                code: Some("OutOfFuel".into()),
            },
            other => Self::thrown(other.to_string()),
        }
    }
}

/// Per-call information handed to the executor.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Identifier used to correlate logs of one invocation.
    pub request_id: String,
    /// Debug sessions forward guest stdio to the host.
    pub debug: bool,
}

impl CallContext {
    /// Create a context for a non-debug call.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            debug: false,
        }
    }

    /// Set the debug flag.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// A resolved, invocable function.
pub trait Callable: Send + Sync + fmt::Debug {
    /// The exported name this callable was resolved from.
    fn name(&self) -> &str;

    /// Invoke the function once with already-shaped data.
    ///
    /// # Errors
    ///
    /// Returns the synchronous failure of the call. Asynchronous failures
    /// surface through the [`PendingResult`] instead.
    fn invoke(&self, data: Value, ctx: CallContext) -> Result<Invocation, FunctionError>;
}

/// Loads modules and resolves exported functions.
#[async_trait]
pub trait FunctionExecutor: Send + Sync {
    /// Resolve `function` from the module at `source`.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::ModuleNotFound`] / [`RuntimeError::CompilationFailed`] if
    ///   the path does not hold a loadable module
    /// - [`RuntimeError::FunctionNotFound`] if the module does not export `function`
    /// - [`RuntimeError::UnsupportedSignature`] if the export cannot be called
    async fn resolve(
        &self,
        source: &Path,
        function: &str,
    ) -> Result<Arc<dyn Callable>, RuntimeError>;
}
