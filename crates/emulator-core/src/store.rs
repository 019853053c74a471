//! Per-invocation execution context and store management.
//!
//! This module provides:
//! - [`WorkerContext`]: Per-invocation state accessible from host functions
//! - [`LogEntry`] and [`LogLevel`]: Structured logging from guest code
//! - [`ExecutionMetrics`]: Performance metrics for each invocation

use std::time::{Duration, Instant};

use wasmtime::{Store, StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::preview1::WasiP1Ctx;

use crate::WasmEngine;
use emulator_common::{ExecutionConfig, RuntimeError};

/// Per-invocation execution context.
///
/// Created for each call into a deployed function and dropped when the call
/// completes. Host functions reach it through [`wasmtime::Caller`].
pub struct WorkerContext {
    /// WASI preview1 context for guests compiled against WASI.
    pub wasi: WasiP1Ctx,

    /// Memory and table limits for this invocation.
    limits: StoreLimits,

    /// Unique request identifier for tracing.
    pub request_id: String,

    /// Logs collected from guest code.
    pub logs: Vec<LogEntry>,

    /// Execution metrics.
    pub metrics: ExecutionMetrics,

    /// Wall-clock deadline enforced through epoch interruption, if any.
    pub timeout_ms: Option<u64>,

    /// Execution start time.
    start_time: Instant,
}

/// A single log entry from guest code.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level (debug, info, warn, error).
    pub level: LogLevel,

    /// Log message content.
    pub message: String,

    /// Timestamp when the log was recorded.
    pub timestamp: Instant,
}

/// Log level for guest logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug-level messages.
    Debug,
    /// Informational messages.
    Info,
    /// Warning messages.
    Warn,
    /// Error messages.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Execution performance metrics.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetrics {
    /// Fuel consumed during execution.
    pub fuel_consumed: u64,

    /// Total execution duration.
    pub duration: Option<Duration>,
}

impl WorkerContext {
    /// Create a new worker context.
    ///
    /// Guest stdout/stderr are forwarded to the host only when
    /// `inherit_stdio` is set (debug sessions).
    pub fn new(request_id: String, inherit_stdio: bool) -> Self {
        Self::with_limits(request_id, inherit_stdio, StoreLimits::default())
    }

    fn with_limits(request_id: String, inherit_stdio: bool, limits: StoreLimits) -> Self {
        let mut builder = WasiCtxBuilder::new();
        if inherit_stdio {
            builder.inherit_stdout().inherit_stderr();
        }

        Self {
            wasi: builder.build_p1(),
            limits,
            request_id,
            logs: Vec::new(),
            metrics: ExecutionMetrics::default(),
            timeout_ms: None,
            start_time: Instant::now(),
        }
    }

    /// Add a log entry.
    pub fn log(&mut self, level: LogLevel, message: String) {
        self.logs.push(LogEntry {
            level,
            message,
            timestamp: Instant::now(),
        });
    }

    /// Get elapsed time since execution started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Finalize metrics after execution.
    pub fn finalize_metrics(&mut self) {
        self.metrics.duration = Some(self.start_time.elapsed());
    }
}

/// Create a new Wasmtime store for one invocation.
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
/// Without `fuel_metering` the store receives an unlimited budget.
pub fn create_store(
    engine: &WasmEngine,
    config: &ExecutionConfig,
    request_id: String,
    inherit_stdio: bool,
) -> Result<Store<WorkerContext>, RuntimeError> {
    let limits = StoreLimitsBuilder::new()
        .memory_size(config.max_memory_bytes())
        .build();
    let mut context = WorkerContext::with_limits(request_id, inherit_stdio, limits);
    if engine.config().epoch_interruption {
        context.timeout_ms = Some(config.timeout_ms);
    }
    let mut store = Store::new(engine.inner(), context);
    store.limiter(|ctx| &mut ctx.limits);

    // The engine always meters fuel; without a budget the store gets all of it.
    let fuel = if config.fuel_metering {
        config.max_fuel
    } else {
        u64::MAX
    };
    store
        .set_fuel(fuel)
        .map_err(|e| RuntimeError::invalid_config(format!("Failed to set fuel: {e}")))?;

    // One epoch tick per millisecond, see `engine::EPOCH_TICK`.
    if engine.config().epoch_interruption {
        store.set_epoch_deadline(config.timeout_ms);
        store.epoch_deadline_trap();
    }

    Ok(store)
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel(store: &Store<WorkerContext>) -> Option<u64> {
    store.get_fuel().ok()
}

/// Calculate fuel consumed.
pub fn calculate_fuel_consumed(initial_fuel: u64, store: &Store<WorkerContext>) -> u64 {
    let remaining = get_remaining_fuel(store).unwrap_or(0);
    initial_fuel.saturating_sub(remaining)
}
