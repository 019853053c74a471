//! Function Executor for the functions emulator.
//!
//! This crate provides the capability interface the controller invokes user
//! code through, plus its wasmtime-backed implementation:
//! - [`FunctionExecutor`] / [`Callable`]: resolve a function from a module path, invoke it
//! - [`Invocation`]: a synchronous value or a pending result
//! - [`WasmEngine`]: Configured Wasmtime engine shared by every function
//! - [`CompiledModule`]: Compiled WebAssembly module loaded from disk
//! - [`WorkerContext`]: Per-invocation execution context
//! - [`InstanceRunner`]: Instantiates a module and drives one call through the guest ABI
//! - [`WasmExecutor`]: The [`FunctionExecutor`] tying it all together
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WasmExecutor                        │
//! │  resolve(path, name) -> Arc<dyn Callable>               │
//! │  - WasmEngine (shared, epoch ticker)                    │
//! │  - InstanceRunner (linker with host functions)          │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │             WasmFunction (one per deploy)               │
//! │  - CompiledModule + validated export signature          │
//! └─────────────────────────────────────────────────────────┘
//!                            │ invoke(data)
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │            Store<WorkerContext> + Instance              │
//! │  (Per-invocation, isolated)                             │
//! │  - Fuel metering, epoch deadline, memory limit          │
//! │  - Captured guest logs                                  │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod executor;
pub mod instance;
pub mod module;
pub mod store;
pub mod wasm;

pub use engine::{EpochTicker, WasmEngine};
pub use executor::{
    CallContext, Callable, FunctionError, FunctionExecutor, Invocation, PendingResult,
};
pub use instance::{ExecutionResult, InstanceRunner};
pub use module::{CompiledModule, ExportSignature};
pub use store::{ExecutionMetrics, LogEntry, LogLevel, WorkerContext};
pub use wasm::WasmExecutor;
