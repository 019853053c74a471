//! Host functions for the functions emulator.
//!
//! Guest modules import these to interact with the emulator:
//!
//! - [`logging`]: `env::log(level, ptr, len)`, captured per invocation and
//!   forwarded to `tracing`
//! - WASI preview1, so modules built for `wasm32-wasip1` instantiate
//!
//! [`linker::create_executor`] wires everything into a ready
//! [`emulator_core::WasmExecutor`].

pub mod linker;
pub mod logging;

pub use linker::{create_executor, create_instance_runner, register_all};
pub use logging::GuestLogger;
