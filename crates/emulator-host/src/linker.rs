//! Host function registration for Wasmtime linkers.

use std::sync::Arc;

use emulator_common::{RuntimeConfig, RuntimeError};
use emulator_core::store::WorkerContext;
use emulator_core::{InstanceRunner, WasmEngine, WasmExecutor};
use tracing::{info, warn};
use wasmtime::{Caller, Linker};

use crate::logging::{GuestLogger, level_from_i32};

/// Build a [`WasmExecutor`] with every host function registered.
///
/// # Errors
///
/// Returns an error if the engine cannot be created or a host function
/// fails to register.
pub fn create_executor(config: &RuntimeConfig) -> Result<WasmExecutor, RuntimeError> {
    let engine = WasmEngine::new(&config.engine)?;
    let runner = create_instance_runner(&engine)?;

    info!(
        timeout_ms = config.execution.timeout_ms,
        max_fuel = config.execution.max_fuel,
        "Function executor ready"
    );

    Ok(WasmExecutor::new(engine, runner, config.execution.clone()))
}

/// Create an [`InstanceRunner`] whose linker carries every host function.
///
/// # Errors
///
/// Returns an error if registration fails.
pub fn create_instance_runner(engine: &WasmEngine) -> Result<InstanceRunner, RuntimeError> {
    let mut runner = InstanceRunner::new(Arc::new(engine.inner().clone()));
    register_all(runner.linker_mut())?;
    Ok(runner)
}

/// Register all standard host functions on a linker:
/// - `env::log`
/// - WASI preview1 (`wasi_snapshot_preview1::*`)
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(linker: &mut Linker<WorkerContext>) -> Result<(), RuntimeError> {
    register_logging(linker)?;
    register_wasi(linker)?;
    Ok(())
}

/// Register WASI preview1 backed by the invocation's [`WorkerContext::wasi`].
///
/// # Errors
///
/// Returns an error if registration fails.
pub fn register_wasi(linker: &mut Linker<WorkerContext>) -> Result<(), RuntimeError> {
    wasmtime_wasi::preview1::add_to_linker_async(linker, |ctx: &mut WorkerContext| &mut ctx.wasi)
        .map_err(|e| RuntimeError::invalid_config(format!("Failed to register WASI: {e}")))
}

/// Register `env::log(level: i32, ptr: i32, len: i32)`.
///
/// The message is read as UTF-8 from the guest's exported `memory`. Calls
/// with an out-of-bounds range are dropped with a warning rather than
/// trapping the guest.
///
/// # Errors
///
/// Returns an error if registration fails.
pub fn register_logging(linker: &mut Linker<WorkerContext>) -> Result<(), RuntimeError> {
    linker
        .func_wrap(
            "env",
            "log",
            |mut caller: Caller<'_, WorkerContext>, level: i32, ptr: i32, len: i32| {
                let Some(message) = read_guest_str(&mut caller, ptr, len) else {
                    return;
                };
                GuestLogger::record(caller.data_mut(), level_from_i32(level), &message);
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register log function: {e}"))
        })?;

    Ok(())
}

fn read_guest_str(caller: &mut Caller<'_, WorkerContext>, ptr: i32, len: i32) -> Option<String> {
    let (Ok(start), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
        warn!(ptr, len, "Negative guest pointer or length");
        return None;
    };

    let memory = caller
        .get_export("memory")
        .and_then(wasmtime::Extern::into_memory);
    let Some(memory) = memory else {
        warn!("Memory export not found in guest module");
        return None;
    };

    let data = memory.data(&*caller);
    let Some(bytes) = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
    else {
        warn!(
            ptr,
            len,
            memory_size = data.len(),
            "Guest log range out of bounds"
        );
        return None;
    };

    Some(String::from_utf8_lossy(bytes).into_owned())
}
