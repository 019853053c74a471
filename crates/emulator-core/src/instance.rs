//! WebAssembly instance lifecycle management.
//!
//! This module provides [`InstanceRunner`], which handles one call into a
//! deployed function:
//!
//! 1. Instantiate the module with a fresh store
//! 2. Copy the invocation data into guest memory (through the guest's `alloc`)
//! 3. Call the export with the convention its [`ExportSignature`] names
//! 4. Read back the result and collect metrics

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use wasmtime::{Engine, Instance, Linker, Memory, Store, Trap};

use crate::store::{WorkerContext, calculate_fuel_consumed, get_remaining_fuel};
use crate::{CompiledModule, ExportSignature};
use emulator_common::RuntimeError;

/// Export the guest must provide to receive invocation data.
pub const MEMORY_EXPORT: &str = "memory";

/// Guest allocator export: `alloc(len: i32) -> i32`.
pub const ALLOC_EXPORT: &str = "alloc";

/// Result of executing a WebAssembly function.
#[derive(Debug)]
pub enum ExecutionResult {
    /// Execution completed successfully.
    Success {
        /// Bytes returned by a `DataWithResult` export.
        output: Option<Vec<u8>>,
    },

    /// Execution completed with a trap (runtime error).
    Trap {
        /// Description of the trap.
        message: String,
        /// Trap code if available.
        code: Option<String>,
    },
}

impl ExecutionResult {
    /// Returns `true` if execution was successful.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    /// Returns `true` if execution trapped.
    pub fn is_trap(&self) -> bool {
        matches!(self, ExecutionResult::Trap { .. })
    }
}

/// Instance lifecycle manager.
///
/// # Thread Safety
///
/// `InstanceRunner` is thread-safe and can be shared across multiple tasks.
/// Each execution uses its own [`Store`] for isolation.
pub struct InstanceRunner {
    engine: Arc<Engine>,
    linker: Linker<WorkerContext>,
}

impl InstanceRunner {
    /// Create a new instance runner with an empty linker.
    pub fn new(engine: Arc<Engine>) -> Self {
        let linker = Linker::new(&engine);
        Self { engine, linker }
    }

    /// Get a mutable reference to the linker.
    ///
    /// Use this to register host functions before sharing the runner.
    pub fn linker_mut(&mut self) -> &mut Linker<WorkerContext> {
        &mut self.linker
    }

    /// Execute `function` once.
    ///
    /// `input` is ignored for [`ExportSignature::Unit`] exports.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Instantiation fails
    /// - The guest lacks the memory/alloc exports a data call needs
    /// - Fuel is exhausted or the epoch deadline passes
    #[instrument(skip(self, module, store, input), fields(function = %function))]
    pub async fn execute(
        &self,
        module: &CompiledModule,
        store: &mut Store<WorkerContext>,
        function: &str,
        signature: ExportSignature,
        input: &[u8],
    ) -> Result<ExecutionResult, RuntimeError> {
        let start = Instant::now();
        let initial_fuel = get_remaining_fuel(store).unwrap_or(0);

        debug!("Instantiating module");

        let instance = self
            .linker
            .instantiate_async(&mut *store, module.as_module())
            .await
            .map_err(|e| RuntimeError::compilation_failed(format!("Instantiation failed: {e}")))?;

        let result = self.call(&instance, store, function, signature, input).await;

        let fuel_consumed = calculate_fuel_consumed(initial_fuel, store);
        store.data_mut().metrics.fuel_consumed = fuel_consumed;
        store.data_mut().finalize_metrics();

        let duration = start.elapsed();

        match result {
            Ok(output) => {
                info!(
                    duration_ms = duration.as_millis(),
                    fuel_consumed = fuel_consumed,
                    "Execution completed successfully"
                );
                Ok(ExecutionResult::Success { output })
            }
            Err(CallError::Runtime(err)) => Err(err),
            Err(CallError::Guest(trap)) => {
                if is_trap(&trap, Trap::OutOfFuel) {
                    warn!(
                        duration_ms = duration.as_millis(),
                        fuel_consumed = fuel_consumed,
                        "Execution terminated: fuel exhausted"
                    );
                    return Err(RuntimeError::FuelExhausted);
                }

                if is_trap(&trap, Trap::Interrupt) {
                    let duration_ms = store
                        .data()
                        .timeout_ms
                        .unwrap_or(duration.as_millis() as u64);
                    warn!(duration_ms, "Execution terminated: deadline exceeded");
                    return Err(RuntimeError::ExecutionTimeout { duration_ms });
                }

                let (message, code) = extract_trap_info(&trap);

                error!(
                    duration_ms = duration.as_millis(),
                    fuel_consumed = fuel_consumed,
                    trap_message = %message,
                    "Execution trapped"
                );

                Ok(ExecutionResult::Trap { message, code })
            }
        }
    }

    async fn call(
        &self,
        instance: &Instance,
        store: &mut Store<WorkerContext>,
        function: &str,
        signature: ExportSignature,
        input: &[u8],
    ) -> Result<Option<Vec<u8>>, CallError> {
        if !signature.takes_data() {
            let func = instance
                .get_typed_func::<(), ()>(&mut *store, function)
                .map_err(|e| RuntimeError::abi(format!("Export '{function}': {e}")))?;
            func.call_async(&mut *store, ())
                .await
                .map_err(CallError::Guest)?;
            return Ok(None);
        }

        let memory = instance
            .get_memory(&mut *store, MEMORY_EXPORT)
            .ok_or_else(|| RuntimeError::abi(format!("Module does not export '{MEMORY_EXPORT}'")))?;
        let (ptr, len) = write_input(instance, store, &memory, input).await?;

        match signature {
            ExportSignature::Data => {
                let func = instance
                    .get_typed_func::<(i32, i32), ()>(&mut *store, function)
                    .map_err(|e| RuntimeError::abi(format!("Export '{function}': {e}")))?;
                func.call_async(&mut *store, (ptr, len))
                    .await
                    .map_err(CallError::Guest)?;
                Ok(None)
            }
            ExportSignature::DataWithResult => {
                let func = instance
                    .get_typed_func::<(i32, i32), i64>(&mut *store, function)
                    .map_err(|e| RuntimeError::abi(format!("Export '{function}': {e}")))?;
                let packed = func
                    .call_async(&mut *store, (ptr, len))
                    .await
                    .map_err(CallError::Guest)?;
                let output = read_output(store, &memory, packed)?;
                Ok(Some(output))
            }
            ExportSignature::Unit => Ok(None),
        }
    }

    /// Get the engine reference.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

/// Failure of a single call: either the guest trapped or the host could not
/// drive the ABI.
enum CallError {
    Guest(wasmtime::Error),
    Runtime(RuntimeError),
}

impl From<RuntimeError> for CallError {
    fn from(err: RuntimeError) -> Self {
        Self::Runtime(err)
    }
}

/// Allocate guest memory through `alloc` and copy `input` into it.
async fn write_input(
    instance: &Instance,
    store: &mut Store<WorkerContext>,
    memory: &Memory,
    input: &[u8],
) -> Result<(i32, i32), CallError> {
    let len = i32::try_from(input.len())
        .map_err(|_| RuntimeError::abi(format!("Input too large: {} bytes", input.len())))?;

    let alloc = instance
        .get_typed_func::<i32, i32>(&mut *store, ALLOC_EXPORT)
        .map_err(|_| {
            RuntimeError::abi(format!(
                "Module does not export '{ALLOC_EXPORT}(len: i32) -> i32'"
            ))
        })?;

    let ptr = alloc
        .call_async(&mut *store, len)
        .await
        .map_err(CallError::Guest)?;

    memory
        .write(&mut *store, ptr as u32 as usize, input)
        .map_err(|e| RuntimeError::abi(format!("Input write at {ptr} failed: {e}")))?;

    debug!(ptr, len, "Input written to guest memory");

    Ok((ptr, len))
}

/// Read the bytes a `DataWithResult` export pointed at.
fn read_output(
    store: &Store<WorkerContext>,
    memory: &Memory,
    packed: i64,
) -> Result<Vec<u8>, RuntimeError> {
    let (ptr, len) = unpack_ptr_len(packed);
    let mut output = vec![0u8; len as usize];
    memory
        .read(store, ptr as usize, &mut output)
        .map_err(|e| RuntimeError::abi(format!("Result read at {ptr}+{len} failed: {e}")))?;
    Ok(output)
}

/// Split a packed `(ptr << 32) | len` result.
pub fn unpack_ptr_len(packed: i64) -> (u32, u32) {
    let bits = packed as u64;
    ((bits >> 32) as u32, bits as u32)
}

/// Extract human-readable trap information.
fn extract_trap_info(error: &wasmtime::Error) -> (String, Option<String>) {
    let message = error.root_cause().to_string();
    let code = error.downcast_ref::<Trap>().map(|trap| format!("{trap:?}"));
    (message, code)
}

fn is_trap(error: &wasmtime::Error, expected: Trap) -> bool {
    error
        .downcast_ref::<Trap>()
        .is_some_and(|trap| *trap == expected)
}

impl std::fmt::Debug for InstanceRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRunner").finish_non_exhaustive()
    }
}
