//! The wasmtime-backed [`FunctionExecutor`].
//!
//! Each resolved function keeps its [`CompiledModule`]; every invocation gets a
//! fresh store and instance, so deployed functions share no guest state.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};
use wasmtime::Store;

use crate::executor::{CallContext, Callable, FunctionError, FunctionExecutor, Invocation};
use crate::instance::{ExecutionResult, InstanceRunner};
use crate::store::{WorkerContext, create_store};
use crate::{CompiledModule, EpochTicker, ExportSignature, WasmEngine};
use emulator_common::{ExecutionConfig, RuntimeError};

/// Executor that runs WebAssembly modules through wasmtime.
pub struct WasmExecutor {
    engine: WasmEngine,
    runner: Arc<InstanceRunner>,
    execution: ExecutionConfig,
    _ticker: Option<EpochTicker>,
}

impl WasmExecutor {
    /// Create an executor from a prepared runner.
    ///
    /// The runner's linker must already hold every host function guests may
    /// import. The epoch ticker is started here and stopped when the
    /// executor is dropped.
    pub fn new(engine: WasmEngine, runner: InstanceRunner, execution: ExecutionConfig) -> Self {
        let ticker = engine.spawn_epoch_ticker();
        Self {
            engine,
            runner: Arc::new(runner),
            execution,
            _ticker: ticker,
        }
    }

    /// The shared engine.
    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }

    /// Per-invocation limits.
    pub fn execution_config(&self) -> &ExecutionConfig {
        &self.execution
    }
}

impl std::fmt::Debug for WasmExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmExecutor")
            .field("engine", &self.engine)
            .field("timeout_ms", &self.execution.timeout_ms)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl FunctionExecutor for WasmExecutor {
    #[instrument(skip(self), fields(source = %source.display()))]
    async fn resolve(
        &self,
        source: &Path,
        function: &str,
    ) -> Result<Arc<dyn Callable>, RuntimeError> {
        let module = CompiledModule::from_file(self.engine.inner(), source).await?;
        let signature = module.export_signature(function)?;

        debug!(?signature, "Function resolved");

        Ok(Arc::new(WasmFunction {
            name: function.to_string(),
            module,
            signature,
            engine: self.engine.clone(),
            runner: Arc::clone(&self.runner),
            execution: self.execution.clone(),
        }))
    }
}

/// One exported function of a compiled module.
struct WasmFunction {
    name: String,
    module: CompiledModule,
    signature: ExportSignature,
    engine: WasmEngine,
    runner: Arc<InstanceRunner>,
    execution: ExecutionConfig,
}

impl std::fmt::Debug for WasmFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

impl Callable for WasmFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, data: Value, ctx: CallContext) -> Result<Invocation, FunctionError> {
        let input = if self.signature.takes_data() {
            serde_json::to_vec(&data)
                .map_err(|e| FunctionError::thrown(format!("Unserializable data: {e}")))?
        } else {
            Vec::new()
        };

        let mut store = create_store(&self.engine, &self.execution, ctx.request_id, ctx.debug)?;
        let module = self.module.clone();
        let runner = Arc::clone(&self.runner);
        let name = self.name.clone();
        let signature = self.signature;

        Ok(Invocation::Pending(Box::pin(async move {
            run_once(&runner, &module, &mut store, &name, signature, &input).await
        })))
    }
}

async fn run_once(
    runner: &InstanceRunner,
    module: &CompiledModule,
    store: &mut Store<WorkerContext>,
    name: &str,
    signature: ExportSignature,
    input: &[u8],
) -> Result<Value, FunctionError> {
    let result = runner
        .execute(module, store, name, signature, input)
        .await?;

    match result {
        ExecutionResult::Success { output: None } => Ok(Value::Null),
        ExecutionResult::Success {
            output: Some(bytes),
        } => Ok(decode_output(&bytes)),
        ExecutionResult::Trap { message, code } => Err(FunctionError::Thrown { message, code }),
    }
}

/// Decode result bytes as JSON, falling back to a (lossy) string value.
pub fn decode_output(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
