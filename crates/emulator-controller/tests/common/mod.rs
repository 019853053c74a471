//! Shared fixtures for the controller integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use emulator_common::{RuntimeConfig, RuntimeError};
use emulator_controller::{Controller, ControllerConfig};
use emulator_core::{CallContext, Callable, FunctionError, FunctionExecutor, Invocation};

/// Guest module used by the end-to-end tests.
///
/// - `echo` returns its argument
/// - `greet` returns the bare text `hello`
/// - `ping` takes nothing and returns nothing
/// - `boom` traps
pub const GUEST_WAT: &str = r#"
    (module
        (memory (export "memory") 1)
        (global $bump (mut i32) (i32.const 1024))
        (data (i32.const 16) "hello")

        (func (export "alloc") (param $len i32) (result i32)
            (local $ptr i32)
            (local.set $ptr (global.get $bump))
            (global.set $bump (i32.add (global.get $bump) (local.get $len)))
            (local.get $ptr))

        (func (export "echo") (param $ptr i32) (param $len i32) (result i64)
            (i64.or
                (i64.shl (i64.extend_i32_u (local.get $ptr)) (i64.const 32))
                (i64.extend_i32_u (local.get $len))))

        (func (export "greet") (param i32 i32) (result i64)
            (i64.const 0x0000001000000005))

        (func (export "ping"))

        (func (export "boom") (param i32 i32)
            unreachable)
    )
"#;

/// Write [`GUEST_WAT`] into `dir`.
pub fn write_guest(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("functions.wat");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(GUEST_WAT.as_bytes()).unwrap();
    path
}

/// Controller backed by the wasm executor.
pub fn wasm_controller() -> Controller {
    wasm_controller_with(ControllerConfig::default())
}

/// Controller backed by the wasm executor, with `config`.
pub fn wasm_controller_with(config: ControllerConfig) -> Controller {
    let executor = emulator_host::create_executor(&RuntimeConfig::default()).unwrap();
    Controller::new(Arc::new(executor), config)
}

/// What a [`Scripted`] function does when invoked.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Return the data synchronously.
    Echo,
    /// Return the data after a delay.
    Deferred(Duration),
    /// Throw synchronously.
    Throw,
    /// Reject after yielding.
    Reject,
    /// Panic inside `invoke`.
    Panic,
    /// Never resolve.
    Hang,
}

/// A function whose behavior is fixed by its name.
#[derive(Debug)]
pub struct Scripted {
    name: String,
    behavior: Behavior,
}

impl Callable for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, data: Value, _ctx: CallContext) -> Result<Invocation, FunctionError> {
        match self.behavior {
            Behavior::Echo => Ok(Invocation::Ready(data)),
            Behavior::Deferred(delay) => Ok(Invocation::Pending(Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok::<_, FunctionError>(data)
            }))),
            Behavior::Throw => Err(FunctionError::thrown("bad input")),
            Behavior::Reject => Ok(Invocation::Pending(Box::pin(async {
                tokio::task::yield_now().await;
                Err::<Value, _>(FunctionError::thrown("rejected"))
            }))),
            Behavior::Panic => panic!("function exploded"),
            Behavior::Hang => Ok(Invocation::Pending(Box::pin(std::future::pending::<
                Result<Value, FunctionError>,
            >()))),
        }
    }
}

/// Executor that resolves a fixed set of scripted functions.
///
/// Any path resolves except ones whose file name starts with `missing`.
pub struct ScriptedExecutor;

impl ScriptedExecutor {
    fn behavior(function: &str) -> Option<Behavior> {
        Some(match function {
            "echo" => Behavior::Echo,
            "slow" => Behavior::Deferred(Duration::from_millis(100)),
            "throw" => Behavior::Throw,
            "reject" => Behavior::Reject,
            "panic" => Behavior::Panic,
            "hang" => Behavior::Hang,
            _ => return None,
        })
    }
}

#[async_trait]
impl FunctionExecutor for ScriptedExecutor {
    async fn resolve(
        &self,
        source: &Path,
        function: &str,
    ) -> Result<Arc<dyn Callable>, RuntimeError> {
        let missing = source
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("missing"));
        if missing {
            return Err(RuntimeError::module_not_found(source));
        }

        let behavior = Self::behavior(function)
            .ok_or_else(|| RuntimeError::function_not_found(source, function))?;
        Ok(Arc::new(Scripted {
            name: function.to_string(),
            behavior,
        }))
    }
}

/// Controller backed by [`ScriptedExecutor`] with a short invocation deadline.
pub fn scripted_controller() -> Controller {
    let config = ControllerConfig::default().with_invocation_timeout(Duration::from_millis(200));
    Controller::new(Arc::new(ScriptedExecutor), config)
}
