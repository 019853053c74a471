//! WebAssembly module loading and export introspection.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's [`Module`]
//! that loads a function's source module from disk and answers whether it
//! exports a callable with a given name.
//!
//! # Source formats
//!
//! - **`.wat`**: WebAssembly text, compiled on load
//! - **anything else**: WebAssembly binary, magic-number checked before compiling

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, instrument};
use wasmtime::{Engine, ExternType, FuncType, Module, ValType};

use emulator_common::RuntimeError;

/// The calling conventions the emulator knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportSignature {
    /// `() -> ()`: takes no data, produces no result.
    Unit,
    /// `(ptr: i32, len: i32) -> ()`: consumes JSON data, produces no result.
    Data,
    /// `(ptr: i32, len: i32) -> i64`: consumes JSON data, returns `(ptr << 32) | len`.
    DataWithResult,
}

impl ExportSignature {
    /// Classify a function type, or `None` if it is not supported.
    pub fn from_func_type(ty: &FuncType) -> Option<Self> {
        let params: Vec<ValType> = ty.params().collect();
        let results: Vec<ValType> = ty.results().collect();

        let data_params = params.len() == 2 && params.iter().all(|p| matches!(p, ValType::I32));

        match (params.len(), results.as_slice()) {
            (0, []) => Some(Self::Unit),
            (2, []) if data_params => Some(Self::Data),
            (2, [ValType::I64]) if data_params => Some(Self::DataWithResult),
            _ => None,
        }
    }

    /// Whether the guest receives the invocation data.
    pub fn takes_data(self) -> bool {
        !matches!(self, Self::Unit)
    }
}

/// A compiled WebAssembly module.
///
/// `CompiledModule` is cheap to clone and can be shared across concurrent
/// invocations; every invocation instantiates it in its own store.
#[derive(Clone)]
pub struct CompiledModule {
    /// The compiled Wasmtime module.
    inner: Module,

    /// Where the module was loaded from.
    source: PathBuf,

    /// Hash of the original module bytes.
    content_hash: String,

    /// When this module was compiled.
    compiled_at: Instant,
}

impl CompiledModule {
    /// Load and compile the module at `path`.
    ///
    /// Compilation runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ModuleNotFound`] if the file cannot be read and
    /// [`RuntimeError::CompilationFailed`] if it is not a valid module.
    #[instrument(skip(engine), fields(path = %path.display()))]
    pub async fn from_file(engine: &Engine, path: &Path) -> Result<Self, RuntimeError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            debug!(error = %e, "Module source unreadable");
            RuntimeError::module_not_found(path)
        })?;

        let engine = engine.clone();
        let source = path.to_path_buf();
        let is_text = is_wat_path(path);

        tokio::task::spawn_blocking(move || {
            let module = if is_text {
                let text = std::str::from_utf8(&bytes).map_err(|e| {
                    RuntimeError::compilation_failed(format!("WAT source is not UTF-8: {e}"))
                })?;
                Self::from_wat(&engine, text)?
            } else {
                Self::from_bytes(&engine, &bytes)?
            };
            Ok(module.with_source(source))
        })
        .await
        .map_err(|e| RuntimeError::compilation_failed(format!("Compilation task failed: {e}")))?
    }

    /// Compile a core module from WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails (e.g., invalid Wasm).
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine, bytes).map_err(|e| {
            RuntimeError::compilation_failed(format!("Core module compilation failed: {e}"))
        })?;

        let content_hash = compute_hash(bytes);

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "Core module compiled"
        );

        Ok(Self {
            inner: module,
            source: PathBuf::new(),
            content_hash,
            compiled_at: Instant::now(),
        })
    }

    /// Compile a core module from WAT (WebAssembly Text Format).
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        let module = Module::new(engine, wat).map_err(|e| {
            RuntimeError::compilation_failed(format!("WAT compilation failed: {e}"))
        })?;

        let content_hash = compute_hash(wat.as_bytes());

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "WAT module compiled"
        );

        Ok(Self {
            inner: module,
            source: PathBuf::new(),
            content_hash,
            compiled_at: Instant::now(),
        })
    }

    fn with_source(mut self, source: PathBuf) -> Self {
        self.source = source;
        self
    }

    /// Look up an exported function and classify its calling convention.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::FunctionNotFound`] if there is no function
    /// export named `name`, or [`RuntimeError::UnsupportedSignature`] if it
    /// has a signature the emulator cannot call.
    pub fn export_signature(&self, name: &str) -> Result<ExportSignature, RuntimeError> {
        let Some(ExternType::Func(ty)) = self.inner.get_export(name) else {
            return Err(RuntimeError::function_not_found(&self.source, name));
        };

        ExportSignature::from_func_type(&ty).ok_or_else(|| RuntimeError::UnsupportedSignature {
            function: name.to_string(),
            signature: render_signature(&ty),
        })
    }

    /// Names of every function export, for diagnostics.
    pub fn function_exports(&self) -> Vec<String> {
        self.inner
            .exports()
            .filter(|export| matches!(export.ty(), ExternType::Func(_)))
            .map(|export| export.name().to_string())
            .collect()
    }

    /// Get the inner core module.
    pub fn as_module(&self) -> &Module {
        &self.inner
    }

    /// Path the module was loaded from (empty for in-memory modules).
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Get the content hash of the original module bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get when this module was compiled.
    pub fn compiled_at(&self) -> Instant {
        self.compiled_at
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() < 8 {
            return Err(RuntimeError::compilation_failed(
                "Invalid Wasm: file too small",
            ));
        }

        if &bytes[0..4] != b"\0asm" {
            return Err(RuntimeError::compilation_failed(
                "Invalid Wasm: bad magic number",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("source", &self.source)
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

fn is_wat_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wat"))
}

fn render_signature(ty: &FuncType) -> String {
    let params: Vec<String> = ty.params().map(|p| p.to_string()).collect();
    let results: Vec<String> = ty.results().map(|r| r.to_string()).collect();
    format!("({}) -> ({})", params.join(", "), results.join(", "))
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
