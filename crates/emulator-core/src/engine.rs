//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is shared by every deployed function. It is:
//! - Thread-safe and cheap to clone
//! - Set up with fuel metering and epoch interruption for resource limiting
//! - Optionally backed by the pooling allocator

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, InstanceAllocationStrategy, PoolingAllocationConfig};

use emulator_common::{EngineConfig, RuntimeError};

/// Interval between epoch increments.
///
/// Store deadlines are expressed in ticks of this length, so an epoch
/// deadline of `timeout_ms` ticks equals the configured timeout.
pub const EPOCH_TICK: Duration = Duration::from_millis(1);

/// Thread-safe WebAssembly engine wrapper.
///
/// The engine is configured with:
/// - **Fuel Metering**: deterministic CPU limiting per invocation
/// - **Epoch Interruption**: wall-clock limiting, driven by an [`EpochTicker`]
/// - **Async Support**: guest calls run as futures on the tokio runtime
/// - **Pooling Allocator** (optional): pre-allocated instance slots
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is invalid or the
    /// pooling allocator cannot be initialized.
    pub fn new(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let mut wasmtime_config = Config::new();

        wasmtime_config.async_support(true);
        wasmtime_config.consume_fuel(true);

        if config.epoch_interruption {
            wasmtime_config.epoch_interruption(true);
        }

        wasmtime_config.cranelift_opt_level(wasmtime::OptLevel::Speed);

        if config.pooling_allocator {
            let pooling_config = Self::create_pooling_config(config);

            wasmtime_config
                .allocation_strategy(InstanceAllocationStrategy::Pooling(pooling_config));

            info!(
                max_instances = config.max_instances,
                instance_memory_mb = config.instance_memory_mb,
                "Pooling allocator enabled"
            );
        }

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!("Wasmtime engine initialized");

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Create pooling allocation configuration.
    fn create_pooling_config(config: &EngineConfig) -> PoolingAllocationConfig {
        let mut pooling = PoolingAllocationConfig::default();

        pooling.total_core_instances(config.max_instances);
        pooling.total_memories(config.max_instances);
        pooling.total_tables(config.max_instances);

        let max_memory_bytes = (config.instance_memory_mb as usize) * 1024 * 1024;
        pooling.max_memory_size(max_memory_bytes);

        pooling
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Increment the epoch counter.
    pub fn increment_epoch(&self) {
        self.engine.increment_epoch();
    }

    /// Check if the pooling allocator is enabled.
    pub fn is_pooling_enabled(&self) -> bool {
        self.config.pooling_allocator
    }

    /// Spawn a thread that increments the epoch every [`EPOCH_TICK`].
    ///
    /// Returns `None` when epoch interruption is disabled. The ticker runs on
    /// its own OS thread so deadlines fire even while a guest monopolizes a
    /// runtime worker; it stops when the returned handle is dropped.
    pub fn spawn_epoch_ticker(&self) -> Option<EpochTicker> {
        if !self.config.epoch_interruption {
            return None;
        }

        let engine = Arc::clone(&self.engine);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let spawned = std::thread::Builder::new()
            .name("epoch-ticker".into())
            .spawn(move || {
                while !stop_flag.load(Ordering::Relaxed) {
                    std::thread::sleep(EPOCH_TICK);
                    engine.increment_epoch();
                }
            });

        match spawned {
            Ok(handle) => {
                debug!(tick_us = EPOCH_TICK.as_micros(), "Epoch ticker started");
                Some(EpochTicker {
                    stop,
                    handle: Some(handle),
                })
            }
            Err(e) => {
                warn!(error = %e, "Failed to start epoch ticker, deadlines disabled");
                None
            }
        }
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("pooling_allocator", &self.config.pooling_allocator)
            .field("epoch_interruption", &self.config.epoch_interruption)
            .finish_non_exhaustive()
    }
}

/// Background epoch ticker. Stopped and joined on drop.
#[derive(Debug)]
pub struct EpochTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EngineConfig {
        EngineConfig {
            pooling_allocator: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_engine_creation_default() {
        let engine = WasmEngine::new(&EngineConfig::default());
        assert!(engine.is_ok());
        assert!(!engine.unwrap().is_pooling_enabled());
    }

    #[test]
    fn test_engine_creation_pooling() {
        let config = EngineConfig {
            pooling_allocator: true,
            max_instances: 4,
            instance_memory_mb: 1,
            ..Default::default()
        };
        let engine = WasmEngine::new(&config).unwrap();
        assert!(engine.is_pooling_enabled());
    }

    #[test]
    fn test_engine_epoch_increment() {
        let engine = WasmEngine::new(&test_config()).unwrap();

        engine.increment_epoch();
        engine.increment_epoch();
    }

    #[test]
    fn test_ticker_disabled_without_epochs() {
        let config = EngineConfig {
            epoch_interruption: false,
            ..test_config()
        };
        let engine = WasmEngine::new(&config).unwrap();
        assert!(engine.spawn_epoch_ticker().is_none());
    }

    #[test]
    fn test_ticker_starts_and_stops() {
        let engine = WasmEngine::new(&test_config()).unwrap();
        let ticker = engine.spawn_epoch_ticker();
        assert!(ticker.is_some());
        std::thread::sleep(EPOCH_TICK * 3);
        drop(ticker);
    }

    #[test]
    fn test_engine_debug() {
        let engine = WasmEngine::new(&test_config()).unwrap();

        let debug_str = format!("{engine:?}");
        assert!(debug_str.contains("WasmEngine"));
        assert!(debug_str.contains("pooling_allocator"));
    }
}
