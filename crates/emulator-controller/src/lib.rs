//! Controller for the functions emulator.
//!
//! This crate is the emulator's control plane. It handles:
//!
//! - The emulator lifecycle (`start`, `stop`, `restart`) and its serving process
//! - The registry of deployed functions and their triggers
//! - Dispatching calls with trigger-shaped arguments
//! - The fault boundary that turns failing functions into ordinary results
//! - The HTTP surfaces: trigger endpoints, health checks and the admin API
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use emulator_common::RuntimeConfig;
//! use emulator_controller::{Controller, ControllerConfig, TriggerSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = emulator_host::create_executor(&RuntimeConfig::default())?;
//!     let controller = Controller::new(Arc::new(executor), ControllerConfig::default());
//!
//!     controller.start("my-project", false, true).await?;
//!     controller.deploy("./hello.wasm", "hello", &TriggerSpec::http()).await?;
//!     let outcome = controller.call("hello", serde_json::json!({"name": "world"})).await?;
//!     println!("{}", outcome.to_json());
//!
//!     controller.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod controller;
pub mod dispatcher;
pub mod fault;
pub mod handler;
pub mod payload;
pub mod registry;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod trigger;

pub use controller::{Controller, ControllerConfig};
pub use dispatcher::{DispatchSettings, Dispatcher};
pub use fault::{FailureKind, InvocationFailure, InvocationOutcome, UNCAUGHT_EXCEPTION_MARKER};
pub use registry::{FunctionDescriptor, Registry};
pub use server::ServerConfig;
pub use session::{EmulatorState, SessionOptions};
pub use state::AppState;
pub use supervisor::Supervisor;
pub use trigger::{EventKind, Trigger, TriggerSpec};
