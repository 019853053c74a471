//! The controller facade.
//!
//! [`Controller`] is the single entry point for the CLI and other callers.
//! Lifecycle operations go to the [`Supervisor`]; deployment and invocation
//! go to the [`Dispatcher`]. Both share one [`Session`].

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use emulator_common::{ConfigFile, EmulatorError};
use emulator_core::FunctionExecutor;

use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::fault::InvocationOutcome;
use crate::registry::FunctionDescriptor;
use crate::router::AdminRouterConfig;
use crate::server::ServerConfig;
use crate::session::{EmulatorState, Session, SessionOptions};
use crate::supervisor::Supervisor;
use crate::trigger::TriggerSpec;

/// Everything the controller needs besides an executor.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Serving process settings.
    pub server: ServerConfig,
    /// Endpoint region and invocation deadline.
    pub dispatch: DispatchSettings,
    /// Admin API, if enabled.
    pub admin: Option<AdminRouterConfig>,
    /// Options `restart` falls back to before any `start`.
    pub defaults: SessionOptions,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&ConfigFile::default())
    }
}

impl From<&ConfigFile> for ControllerConfig {
    fn from(config: &ConfigFile) -> Self {
        let admin = config
            .admin
            .token
            .as_ref()
            .filter(|_| config.admin.is_configured())
            .map(|token| AdminRouterConfig {
                prefix: config.admin.prefix.clone(),
                token: token.clone(),
            });

        Self {
            server: ServerConfig::from(&config.server),
            dispatch: DispatchSettings {
                region: config.server.region.clone(),
                invocation_timeout: config.runtime.execution.timeout(),
            },
            admin,
            defaults: SessionOptions::new(config.emulator.project_id.clone())
                .with_debug(config.emulator.debug),
        }
    }
}

impl ControllerConfig {
    /// Use a different invocation deadline.
    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch.invocation_timeout = timeout;
        self
    }

    /// Enable the admin API under `prefix`.
    pub fn with_admin(mut self, prefix: impl Into<String>, token: impl Into<String>) -> Self {
        self.admin = Some(AdminRouterConfig {
            prefix: prefix.into(),
            token: token.into(),
        });
        self
    }
}

struct Inner {
    supervisor: Supervisor,
    dispatcher: Dispatcher,
}

/// The emulator controller. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("supervisor", &self.inner.supervisor)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Create a stopped controller that resolves functions with `executor`.
    pub fn new(executor: Arc<dyn FunctionExecutor>, config: ControllerConfig) -> Self {
        let session = Arc::new(Session::new());
        let dispatcher = Dispatcher::new(session, executor, config.dispatch);
        let supervisor = Supervisor::new(
            dispatcher.clone(),
            config.server,
            config.admin,
            config.defaults,
        );

        Self {
            inner: Arc::new(Inner {
                supervisor,
                dispatcher,
            }),
        }
    }

    /// Current lifecycle state.
    pub async fn status(&self) -> EmulatorState {
        self.inner.supervisor.status()
    }

    /// Start a fresh session for `project_id`.
    ///
    /// In test mode the serving process binds an ephemeral loopback port.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::AlreadyRunning`] if a session is running and
    /// [`EmulatorError::Bind`] if the listener cannot be bound.
    pub async fn start(
        &self,
        project_id: &str,
        debug: bool,
        test_mode: bool,
    ) -> Result<(), EmulatorError> {
        let options = SessionOptions::new(project_id)
            .with_debug(debug)
            .with_test_mode(test_mode);
        self.inner.supervisor.start(options).await
    }

    /// Stop the running session.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::NotRunning`] if no session is running.
    pub async fn stop(&self) -> Result<(), EmulatorError> {
        self.inner.supervisor.stop().await
    }

    /// Stop (if running) and start again, keeping deployments.
    pub async fn restart(&self) -> Result<(), EmulatorError> {
        self.inner.supervisor.restart().await
    }

    /// Deploy `name` from the module at `source_path`.
    ///
    /// See [`Dispatcher::deploy`].
    pub async fn deploy(
        &self,
        source_path: impl AsRef<Path>,
        name: &str,
        spec: &TriggerSpec,
    ) -> Result<FunctionDescriptor, EmulatorError> {
        self.inner
            .dispatcher
            .deploy(source_path.as_ref(), name, spec)
            .await
    }

    /// Remove a deployment. Removing an absent name succeeds.
    pub async fn undeploy(&self, name: &str) -> Result<(), EmulatorError> {
        self.inner.dispatcher.undeploy(name)
    }

    /// Snapshot of every deployment, by name.
    pub async fn list(&self) -> Result<BTreeMap<String, FunctionDescriptor>, EmulatorError> {
        self.inner.dispatcher.list()
    }

    /// Remove every deployment. Valid in any state.
    pub async fn clear(&self) -> Result<(), EmulatorError> {
        self.inner.supervisor.clear().await;
        Ok(())
    }

    /// Invoke `name` once with `payload`.
    ///
    /// See [`Dispatcher::call`].
    pub async fn call(&self, name: &str, payload: Value) -> Result<InvocationOutcome, EmulatorError> {
        self.inner.dispatcher.call(name, payload).await
    }

    /// Address the running session serves on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.supervisor.local_addr()
    }

    /// Base URL of the running session.
    pub fn url(&self) -> Option<String> {
        self.local_addr().map(|addr| format!("http://{addr}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_file() {
        let file = ConfigFile::from_toml(
            r#"
            [runtime.execution]
            timeout_ms = 2500

            [server]
            region = "europe-west1"

            [emulator]
            project_id = "demo"
            debug = true

            [admin]
            enabled = true
            token = "secret"
            "#,
        )
        .unwrap();

        let config = ControllerConfig::from(&file);
        assert_eq!(config.dispatch.region, "europe-west1");
        assert_eq!(config.dispatch.invocation_timeout, Duration::from_millis(2500));
        assert_eq!(config.defaults.project_id, "demo");
        assert!(config.defaults.debug);
        assert_eq!(config.admin.unwrap().prefix, "/admin");
    }

    #[test]
    fn test_admin_needs_enabled_and_token() {
        let file = ConfigFile::from_toml("[admin]\ntoken = \"secret\"").unwrap();
        assert!(ControllerConfig::from(&file).admin.is_none());

        let file = ConfigFile::from_toml("[admin]\nenabled = true").unwrap();
        assert!(ControllerConfig::from(&file).admin.is_none());
    }
}
