//! Invocation Dispatcher.
//!
//! Deploys functions into the registry (after the executor confirms they
//! exist) and routes calls to them through the fault boundary.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use emulator_common::EmulatorError;
use emulator_core::{CallContext, FunctionExecutor};

use crate::fault::{InvocationOutcome, invoke_guarded};
use crate::payload;
use crate::registry::{DeployedFunction, FunctionDescriptor};
use crate::session::{Lease, Session};
use crate::trigger::{Trigger, TriggerSpec};

/// Settings the dispatcher applies to every deployment and call.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Region segment of synthesized endpoints.
    pub region: String,
    /// Deadline of a single invocation.
    pub invocation_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            region: "us-central1".to_string(),
            invocation_timeout: Duration::from_secs(60),
        }
    }
}

/// Routes deployments and calls. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    session: Arc<Session>,
    executor: Arc<dyn FunctionExecutor>,
    settings: Arc<DispatchSettings>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher over `session`.
    pub fn new(
        session: Arc<Session>,
        executor: Arc<dyn FunctionExecutor>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            session,
            executor,
            settings: Arc::new(settings),
        }
    }

    /// The session this dispatcher serves.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Dispatch settings.
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Deploy `name` from the module at `source_path`.
    ///
    /// Nothing is registered unless every step succeeds. An existing
    /// deployment of the same name is replaced.
    ///
    /// # Errors
    ///
    /// - [`EmulatorError::NotRunning`] if the emulator is stopped (or stops
    ///   before the deployment is committed)
    /// - [`EmulatorError::InvalidTrigger`] if `spec` cannot be interpreted
    /// - [`EmulatorError::ModuleNotFound`] if the path holds no loadable module
    /// - [`EmulatorError::FunctionNotFound`] if the module does not export `name`
    /// - [`EmulatorError::InvalidFunction`] for unusable names or exports
    #[instrument(skip(self, source_path, spec), fields(path = %source_path.display()))]
    pub async fn deploy(
        &self,
        source_path: &Path,
        name: &str,
        spec: &TriggerSpec,
    ) -> Result<FunctionDescriptor, EmulatorError> {
        let lease = self.session.lease()?;
        validate_name(name)?;
        let trigger = spec.resolve()?;

        let callable = self
            .executor
            .resolve(source_path, name)
            .await
            .map_err(|e| EmulatorError::from_resolve(name, source_path, e))?;

        let descriptor = match trigger {
            Trigger::Http => {
                let endpoint = self.endpoint(&lease, name)?;
                FunctionDescriptor::http(name, source_path, endpoint)
            }
            background => FunctionDescriptor::background(name, source_path, background)
                .ok_or_else(|| EmulatorError::invalid_trigger("HTTP trigger without endpoint"))?,
        };

        let deployed = DeployedFunction {
            descriptor: descriptor.clone(),
            callable,
        };
        let replaced = self.session.commit(&lease, |registry| registry.put(deployed))?;

        info!(
            function = name,
            trigger = %descriptor.trigger(),
            url = descriptor.endpoint().map(Url::as_str),
            replaced = replaced.is_some(),
            "Function deployed"
        );

        Ok(descriptor)
    }

    /// Remove a deployment. Removing an absent name succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::NotRunning`] if the emulator is stopped.
    #[instrument(skip(self))]
    pub fn undeploy(&self, name: &str) -> Result<(), EmulatorError> {
        let lease = self.session.lease()?;
        let removed = self
            .session
            .commit(&lease, |registry| registry.remove(name))?;

        if removed {
            info!(function = name, "Function undeployed");
        } else {
            debug!(function = name, "Undeploy of absent function");
        }
        Ok(())
    }

    /// Snapshot of every deployment.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::NotRunning`] if the emulator is stopped.
    pub fn list(&self) -> Result<BTreeMap<String, FunctionDescriptor>, EmulatorError> {
        let lease = self.session.lease()?;
        self.session.commit(&lease, |registry| registry.list())
    }

    /// Descriptor of a deployed function.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::NotRunning`] if the emulator is stopped and
    /// [`EmulatorError::FunctionNotFound`] if `name` is not deployed.
    pub fn describe(&self, name: &str) -> Result<FunctionDescriptor, EmulatorError> {
        self.session.lease()?;
        self.session
            .registry()
            .get(name)
            .map(|function| function.descriptor.clone())
            .ok_or_else(|| EmulatorError::function_not_found(name))
    }

    /// Invoke `name` once with `payload`.
    ///
    /// A failing function is not an error: it yields
    /// [`InvocationOutcome::Failure`] and leaves the emulator running.
    ///
    /// # Errors
    ///
    /// - [`EmulatorError::NotRunning`] if the emulator is stopped, or stopped
    ///   while the invocation was in flight (its result is discarded)
    /// - [`EmulatorError::FunctionNotFound`] if `name` is not deployed
    #[instrument(skip(self, payload), fields(request_id = tracing::field::Empty))]
    pub async fn call(&self, name: &str, payload: Value) -> Result<InvocationOutcome, EmulatorError> {
        let lease = self.session.lease()?;
        let function = self
            .session
            .registry()
            .get(name)
            .ok_or_else(|| EmulatorError::function_not_found(name))?;

        let request_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("request_id", request_id.as_str());

        let data = payload::decode(payload);
        let args = payload::shape(function.descriptor.trigger(), data);

        if lease.options.debug {
            info!(function = name, payload = %args, "Invoking function");
        } else {
            debug!(function = name, payload = %args, "Invoking function");
        }

        let start = Instant::now();
        let ctx = CallContext::new(request_id).with_debug(lease.options.debug);
        let outcome = invoke_guarded(
            Arc::clone(&function.callable),
            args,
            ctx,
            self.settings.invocation_timeout,
        )
        .await;
        let duration_ms = start.elapsed().as_millis();

        if !self.session.is_current(&lease) {
            warn!(
                function = name,
                duration_ms, "Emulator stopped during invocation, result discarded"
            );
            return Err(EmulatorError::NotRunning);
        }

        match &outcome {
            InvocationOutcome::Success(_) => {
                info!(function = name, duration_ms, "Invocation succeeded");
            }
            InvocationOutcome::Failure(failure) => {
                warn!(
                    function = name,
                    duration_ms,
                    kind = ?failure.kind,
                    error = %failure,
                    "Invocation failed"
                );
            }
        }

        Ok(outcome)
    }

    fn endpoint(&self, lease: &Lease, name: &str) -> Result<Url, EmulatorError> {
        let invalid = |reason: String| EmulatorError::InvalidFunction {
            name: name.to_string(),
            reason,
        };

        let mut url = Url::parse(&format!("http://{}", lease.addr))
            .map_err(|e| invalid(format!("cannot build endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot build endpoint path".to_string()))?
            .clear()
            .extend([
                lease.options.project_id.as_str(),
                self.settings.region.as_str(),
                name,
            ]);
        Ok(url)
    }
}

fn validate_name(name: &str) -> Result<(), EmulatorError> {
    let reason = if name.trim().is_empty() {
        "name is empty"
    } else if name.contains('/') {
        "name contains '/'"
    } else {
        return Ok(());
    };

    Err(EmulatorError::InvalidFunction {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("hello").is_ok());
        assert!(validate_name("hello_world-2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("  ").is_err());
        assert!(validate_name("a/b").is_err());
    }
}
