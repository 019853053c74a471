//! The emulator session: lifecycle state plus the registry it guards.
//!
//! Every `start` or `stop` bumps the session generation. Operations that
//! must not outlive the session they began in take a [`Lease`] first and
//! check it again before their effect becomes visible.

use std::fmt;
use std::net::SocketAddr;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use emulator_common::EmulatorError;

use crate::registry::Registry;

/// Lifecycle state of the emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmulatorState {
    /// Not serving; deploy and call are rejected.
    Stopped,
    /// Serving.
    Running,
}

impl fmt::Display for EmulatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("STOPPED"),
            Self::Running => f.write_str("RUNNING"),
        }
    }
}

/// Options a session is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Project the synthesized endpoints belong to.
    pub project_id: String,
    /// Forward guest stdio and log payloads at info.
    pub debug: bool,
    /// Serve on an ephemeral loopback port.
    pub test_mode: bool,
}

impl SessionOptions {
    /// Options for `project_id` with both flags off.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            debug: false,
            test_mode: false,
        }
    }

    /// Set the debug flag.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the test-mode flag.
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }
}

/// Proof that the session was running when an operation began.
#[derive(Debug, Clone)]
pub struct Lease {
    generation: u64,
    /// Options of the session the lease belongs to.
    pub options: SessionOptions,
    /// Address that session serves on.
    pub addr: SocketAddr,
}

impl Lease {
    /// Generation the lease was taken in.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: EmulatorState,
    generation: u64,
    options: Option<SessionOptions>,
    addr: Option<SocketAddr>,
}

/// Shared session object. One per controller.
#[derive(Debug)]
pub struct Session {
    lifecycle: RwLock<Lifecycle>,
    registry: Registry,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A stopped session with an empty registry.
    pub fn new() -> Self {
        Self {
            lifecycle: RwLock::new(Lifecycle {
                state: EmulatorState::Stopped,
                generation: 0,
                options: None,
                addr: None,
            }),
            registry: Registry::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EmulatorState {
        self.lifecycle.read().state
    }

    /// Options of the current (or last) session.
    pub fn options(&self) -> Option<SessionOptions> {
        self.lifecycle.read().options.clone()
    }

    /// Address of the current (or last) session.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.lifecycle.read().addr
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.lifecycle.read().generation
    }

    /// The registry. Callers outside this crate should go through the
    /// dispatcher, which enforces the running-state checks.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Take a lease on the running session.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::NotRunning`] if the session is stopped.
    pub fn lease(&self) -> Result<Lease, EmulatorError> {
        let lifecycle = self.lifecycle.read();
        match (&lifecycle.state, &lifecycle.options, lifecycle.addr) {
            (EmulatorState::Running, Some(options), Some(addr)) => Ok(Lease {
                generation: lifecycle.generation,
                options: options.clone(),
                addr,
            }),
            _ => Err(EmulatorError::NotRunning),
        }
    }

    /// Whether the session the lease was taken in is still running.
    pub fn is_current(&self, lease: &Lease) -> bool {
        let lifecycle = self.lifecycle.read();
        lifecycle.state == EmulatorState::Running && lifecycle.generation == lease.generation
    }

    /// Run `update` against the registry if the lease is still current.
    ///
    /// The lifecycle lock is held for the duration, so a concurrent stop
    /// either happens entirely before (and the update is rejected) or
    /// entirely after.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::NotRunning`] if the session ended since the
    /// lease was taken.
    pub fn commit<R>(
        &self,
        lease: &Lease,
        update: impl FnOnce(&Registry) -> R,
    ) -> Result<R, EmulatorError> {
        let lifecycle = self.lifecycle.read();
        if lifecycle.state != EmulatorState::Running || lifecycle.generation != lease.generation {
            return Err(EmulatorError::NotRunning);
        }
        Ok(update(&self.registry))
    }

    /// Remove every deployment, whatever the state. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let _lifecycle = self.lifecycle.read();
        self.registry.clear()
    }

    /// Mark the session running. A cold start empties the registry.
    pub(crate) fn begin(&self, options: SessionOptions, addr: SocketAddr, cold: bool) -> u64 {
        let mut lifecycle = self.lifecycle.write();
        if cold {
            let dropped = self.registry.clear();
            debug!(dropped, "Registry reset for new session");
        }
        lifecycle.state = EmulatorState::Running;
        lifecycle.generation += 1;
        lifecycle.options = Some(options);
        lifecycle.addr = Some(addr);
        lifecycle.generation
    }

    /// Mark the session stopped. The registry is kept.
    pub(crate) fn end(&self) -> u64 {
        let mut lifecycle = self.lifecycle.write();
        lifecycle.state = EmulatorState::Stopped;
        lifecycle.generation += 1;
        lifecycle.generation
    }
}
