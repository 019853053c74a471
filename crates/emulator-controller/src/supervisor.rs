//! Emulator Supervisor.
//!
//! Owns the serving process and drives the session through
//! `STOPPED -> RUNNING -> STOPPED`. Transitions are serialized by an async
//! mutex; the session itself is only flipped once the listener is bound
//! (on start) or before the server is drained (on stop).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument};

use emulator_common::EmulatorError;

use crate::dispatcher::Dispatcher;
use crate::router::{AdminRouterConfig, build_router_with_admin};
use crate::server::{ServerConfig, ServerHandle, TEST_MODE_BIND_ADDR};
use crate::session::{EmulatorState, Session, SessionOptions};
use crate::state::AppState;

#[derive(Debug, Default)]
struct Slot {
    server: Option<ServerHandle>,
    last_options: Option<SessionOptions>,
    last_addr: Option<SocketAddr>,
}

/// Lifecycle owner of the emulator.
#[derive(Debug)]
pub struct Supervisor {
    session: Arc<Session>,
    dispatcher: Dispatcher,
    server: ServerConfig,
    admin: Option<AdminRouterConfig>,
    defaults: SessionOptions,
    slot: Mutex<Slot>,
}

impl Supervisor {
    /// Create a stopped supervisor.
    ///
    /// `defaults` are the options a `restart` uses when no session was
    /// ever started.
    pub fn new(
        dispatcher: Dispatcher,
        server: ServerConfig,
        admin: Option<AdminRouterConfig>,
        defaults: SessionOptions,
    ) -> Self {
        Self {
            session: Arc::clone(dispatcher.session()),
            dispatcher,
            server,
            admin,
            defaults,
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> EmulatorState {
        self.session.state()
    }

    /// Address the running session serves on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.session.state() {
            EmulatorState::Running => self.session.addr(),
            EmulatorState::Stopped => None,
        }
    }

    /// Start a fresh session. The registry is emptied.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::AlreadyRunning`] if a session is running and
    /// [`EmulatorError::Bind`] if the listener cannot be bound.
    #[instrument(skip(self), fields(project = %options.project_id))]
    pub async fn start(&self, options: SessionOptions) -> Result<(), EmulatorError> {
        let mut slot = self.slot.lock().await;
        if self.session.state() == EmulatorState::Running {
            return Err(EmulatorError::AlreadyRunning);
        }

        let bind_addr = if options.test_mode {
            TEST_MODE_BIND_ADDR.to_string()
        } else {
            self.server.bind_addr.clone()
        };
        self.launch(&mut slot, options, &bind_addr, true).await
    }

    /// Stop the running session. Deployments are kept but not served.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::NotRunning`] if no session is running.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<(), EmulatorError> {
        let mut slot = self.slot.lock().await;
        self.halt(&mut slot).await
    }

    /// Stop (if running) and start again with the previous session's
    /// options and address. Deployments survive.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::Bind`] if the previous address cannot be
    /// bound again; the emulator is then left stopped.
    #[instrument(skip(self))]
    pub async fn restart(&self) -> Result<(), EmulatorError> {
        let mut slot = self.slot.lock().await;
        if self.session.state() == EmulatorState::Running {
            self.halt(&mut slot).await?;
        }

        let cold = slot.last_options.is_none();
        let options = slot
            .last_options
            .clone()
            .unwrap_or_else(|| self.defaults.clone());
        let bind_addr = match (slot.last_addr, options.test_mode) {
            (Some(addr), _) => addr.to_string(),
            (None, true) => TEST_MODE_BIND_ADDR.to_string(),
            (None, false) => self.server.bind_addr.clone(),
        };
        self.launch(&mut slot, options, &bind_addr, cold).await
    }

    /// Remove every deployment without changing state.
    pub async fn clear(&self) {
        let _slot = self.slot.lock().await;
        let removed = self.session.clear();
        info!(removed, "Registry cleared");
    }

    async fn launch(
        &self,
        slot: &mut Slot,
        options: SessionOptions,
        bind_addr: &str,
        cold: bool,
    ) -> Result<(), EmulatorError> {
        let app = build_router_with_admin(
            AppState::new(self.dispatcher.clone()),
            self.server.request_timeout,
            self.admin.clone(),
        );
        let server = ServerHandle::spawn(bind_addr, app).await?;
        let addr = server.addr();

        let generation = self.session.begin(options.clone(), addr, cold);
        info!(
            generation,
            addr = %addr,
            project = %options.project_id,
            debug = options.debug,
            test_mode = options.test_mode,
            cold,
            "Emulator running"
        );

        slot.server = Some(server);
        slot.last_options = Some(options);
        slot.last_addr = Some(addr);
        Ok(())
    }

    async fn halt(&self, slot: &mut Slot) -> Result<(), EmulatorError> {
        if self.session.state() != EmulatorState::Running {
            return Err(EmulatorError::NotRunning);
        }

        let generation = self.session.end();
        if let Some(server) = slot.server.take() {
            server.shutdown(self.server.shutdown_timeout).await;
        }
        info!(generation, "Emulator stopped");
        Ok(())
    }
}
