//! Shared application state.
//!
//! [`AppState`] is what every HTTP handler receives. It is cloned for each
//! request, so it only holds `Arc`s.

use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::session::Session;

/// Shared state across all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    dispatcher: Dispatcher,
}

impl AppState {
    /// Create handler state over `dispatcher`.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// The dispatcher requests are routed through.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The session being served.
    pub fn session(&self) -> &Arc<Session> {
        self.dispatcher.session()
    }
}
