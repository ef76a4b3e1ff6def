//! Lifecycle callbacks invoked by the session task.
//!
//! [`SessionHooks`] stores optional callbacks run at state transitions. All
//! hooks execute on the session's own task, so they should return quickly;
//! anything slow belongs in an event handler behind the dispatch queue.

use crate::{reconnect::CloseAction, session::CloseReason};

/// Type alias for the `on_ready` callback.
type OnReadyHook = Box<dyn FnMut() + Send + 'static>;

/// Type alias for the `on_close` callback.
type OnCloseHook = Box<dyn FnMut(&CloseReason) + Send + 'static>;

/// Type alias for the `before_reconnect` callback.
type BeforeReconnectHook = Box<dyn FnMut(CloseAction) + Send + 'static>;

/// Optional callbacks for session lifecycle transitions.
#[derive(Default)]
pub struct SessionHooks {
    /// Invoked each time the session reaches `Ready`, including after a
    /// reconnect.
    pub on_ready: Option<OnReadyHook>,
    /// Invoked when the current connection ends, with the classified reason.
    pub on_close: Option<OnCloseHook>,
    /// Invoked after a retryable close, before the backoff sleep. This is
    /// where topology refresh (resharding-style renegotiation) hangs off the
    /// core without the core knowing about it.
    pub before_reconnect: Option<BeforeReconnectHook>,
}

impl SessionHooks {
    /// Run the `on_ready` hook if registered.
    pub fn on_ready(&mut self) {
        if let Some(hook) = &mut self.on_ready {
            hook();
        }
    }

    /// Run the `on_close` hook if registered.
    pub fn on_close(&mut self, reason: &CloseReason) {
        if let Some(hook) = &mut self.on_close {
            hook(reason);
        }
    }

    /// Run the `before_reconnect` hook if registered.
    pub fn before_reconnect(&mut self, action: CloseAction) {
        if let Some(hook) = &mut self.before_reconnect {
            hook(action);
        }
    }
}

impl std::fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHooks")
            .field("on_ready", &self.on_ready.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("before_reconnect", &self.before_reconnect.is_some())
            .finish()
    }
}
