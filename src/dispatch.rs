//! Delivery of unsolicited inbound frames to registered handlers.
//!
//! The session's read loop hands each event to an [`EventRouter`], which
//! enqueues it on a bounded channel drained by a dedicated task. A full
//! queue drops the event with a warning rather than blocking the read loop;
//! a panicking handler is caught and logged rather than killing the session.
//! Unknown event names are a debug-level diagnostic, never an error: the
//! protocol may introduce event types this client does not know.

use std::{panic::AssertUnwindSafe, sync::Arc};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::panic::panic_message;

/// Handler invoked with the payload of a dispatched event.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync + 'static>;

/// One queued dispatch.
struct Dispatch {
    event: String,
    payload: Value,
}

/// Registry half of the router: registration and enqueueing.
///
/// Cloneable; all clones share one handler registry and one queue.
#[derive(Clone)]
pub struct EventRouter {
    handlers: Arc<DashMap<String, EventHandler>>,
    queue: mpsc::Sender<Dispatch>,
}

/// Drain half of the router: runs handlers off the queue.
pub struct EventDrain {
    handlers: Arc<DashMap<String, EventHandler>>,
    queue: mpsc::Receiver<Dispatch>,
}

/// Build a router and its drain with the given queue capacity.
#[must_use]
pub fn channel(capacity: usize) -> (EventRouter, EventDrain) {
    let handlers = Arc::new(DashMap::new());
    let (tx, rx) = mpsc::channel(capacity);
    (
        EventRouter {
            handlers: Arc::clone(&handlers),
            queue: tx,
        },
        EventDrain {
            handlers,
            queue: rx,
        },
    )
}

impl EventRouter {
    /// Register `handler` for `event`, replacing any previous registration.
    pub fn register(&self, event: impl Into<String>, handler: EventHandler) {
        self.handlers.insert(event.into(), handler);
    }

    /// Remove the handler for `event`, if any.
    pub fn unregister(&self, event: &str) { self.handlers.remove(event); }

    /// Whether a handler is registered for `event`.
    #[must_use]
    pub fn is_registered(&self, event: &str) -> bool { self.handlers.contains_key(event) }

    /// Enqueue `payload` for the handler registered under `event`.
    ///
    /// Unregistered events and queue overflow both drop the payload; neither
    /// is an error for the session.
    pub fn dispatch(&self, event: &str, payload: Value) {
        if !self.handlers.contains_key(event) {
            debug!(event, "no handler registered, event dropped");
            return;
        }
        let dispatch = Dispatch {
            event: event.to_owned(),
            payload,
        };
        match self.queue.try_send(dispatch) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(d)) => {
                warn!(event = %d.event, "event queue full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(d)) => {
                warn!(event = %d.event, "event drain gone, event dropped");
            }
        }
    }
}

impl EventDrain {
    /// Run handlers until every router clone is dropped.
    ///
    /// Events are delivered in queue order. Handler panics are contained
    /// here and logged; they never reach the session.
    pub async fn run(mut self) {
        while let Some(Dispatch { event, payload }) = self.queue.recv().await {
            let Some(handler) = self.handlers.get(&event).map(|h| Arc::clone(h.value())) else {
                debug!(event = %event, "handler unregistered before delivery, event dropped");
                continue;
            };
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(payload)));
            if let Err(panic) = result {
                error!(
                    event = %event,
                    panic = %panic_message(panic),
                    "event handler panicked"
                );
            }
        }
    }
}
