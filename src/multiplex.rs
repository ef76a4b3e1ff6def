//! Correlation of outstanding requests with inbound responses.
//!
//! Every request registers a single-resolution waiter keyed by its nonce.
//! The session's read loop settles waiters as matching responses arrive;
//! transport teardown settles every remaining waiter with a connection-lost
//! error. Each waiter resolves exactly once: the `oneshot` sender is
//! consumed by whichever path settles it first, and the table entry is
//! removed in the same step.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::RequestError;

/// Width of the zero-padded decimal nonce.
const NONCE_WIDTH: usize = 16;

/// Receiver half handed to the caller awaiting a response.
pub type Waiter = oneshot::Receiver<Result<Value, RequestError>>;

type Settler = oneshot::Sender<Result<Value, RequestError>>;

/// Table of in-flight requests keyed by nonce.
///
/// The mutex is only held for map operations, never across an await point;
/// waiter resolution itself happens through the lock-free `oneshot` send.
#[derive(Debug, Default)]
pub struct PendingRequests {
    table: Mutex<HashMap<String, Settler>>,
    counter: AtomicU64,
}

impl PendingRequests {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Generate the next nonce for this session.
    ///
    /// Nonces are zero-padded fixed-width decimals from a monotonic counter;
    /// relaxed ordering suffices because uniqueness is the only requirement.
    #[must_use]
    pub fn next_nonce(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{seq:0width$}", width = NONCE_WIDTH)
    }

    /// Register a waiter for `nonce`.
    ///
    /// # Panics
    ///
    /// Panics if `nonce` is already in flight; nonces come from
    /// [`next_nonce`](Self::next_nonce) and never repeat within a session.
    pub fn register(&self, nonce: &str) -> Waiter {
        let (tx, rx) = oneshot::channel();
        let previous = self
            .table
            .lock()
            .expect("pending table poisoned")
            .insert(nonce.to_owned(), tx);
        assert!(previous.is_none(), "nonce {nonce} already in flight");
        rx
    }

    /// Settle the waiter for `nonce`, if one is still in flight.
    ///
    /// Returns `false` when no waiter was found, such as a late response after a
    /// timeout or cancellation, which the caller logs and drops.
    pub fn settle(&self, nonce: &str, result: Result<Value, RequestError>) -> bool {
        let settler = self.table.lock().expect("pending table poisoned").remove(nonce);
        match settler {
            // A closed receiver means the caller gave up while we held the
            // entry; the request is settled either way.
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => {
                debug!(nonce, "response for unknown or already-settled nonce dropped");
                false
            }
        }
    }

    /// Remove the waiter for `nonce` without settling it.
    ///
    /// Used by the caller side on timeout or cancellation; only this nonce is
    /// affected.
    pub fn cancel(&self, nonce: &str) {
        self.table.lock().expect("pending table poisoned").remove(nonce);
    }

    /// Settle every in-flight waiter with [`RequestError::ConnectionLost`]
    /// and leave the table empty.
    ///
    /// Called atomically with transport teardown so no request can resolve
    /// against a stale transport.
    pub fn fail_all(&self) {
        let drained: Vec<Settler> = {
            let mut table = self.table.lock().expect("pending table poisoned");
            table.drain().map(|(_, tx)| tx).collect()
        };
        for tx in drained {
            let _ = tx.send(Err(RequestError::ConnectionLost));
        }
    }

    /// Number of requests currently in flight.
    #[must_use]
    pub fn len(&self) -> usize { self.table.lock().expect("pending table poisoned").len() }

    /// Whether no requests are in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use serde_json::json;

    use super::*;

    #[test]
    fn nonces_are_fixed_width_and_monotonic() {
        let pending = PendingRequests::new();
        let first = pending.next_nonce();
        let second = pending.next_nonce();
        assert_eq!(first.len(), NONCE_WIDTH);
        assert_eq!(first, "0000000000000000");
        assert_eq!(second, "0000000000000001");
    }

    #[tokio::test]
    async fn concurrent_nonces_are_pairwise_distinct() {
        let pending = Arc::new(PendingRequests::new());
        let mut tasks = Vec::new();
        for _ in 0..64 {
            let pending = Arc::clone(&pending);
            tasks.push(tokio::spawn(async move { pending.next_nonce() }));
        }

        let mut seen = HashSet::new();
        for task in tasks {
            let nonce = task.await.expect("task should not panic");
            assert!(seen.insert(nonce), "nonce generated twice");
        }
        assert_eq!(seen.len(), 64);
    }

    #[tokio::test]
    async fn settle_resolves_exactly_one_waiter() {
        let pending = PendingRequests::new();
        let nonce = pending.next_nonce();
        let waiter = pending.register(&nonce);

        assert!(pending.settle(&nonce, Ok(json!({"ok": true}))));
        let result = waiter.await.expect("waiter should resolve");
        assert_eq!(result.expect("settled with success"), json!({"ok": true}));

        // Second settlement finds nothing: the entry is gone.
        assert!(!pending.settle(&nonce, Ok(Value::Null)));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn fail_all_rejects_every_waiter_and_empties_the_table() {
        let pending = PendingRequests::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let nonce = pending.next_nonce();
                pending.register(&nonce)
            })
            .collect();
        assert_eq!(pending.len(), 3);

        pending.fail_all();
        assert!(pending.is_empty());
        for waiter in waiters {
            let result = waiter.await.expect("waiter should resolve");
            assert!(matches!(result, Err(RequestError::ConnectionLost)));
        }
    }

    #[tokio::test]
    async fn cancel_removes_only_the_named_nonce() {
        let pending = PendingRequests::new();
        let kept = pending.next_nonce();
        let cancelled = pending.next_nonce();
        let kept_waiter = pending.register(&kept);
        let _cancelled_waiter = pending.register(&cancelled);

        pending.cancel(&cancelled);
        assert_eq!(pending.len(), 1);

        assert!(pending.settle(&kept, Ok(Value::Null)));
        assert!(kept_waiter.await.expect("waiter resolves").is_ok());
        assert!(!pending.settle(&cancelled, Ok(Value::Null)));
    }
}
