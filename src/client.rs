//! Public client facade.
//!
//! [`Client`] composes the session task, the request multiplexer, and the
//! dispatch router behind one handle. Build one with [`Client::builder`],
//! issue requests with [`Client::request`], and receive pushed events by
//! registering handlers. The heavy lifting (reconnects, correlation,
//! backoff) happens on the session task; the facade only enqueues work.

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::{
    dispatch::{EventHandler, EventRouter},
    error::RequestError,
    session::{CloseReason, SessionHandle, SessionState},
    transport::IpcConnector,
};

mod builder;

pub use builder::ClientBuilder;

/// Commands the peer uses for event subscription management.
const SUBSCRIBE: &str = "SUBSCRIBE";
const UNSUBSCRIBE: &str = "UNSUBSCRIBE";

/// A connected (or connecting) client.
///
/// Dropping the client without calling [`close`](Self::close) detaches the
/// session task; it stops once every handle is gone.
pub struct Client {
    handle: SessionHandle,
    router: EventRouter,
    session: JoinHandle<()>,
    drain: JoinHandle<()>,
}

impl Client {
    /// Start building a client for the desktop service's local socket.
    #[must_use]
    pub fn builder() -> ClientBuilder<IpcConnector> { ClientBuilder::new() }

    pub(crate) fn from_parts(
        handle: SessionHandle,
        router: EventRouter,
        session: JoinHandle<()>,
        drain: JoinHandle<()>,
    ) -> Self {
        Self {
            handle,
            router,
            session,
            drain,
        }
    }

    /// Handle to the underlying session.
    #[must_use]
    pub fn handle(&self) -> &SessionHandle { &self.handle }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState { self.handle.state() }

    /// Why the last connection ended, if one has ended.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> { self.handle.close_reason() }

    /// Suspend until the session is ready for requests.
    pub async fn ready(&self) { self.handle.wait_for(SessionState::Ready).await; }

    /// Issue a request and await its response payload.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] as documented on
    /// [`SessionHandle::request`].
    pub async fn request(&self, cmd: &str, args: Option<Value>) -> Result<Value, RequestError> {
        self.handle.request(cmd, args).await
    }

    /// Register a local handler for `event` without telling the peer.
    ///
    /// Useful for events the peer pushes unconditionally.
    pub fn on_event(&self, event: &str, handler: EventHandler) {
        self.router.register(event, handler);
    }

    /// Subscribe to `event`: registers `handler` locally, then asks the
    /// peer to start pushing the event.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] if the subscription command fails; the local
    /// handler is removed again in that case.
    pub async fn subscribe(
        &self,
        event: &str,
        args: Option<Value>,
        handler: EventHandler,
    ) -> Result<Value, RequestError> {
        self.router.register(event, handler);
        match self
            .handle
            .request_with_event(SUBSCRIBE, Some(event.to_owned()), args)
            .await
        {
            Ok(ack) => Ok(ack),
            Err(e) => {
                self.router.unregister(event);
                Err(e)
            }
        }
    }

    /// Unsubscribe from `event` and drop the local handler.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] if the unsubscription command fails. The
    /// local handler is removed regardless.
    pub async fn unsubscribe(&self, event: &str, args: Option<Value>) -> Result<Value, RequestError> {
        self.router.unregister(event);
        self.handle
            .request_with_event(UNSUBSCRIBE, Some(event.to_owned()), args)
            .await
    }

    /// Stop the session and wait for both background tasks to finish.
    pub async fn close(self) {
        let Self {
            handle,
            router,
            session,
            drain,
        } = self;
        handle.stop();
        let _ = session.await;
        drop(router);
        let _ = drain.await;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("handle", &self.handle).finish()
    }
}
