//! Builder for [`Client`].

use std::{sync::Arc, time::Duration};

use crate::{
    client::Client,
    dispatch,
    hooks::SessionHooks,
    reconnect::{BackoffPolicy, ClosePolicy, CloseAction, RpcClosePolicy},
    session::{self, CloseReason, SessionConfig},
    transport::{Connector, IpcConnector},
};

/// Configures and starts a [`Client`].
///
/// The connector decides which protocol instance the session speaks: the
/// default [`IpcConnector`] for the local socket, or any custom
/// [`Connector`] (TCP gateway, in-memory test transport).
#[must_use]
pub struct ClientBuilder<C: Connector> {
    connector: C,
    config: SessionConfig,
    policy: Arc<dyn ClosePolicy>,
    hooks: SessionHooks,
}

impl ClientBuilder<IpcConnector> {
    /// Builder with the local-socket connector and close table.
    pub fn new() -> Self {
        Self {
            connector: IpcConnector::new(),
            config: SessionConfig::default(),
            policy: Arc::new(RpcClosePolicy),
            hooks: SessionHooks::default(),
        }
    }
}

impl Default for ClientBuilder<IpcConnector> {
    fn default() -> Self { Self::new() }
}

impl<C: Connector> ClientBuilder<C> {
    /// Application identifier announced in the handshake.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = client_id.into();
        self
    }

    /// Protocol version announced in the handshake.
    pub fn protocol_version(mut self, version: u32) -> Self {
        self.config.protocol_version = version;
        self
    }

    /// Deadline applied to each request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Reconnect intervals.
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Maximum accepted frame payload length.
    pub fn max_payload_length(mut self, length: usize) -> Self {
        self.config.max_payload_length = length;
        self
    }

    /// Capacity of the event dispatch queue.
    pub fn event_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.event_queue_capacity = capacity;
        self
    }

    /// Capacity of the outbound frame queue.
    pub fn outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_queue_capacity = capacity;
        self
    }

    /// Close-code classification table.
    pub fn close_policy(mut self, policy: impl ClosePolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Replace the connector, switching protocol instance if needed.
    pub fn connector<D: Connector>(self, connector: D) -> ClientBuilder<D> {
        ClientBuilder {
            connector,
            config: self.config,
            policy: self.policy,
            hooks: self.hooks,
        }
    }

    /// Callback run each time the session reaches `Ready`.
    pub fn on_ready(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.hooks.on_ready = Some(Box::new(hook));
        self
    }

    /// Callback run when a connection ends, with the classified reason.
    pub fn on_close(mut self, hook: impl FnMut(&CloseReason) + Send + 'static) -> Self {
        self.hooks.on_close = Some(Box::new(hook));
        self
    }

    /// Callback run after a retryable close, before the backoff sleep.
    pub fn before_reconnect(mut self, hook: impl FnMut(CloseAction) + Send + 'static) -> Self {
        self.hooks.before_reconnect = Some(Box::new(hook));
        self
    }

    /// Spawn the session and dispatch tasks and return the client.
    ///
    /// Must be called from within a Tokio runtime. The session begins
    /// connecting immediately; await [`Client::ready`] to block until the
    /// first handshake completes.
    pub fn start(self) -> Client {
        let (router, drain) = dispatch::channel(self.config.event_queue_capacity);
        let drain_task = tokio::spawn(drain.run());
        let (handle, session_task) =
            session::launch(self.connector, self.config, self.policy, self.hooks, router.clone());
        Client::from_parts(handle, router, session_task, drain_task)
    }
}
