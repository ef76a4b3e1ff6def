#![doc(html_root_url = "https://docs.rs/livewire/latest")]
//! Public API for the `livewire` library.
//!
//! This crate provides the persistent-connection core of a chat-platform
//! client: transport establishment, opcode framing, a reconnecting session
//! state machine, nonce-correlated request multiplexing, and event dispatch.
//! The REST surface and entity modeling live elsewhere; they consume this
//! core through [`Client`] and [`SessionHandle`].

pub mod client;
pub mod codec;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod hooks;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod multiplex;
pub mod panic;
pub mod reconnect;
pub mod session;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use codec::{Frame, Opcode, OpcodeFrameCodec};
pub use dispatch::{EventHandler, EventRouter};
pub use envelope::{ClosePayload, Handshake, RequestEnvelope, ResponseEnvelope};
pub use error::{ConnectError, ProtocolError, RemoteError, RequestError};
pub use hooks::SessionHooks;
pub use reconnect::{
    BackoffPolicy,
    CloseAction,
    ClosePolicy,
    GatewayClosePolicy,
    RpcClosePolicy,
};
pub use session::{CloseReason, SessionConfig, SessionHandle, SessionState};
pub use transport::{Connector, IpcConnector, SessionStream, TcpConnector};
