//! Utilities for driving a [`livewire`] session against an in-memory peer
//! during tests.
//!
//! [`duplex_connector`] produces a [`Connector`](livewire::Connector) whose
//! every `open()` yields one half of a fresh `tokio::io::duplex` pair; the
//! test side accepts the other half as a [`MockPeer`] that speaks the wire
//! protocol through helper methods.
//!
//! ```rust,no_run
//! use livewire::Client;
//! use livewire_testing::duplex_connector;
//!
//! # async fn example() {
//! let (connector, mut listener) = duplex_connector(4096);
//! let client = Client::builder()
//!     .client_id("1045")
//!     .connector(connector)
//!     .start();
//! let mut peer = listener.accept().await;
//! peer.expect_handshake().await;
//! peer.send_ready().await;
//! client.ready().await;
//! # }
//! ```

pub mod connector;
pub mod logging;
pub mod peer;

pub use connector::{DuplexConnector, PeerListener, duplex_connector};
pub use logging::init_tracing;
pub use peer::{MockPeer, ReceivedRequest};
