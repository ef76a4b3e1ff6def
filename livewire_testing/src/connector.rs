//! In-memory connector backed by `tokio::io::duplex`.

use async_trait::async_trait;
use livewire::{ConnectError, Connector};
use tokio::{io::DuplexStream, sync::mpsc};

use crate::peer::MockPeer;

/// Connector handing the session one half of a fresh duplex pair per
/// `open()` call.
///
/// Each open corresponds to one accepted [`MockPeer`]; a reconnecting
/// session produces a sequence of accepts, which lets tests observe every
/// connection attempt. Dropping the [`PeerListener`] makes further opens
/// fail, simulating an unreachable endpoint.
pub struct DuplexConnector {
    capacity: usize,
    accepts: mpsc::UnboundedSender<DuplexStream>,
}

/// Test-side queue of accepted connections.
pub struct PeerListener {
    accepts: mpsc::UnboundedReceiver<DuplexStream>,
}

/// Build a connector and its listener with the given duplex buffer capacity.
#[must_use]
pub fn duplex_connector(capacity: usize) -> (DuplexConnector, PeerListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        DuplexConnector {
            capacity,
            accepts: tx,
        },
        PeerListener { accepts: rx },
    )
}

#[async_trait]
impl Connector for DuplexConnector {
    type Stream = DuplexStream;

    async fn open(&self) -> Result<Self::Stream, ConnectError> {
        let (client, server) = tokio::io::duplex(self.capacity);
        self.accepts
            .send(server)
            .map_err(|_| ConnectError::NoSocket { attempts: 1 })?;
        Ok(client)
    }
}

impl PeerListener {
    /// Wait for the session's next connection attempt.
    ///
    /// # Panics
    ///
    /// Panics if every [`DuplexConnector`] clone has been dropped, since no
    /// further connection can ever arrive.
    pub async fn accept(&mut self) -> MockPeer {
        let stream = self
            .accepts
            .recv()
            .await
            .expect("connector dropped, no further connections will arrive");
        MockPeer::new(stream)
    }

    /// Like [`accept`](Self::accept), but returns `None` instead of waiting
    /// when no connection attempt is queued right now.
    pub fn try_accept(&mut self) -> Option<MockPeer> {
        self.accepts.try_recv().ok().map(MockPeer::new)
    }
}
