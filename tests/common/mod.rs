//! Shared setup for integration tests.

use livewire::Client;
use livewire_testing::{MockPeer, PeerListener, duplex_connector, init_tracing};

/// Client id used by [`ready_client`].
pub const CLIENT_ID: &str = "9001";

/// Start a client against an in-memory peer and walk it to `Ready`.
///
/// Returns the client, the peer end of the first connection, and the
/// listener for observing reconnects.
pub async fn ready_client() -> (Client, MockPeer, PeerListener) {
    init_tracing();
    let (connector, mut listener) = duplex_connector(4096);
    let client = Client::builder()
        .client_id(CLIENT_ID)
        .connector(connector)
        .start();

    let mut peer = listener.accept().await;
    let handshake = peer.expect_handshake().await;
    assert_eq!(handshake.client_id, CLIENT_ID);
    assert_eq!(handshake.v, 1);
    peer.send_ready().await;
    client.ready().await;

    (client, peer, listener)
}
