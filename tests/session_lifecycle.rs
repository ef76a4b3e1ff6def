//! Session state machine behaviour: close classification, reconnects,
//! keepalive, and local shutdown.

use std::time::Duration;

use bytes::Bytes;
use livewire::{
    BackoffPolicy, Client, CloseReason, Frame, Opcode, RequestError, RpcClosePolicy, SessionState,
};
use livewire_testing::{duplex_connector, init_tracing};
use serde_json::{Value, json};

mod common;

/// A fatal close code stops the session permanently: no reconnect attempt,
/// `running` cleared, and later requests refused until a fresh start.
#[tokio::test(start_paused = true)]
async fn fatal_close_stops_without_reconnect() {
    let (client, mut peer, mut listener) = common::ready_client().await;

    peer.send_close(RpcClosePolicy::INVALID_VERSION, "unsupported version").await;
    client.handle().wait_for(SessionState::Closed).await;

    assert!(!client.handle().is_running());
    assert_eq!(
        client.close_reason(),
        Some(CloseReason::Frame {
            code: RpcClosePolicy::INVALID_VERSION,
            message: "unsupported version".into(),
        })
    );

    // Generous idle window: no reconnect may appear in it.
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(listener.try_accept().is_none(), "fatal close must not reconnect");

    let err = client
        .request("PING", None)
        .await
        .expect_err("stopped session should refuse");
    assert!(matches!(err, RequestError::Closed));
}

/// A retryable close rejects every pending request with `ConnectionLost`,
/// then reconnects through Connecting → Handshaking → Ready after the
/// standard backoff.
#[tokio::test(start_paused = true)]
async fn retryable_close_cascades_and_reconnects() {
    let (client, mut peer, mut listener) = common::ready_client().await;

    let tasks: Vec<_> = ["FIRST", "SECOND", "THIRD"]
        .into_iter()
        .map(|cmd| {
            let handle = client.handle().clone();
            tokio::spawn(async move { handle.request(cmd, None).await })
        })
        .collect();
    for _ in 0..3 {
        peer.recv_request().await;
    }
    assert_eq!(client.handle().pending_requests(), 3);

    peer.send_close(RpcClosePolicy::CLOSE_NORMAL, "restarting").await;
    for task in tasks {
        let err = task
            .await
            .expect("task")
            .expect_err("pending request should be rejected");
        assert!(matches!(err, RequestError::ConnectionLost));
    }
    assert_eq!(client.handle().pending_requests(), 0);

    // The session comes back on its own after the backoff.
    let mut peer = listener.accept().await;
    peer.expect_handshake().await;
    peer.send_ready().await;
    client.handle().wait_for(SessionState::Ready).await;

    // And the new transport carries requests again.
    let handle = client.handle().clone();
    let request = tokio::spawn(async move { handle.request("ECHO", None).await });
    let received = peer.recv_request().await;
    peer.respond(&received.nonce, json!({"ok": true})).await;
    assert_eq!(request.await.expect("task").expect("response"), json!({"ok": true}));

    client.close().await;
}

/// Transport death without a close frame cascades the same way and
/// reconnects on the standard interval.
#[tokio::test(start_paused = true)]
async fn transport_loss_rejects_pending_and_reconnects() {
    let (client, mut peer, mut listener) = common::ready_client().await;

    let one = client.handle().clone();
    let two = client.handle().clone();
    let one = tokio::spawn(async move { one.request("ONE", None).await });
    let two = tokio::spawn(async move { two.request("TWO", None).await });
    peer.recv_request().await;
    peer.recv_request().await;

    drop(peer);
    for task in [one, two] {
        let err = task
            .await
            .expect("task")
            .expect_err("pending request should be rejected");
        assert!(matches!(err, RequestError::ConnectionLost));
    }
    assert_eq!(client.handle().pending_requests(), 0);
    assert_eq!(client.close_reason(), Some(CloseReason::TransportLost));

    let mut peer = listener.accept().await;
    peer.expect_handshake().await;
    peer.send_ready().await;
    client.handle().wait_for(SessionState::Ready).await;

    client.close().await;
}

/// A rate-limited close waits the longer interval before reconnecting; an
/// ordinary retryable close waits only the standard one.
#[tokio::test(start_paused = true)]
async fn backoff_interval_follows_the_classification() {
    let (client, mut peer, mut listener) = common::ready_client().await;
    let backoff = BackoffPolicy::default();

    let before = tokio::time::Instant::now();
    peer.send_close(RpcClosePolicy::RATE_LIMITED, "slow down").await;
    let mut peer = listener.accept().await;
    let waited = before.elapsed();
    assert!(waited >= backoff.rate_limited, "rate-limited close uses the long interval");

    peer.expect_handshake().await;
    peer.send_ready().await;
    client.handle().wait_for(SessionState::Ready).await;

    let before = tokio::time::Instant::now();
    peer.send_close(RpcClosePolicy::CLOSE_NORMAL, "restarting").await;
    let mut peer = listener.accept().await;
    let waited = before.elapsed();
    assert!(waited >= backoff.standard, "ordinary close waits the standard interval");
    assert!(waited < backoff.rate_limited, "ordinary close must not use the long interval");

    peer.expect_handshake().await;
    peer.send_ready().await;
    client.close().await;
}

/// Pings are answered with pongs echoing the payload, without surfacing to
/// handlers or waiters.
#[tokio::test]
async fn ping_is_answered_with_matching_pong() {
    let (client, mut peer, _listener) = common::ready_client().await;

    peer.send_ping(json!({"seq": 7})).await;
    let pong = peer.recv_frame().await;
    assert_eq!(pong.op().expect("known opcode"), Opcode::Pong);
    let payload: Option<Value> = pong.decode_payload().expect("payload parses");
    assert_eq!(payload, Some(json!({"seq": 7})));

    client.close().await;
}

/// A malformed body or an unknown opcode costs one frame, not the session.
#[tokio::test]
async fn bad_frames_are_dropped_without_killing_the_session() {
    let (client, mut peer, _listener) = common::ready_client().await;

    peer.send_raw(Opcode::Frame, b"{definitely not json").await;
    peer.send_frame(Frame {
        opcode: 99,
        payload: Bytes::new(),
    })
    .await;

    let handle = client.handle().clone();
    let request = tokio::spawn(async move { handle.request("ECHO", None).await });
    let received = peer.recv_request().await;
    peer.respond(&received.nonce, json!({"still": "alive"})).await;
    assert_eq!(
        request.await.expect("task").expect("response"),
        json!({"still": "alive"})
    );

    client.close().await;
}

/// Local stop drains, ends in `Closed`, and never reconnects.
#[tokio::test]
async fn local_stop_closes_cleanly() {
    let (client, _peer, mut listener) = common::ready_client().await;
    let handle = client.handle().clone();

    client.close().await;
    assert_eq!(handle.state(), SessionState::Closed);
    assert!(!handle.is_running());
    assert_eq!(handle.close_reason(), Some(CloseReason::Stopped));
    assert!(listener.try_accept().is_none());
}

/// Stop interrupts the connect-retry sub-loop even mid-backoff.
#[tokio::test]
async fn stop_cancels_the_backoff_sleep() {
    init_tracing();
    let (connector, listener) = duplex_connector(64);
    // No listener: every connect attempt fails into the backoff sleep.
    drop(listener);
    let client = Client::builder()
        .backoff(BackoffPolicy::new(
            Duration::from_secs(3600),
            Duration::from_secs(7200),
        ))
        .connector(connector)
        .start();

    // Give the session time to fail its first attempt and enter backoff.
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Close must return promptly rather than sleeping out the hour.
    client.close().await;
}
