//! Scripted peer speaking the wire protocol over a duplex stream.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use livewire::{Frame, Handshake, Opcode, OpcodeFrameCodec};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

/// A request envelope as seen by the peer.
#[derive(Clone, Debug, Deserialize)]
pub struct ReceivedRequest {
    /// Command name.
    pub cmd: String,
    /// Correlation token to echo back.
    pub nonce: String,
    /// Event discriminator, present on subscription commands.
    #[serde(default)]
    pub evt: Option<String>,
    /// Command arguments.
    #[serde(default)]
    pub args: Option<Value>,
}

/// Test-side end of one session connection.
///
/// All helpers panic on I/O or protocol mismatches; a mock peer failing is
/// a test failure, not a condition to handle.
pub struct MockPeer {
    framed: Framed<DuplexStream, OpcodeFrameCodec>,
}

impl MockPeer {
    /// Wrap a raw duplex stream.
    #[must_use]
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            framed: Framed::new(stream, OpcodeFrameCodec::default()),
        }
    }

    /// Receive the next frame.
    ///
    /// # Panics
    ///
    /// Panics if the stream ends or a frame fails to decode.
    pub async fn recv_frame(&mut self) -> Frame {
        self.framed
            .next()
            .await
            .expect("session closed the transport")
            .expect("frame should decode")
    }

    /// Receive a frame and assert it is the handshake.
    ///
    /// # Panics
    ///
    /// Panics if the next frame is not a well-formed handshake.
    pub async fn expect_handshake(&mut self) -> Handshake {
        let frame = self.recv_frame().await;
        assert_eq!(frame.op().expect("known opcode"), Opcode::Handshake);
        frame
            .decode_payload::<Handshake>()
            .expect("handshake should parse")
            .expect("handshake should have a body")
    }

    /// Receive a frame and parse it as a request envelope.
    ///
    /// # Panics
    ///
    /// Panics if the next frame is not a well-formed request.
    pub async fn recv_request(&mut self) -> ReceivedRequest {
        let frame = self.recv_frame().await;
        assert_eq!(frame.op().expect("known opcode"), Opcode::Frame);
        frame
            .decode_payload::<ReceivedRequest>()
            .expect("request should parse")
            .expect("request should have a body")
    }

    /// Send a raw frame.
    ///
    /// # Panics
    ///
    /// Panics if the write fails.
    pub async fn send_frame(&mut self, frame: Frame) {
        self.framed.send(frame).await.expect("peer write should succeed");
    }

    /// Send raw payload bytes under the given opcode, bypassing JSON
    /// encoding. Useful for injecting malformed bodies.
    pub async fn send_raw(&mut self, opcode: Opcode, payload: &[u8]) {
        self.send_frame(Frame::new(opcode, Bytes::copy_from_slice(payload)))
            .await;
    }

    /// Answer a request successfully.
    pub async fn respond(&mut self, nonce: &str, data: Value) {
        let frame = Frame::json(
            Opcode::Frame,
            &json!({"nonce": nonce, "data": data}),
        )
        .expect("response should encode");
        self.send_frame(frame).await;
    }

    /// Answer a request with an error envelope.
    pub async fn respond_error(&mut self, nonce: &str, code: u32, message: &str) {
        let frame = Frame::json(
            Opcode::Frame,
            &json!({
                "nonce": nonce,
                "evt": "ERROR",
                "data": {"code": code, "message": message},
            }),
        )
        .expect("error response should encode");
        self.send_frame(frame).await;
    }

    /// Push an unsolicited event.
    pub async fn send_event(&mut self, event: &str, data: Value) {
        let frame = Frame::json(
            Opcode::Frame,
            &json!({"cmd": "DISPATCH", "evt": event, "data": data}),
        )
        .expect("event should encode");
        self.send_frame(frame).await;
    }

    /// Push the conventional first frame, moving the session to ready.
    pub async fn send_ready(&mut self) {
        self.send_event("READY", json!({"v": 1})).await;
    }

    /// Send a close frame.
    pub async fn send_close(&mut self, code: u16, message: &str) {
        let frame = Frame::json(
            Opcode::Close,
            &json!({"code": code, "message": message}),
        )
        .expect("close should encode");
        self.send_frame(frame).await;
    }

    /// Send a ping carrying `data`.
    pub async fn send_ping(&mut self, data: Value) {
        let frame = Frame::json(Opcode::Ping, &data).expect("ping should encode");
        self.send_frame(frame).await;
    }
}
