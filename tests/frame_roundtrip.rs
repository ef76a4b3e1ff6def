//! Round-trip properties of the wire framing.

use bytes::{Bytes, BytesMut};
use livewire::{Frame, Handshake, Opcode, OpcodeFrameCodec};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

proptest! {
    /// Any opcode and payload survive encode → decode unchanged, consuming
    /// the buffer exactly.
    #[test]
    fn frame_round_trips(
        opcode in 0_u32..=4,
        payload in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let frame = Frame {
            opcode,
            payload: Bytes::from(payload),
        };
        let mut codec = OpcodeFrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).expect("encode should succeed");

        let decoded = codec
            .decode(&mut buf)
            .expect("decode should succeed")
            .expect("expected a frame");
        prop_assert_eq!(decoded, frame);
        prop_assert!(buf.is_empty());
    }

    /// JSON payloads survive the serialize → frame → parse cycle.
    #[test]
    fn json_payload_round_trips(v in 1_u32..100, client_id in "[a-z0-9]{1,32}") {
        let handshake = Handshake { v, client_id };
        let frame = Frame::json(Opcode::Handshake, &handshake).expect("encodes");
        let parsed = frame
            .decode_payload::<Handshake>()
            .expect("parses")
            .expect("has a body");
        prop_assert_eq!(parsed, handshake);
    }
}

#[test]
fn back_to_back_frames_decode_in_order() {
    let mut codec = OpcodeFrameCodec::default();
    let mut buf = BytesMut::new();
    codec
        .encode(Frame::new(Opcode::Ping, Bytes::from_static(b"1")), &mut buf)
        .expect("encode should succeed");
    codec
        .encode(Frame::new(Opcode::Pong, Bytes::from_static(b"2")), &mut buf)
        .expect("encode should succeed");

    let first = codec.decode(&mut buf).expect("decode").expect("frame");
    let second = codec.decode(&mut buf).expect("decode").expect("frame");
    assert_eq!(first.op().expect("known"), Opcode::Ping);
    assert_eq!(second.op().expect("known"), Opcode::Pong);
    assert!(codec.decode(&mut buf).expect("decode").is_none());
}
