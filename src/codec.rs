//! Wire framing for the persistent connection.
//!
//! Every frame is an 8-byte little-endian header of `(operation_code,
//! payload_length)` followed by `payload_length` bytes of UTF-8 JSON. An
//! empty payload encodes `payload_length = 0` and omits the body entirely.
//!
//! The codec is stateless and performs no I/O; it plugs into
//! `tokio_util::codec::Framed` on whatever stream the session currently owns.
//! Decoding never interprets the JSON body; payload parsing happens above
//! the codec so a malformed body invalidates one frame, not the stream.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

/// Size of the `(opcode, payload_length)` frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Smallest accepted payload-length limit.
pub const MIN_PAYLOAD_LENGTH: usize = 64;

/// Largest accepted payload-length limit (16 MiB).
pub const MAX_PAYLOAD_LENGTH: usize = 16 * 1024 * 1024;

pub(crate) fn clamp_payload_length(value: usize) -> usize {
    value.clamp(MIN_PAYLOAD_LENGTH, MAX_PAYLOAD_LENGTH)
}

/// Operation codes of the local-socket protocol instance.
///
/// The gateway instance uses a different table; the session only ever
/// matches on this enum through [`Frame::op`], so a replacement table slots
/// in without touching the codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    /// First frame on a fresh transport, identifies the client.
    Handshake = 0,
    /// Request, response, or dispatched event envelope.
    Frame = 1,
    /// Peer-initiated close with a `{code, message}` body.
    Close = 2,
    /// Keepalive probe; answered with [`Opcode::Pong`].
    Ping = 3,
    /// Keepalive answer.
    Pong = 4,
}

impl Opcode {
    /// Raw wire value of this opcode.
    #[must_use]
    pub const fn as_u32(self) -> u32 { self as u32 }
}

impl TryFrom<u32> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            3 => Ok(Opcode::Ping),
            4 => Ok(Opcode::Pong),
            opcode => Err(ProtocolError::UnknownOpcode { opcode }),
        }
    }
}

/// One length-prefixed, operation-tagged unit on the wire.
///
/// The opcode is kept raw so frames with codes outside the known table still
/// decode; the session decides whether to drop them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Raw operation code.
    pub opcode: u32,
    /// JSON body; empty for body-less frames.
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame from an opcode and a pre-encoded payload.
    #[must_use]
    pub fn new(opcode: Opcode, payload: Bytes) -> Self {
        Self {
            opcode: opcode.as_u32(),
            payload,
        }
    }

    /// Build a body-less frame.
    #[must_use]
    pub fn empty(opcode: Opcode) -> Self { Self::new(opcode, Bytes::new()) }

    /// Serialize `payload` as JSON and wrap it in a frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if serialization fails.
    pub fn json<T: Serialize>(opcode: Opcode, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(opcode, Bytes::from(serde_json::to_vec(payload)?)))
    }

    /// Resolve the raw opcode against the known table.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownOpcode`] for codes outside the table.
    pub fn op(&self) -> Result<Opcode, ProtocolError> { Opcode::try_from(self.opcode) }

    /// Whether the frame carries no body.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.payload.is_empty() }

    /// Decode the JSON body into `T`, mapping an empty body to `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedFrame`] if the body is non-empty but
    /// not valid JSON for `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<Option<T>, ProtocolError> {
        if self.payload.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&self.payload)
            .map(Some)
            .map_err(ProtocolError::MalformedFrame)
    }
}

/// Framing-level errors raised while delimiting frames.
///
/// Unlike payload-level [`ProtocolError`]s, a framing error means the stream
/// position can no longer be trusted and the connection must be replaced.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The header announced a payload larger than the configured limit.
    #[error("frame exceeds max payload length: {size} > {max}")]
    OversizedFrame {
        /// Payload size announced by the header.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
}

impl From<FramingError> for io::Error {
    fn from(err: FramingError) -> Self { io::Error::new(io::ErrorKind::InvalidData, err) }
}

/// Codec for the `(opcode, payload_length)` + JSON wire format.
#[derive(Clone, Debug)]
pub struct OpcodeFrameCodec {
    max_payload_length: usize,
}

impl OpcodeFrameCodec {
    /// Construct a codec with a maximum accepted payload length.
    ///
    /// The limit is clamped to `[MIN_PAYLOAD_LENGTH, MAX_PAYLOAD_LENGTH]`.
    #[must_use]
    pub fn new(max_payload_length: usize) -> Self {
        Self {
            max_payload_length: clamp_payload_length(max_payload_length),
        }
    }

    /// Maximum payload length this codec will accept.
    #[must_use]
    pub fn max_payload_length(&self) -> usize { self.max_payload_length }
}

impl Default for OpcodeFrameCodec {
    fn default() -> Self { Self::new(MAX_PAYLOAD_LENGTH) }
}

impl Decoder for OpcodeFrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let opcode = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        let len = u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > self.max_payload_length {
            return Err(FramingError::OversizedFrame {
                size: len,
                max: self.max_payload_length,
            }
            .into());
        }
        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }
        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(Frame { opcode, payload }))
    }
}

impl Encoder<Frame> for OpcodeFrameCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if frame.payload.len() > self.max_payload_length {
            return Err(FramingError::OversizedFrame {
                size: frame.payload.len(),
                max: self.max_payload_length,
            }
            .into());
        }
        dst.reserve(HEADER_LEN + frame.payload.len());
        dst.put_u32_le(frame.opcode);
        dst.put_u32_le(u32::try_from(frame.payload.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "payload length exceeds u32")
        })?);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}
