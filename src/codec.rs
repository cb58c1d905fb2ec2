//! Length-delimited bincode codec for driver frames.
//!
//! The driver itself only consumes [`ResponseFrame`]s and produces
//! [`OutboundFrame`]s; this module supplies a concrete wire format so a
//! [`Driver`](crate::client::Driver) can be attached to any byte stream. Each
//! frame is a bincode body behind a 4-byte big-endian length prefix.

use std::{io, marker::PhantomData};

use bincode::{
    Decode,
    Encode,
    error::{DecodeError, EncodeError},
};
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::frame::{OutboundFrame, OutboundKind, RequestId, ResponseFrame};

/// Minimum frame length in bytes.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum frame length in bytes (16 MiB).
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Transport failure or invalid length prefix.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The frame body could not be encoded.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] EncodeError),
    /// The frame body could not be decoded.
    #[error("failed to decode frame: {0}")]
    Decode(#[from] DecodeError),
    /// An outbound frame carried an unknown kind tag.
    #[error("unknown outbound frame kind {0}")]
    UnknownKind(u8),
}

/// Conversion between a frame type and its bincode body.
pub trait WireMessage: Sized {
    /// Encode the frame body.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if bincode rejects the value.
    fn to_wire(&self) -> Result<Vec<u8>, CodecError>;

    /// Decode a frame body.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the body is malformed.
    fn from_wire(bytes: &[u8]) -> Result<Self, CodecError>;
}

#[derive(Encode, Decode)]
struct WireResponse {
    request_id: u64,
    status_code: u16,
    status_message: String,
    payload: Option<Vec<u8>>,
}

#[derive(Encode, Decode)]
struct WireOutbound {
    request_id: u64,
    kind: u8,
    payload: Vec<u8>,
}

const KIND_REQUEST: u8 = 0;
const KIND_AUTHENTICATION: u8 = 1;

fn encode<T: Encode>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::encode_to_vec(value, bincode::config::standard())?)
}

fn decode<T: Decode<()>>(bytes: &[u8]) -> Result<T, CodecError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}

impl WireMessage for ResponseFrame {
    fn to_wire(&self) -> Result<Vec<u8>, CodecError> {
        encode(&WireResponse {
            request_id: self.request_id.as_u64(),
            status_code: self.status_code,
            status_message: self.status_message.clone(),
            payload: self.payload.as_ref().map(|p| p.to_vec()),
        })
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, CodecError> {
        let wire: WireResponse = decode(bytes)?;
        Ok(Self {
            request_id: RequestId::new(wire.request_id),
            status_code: wire.status_code,
            status_message: wire.status_message,
            payload: wire.payload.map(Bytes::from),
        })
    }
}

impl WireMessage for OutboundFrame {
    fn to_wire(&self) -> Result<Vec<u8>, CodecError> {
        let kind = match self.kind {
            OutboundKind::Request => KIND_REQUEST,
            OutboundKind::Authentication => KIND_AUTHENTICATION,
        };
        encode(&WireOutbound {
            request_id: self.request_id.as_u64(),
            kind,
            payload: self.payload.to_vec(),
        })
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, CodecError> {
        let wire: WireOutbound = decode(bytes)?;
        let kind = match wire.kind {
            KIND_REQUEST => OutboundKind::Request,
            KIND_AUTHENTICATION => OutboundKind::Authentication,
            other => return Err(CodecError::UnknownKind(other)),
        };
        Ok(Self {
            request_id: RequestId::new(wire.request_id),
            kind,
            payload: Bytes::from(wire.payload),
        })
    }
}

/// Tokio codec framing `T` behind a length prefix.
#[derive(Debug)]
pub struct FrameCodec<T> {
    inner: LengthDelimitedCodec,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for FrameCodec<T> {
    fn default() -> Self { Self::new(MAX_FRAME_LENGTH) }
}

impl<T> FrameCodec<T> {
    /// Create a codec accepting frames up to `max_frame_length` bytes,
    /// clamped to [`MIN_FRAME_LENGTH`]..=[`MAX_FRAME_LENGTH`].
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        let inner = LengthDelimitedCodec::builder()
            .max_frame_length(max_frame_length.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH))
            .new_codec();
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T: WireMessage> Decoder for FrameCodec<T> {
    type Item = T;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<T>, CodecError> {
        match self.inner.decode(src)? {
            Some(body) => T::from_wire(&body).map(Some),
            None => Ok(None),
        }
    }
}

impl<T: WireMessage> Encoder<T> for FrameCodec<T> {
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), CodecError> {
        let body = item.to_wire()?;
        self.inner.encode(Bytes::from(body), dst)?;
        Ok(())
    }
}
