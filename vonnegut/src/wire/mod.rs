//! Kafka-style wire framing: length-prefixed frames over a TCP byte stream,
//! primitive encode/decode helpers, and the typed request/response messages
//! carried inside a frame.
//!
//! Buffers are read/write `BytesMut`, frozen into `Bytes` on handoff rather
//! than copied. Primitives cover what a Kafka-compatible codec needs:
//! fixed-width big-endian ints, a length-prefixed string, a length-prefixed
//! byte array, and `array<T>`.

pub mod messages;
pub mod primitives;

use bytes::{BufMut, Bytes, BytesMut};
use vonnegut_common::error::WireError;

pub use primitives::*;

/// Well-known API keys this codec recognizes (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKey {
    Produce,
    Fetch,
    Metadata,
    Topics,
    ApiVersions,
}

impl ApiKey {
    pub fn from_i16(v: i16) -> Result<Self, WireError> {
        match v {
            0 => Ok(ApiKey::Produce),
            1 => Ok(ApiKey::Fetch),
            3 => Ok(ApiKey::Metadata),
            4 => Ok(ApiKey::Topics),
            18 => Ok(ApiKey::ApiVersions),
            other => Err(WireError::UnsupportedApiKey(other)),
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            ApiKey::Produce => 0,
            ApiKey::Fetch => 1,
            ApiKey::Metadata => 3,
            ApiKey::Topics => 4,
            ApiKey::ApiVersions => 18,
        }
    }
}

/// The common header every request payload begins with (spec §4.1):
/// `{api_key, api_version, correlation_id, client_id: string16}`.
#[derive(Debug, Clone)]
pub struct RequestHeader {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
    pub client_id: Option<String>,
}

impl RequestHeader {
    pub fn decode(src: &mut Bytes) -> Result<Self, WireError> {
        let api_key = get_i16(src)?;
        let api_version = get_i16(src)?;
        let correlation_id = get_i32(src)?;
        let client_id = get_string16(src)?;
        Ok(Self {
            api_key,
            api_version,
            correlation_id,
            client_id,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_i16(self.api_key);
        dst.put_i16(self.api_version);
        dst.put_i32(self.correlation_id);
        put_string16(dst, self.client_id.as_deref());
    }
}

/// Outcome of attempting to decode one frame out of a connection's
/// accumulated read buffer (spec §4.1 "Decoding is incremental").
pub enum FrameDecode {
    /// Fewer than 4 bytes buffered; need at least this many more bytes
    /// before the size prefix itself can be read.
    NeedMore(usize),
    /// The size prefix is known but the full payload has not arrived yet;
    /// need at least this many more bytes buffered in total (`4 + size`).
    NeedMorePayload(usize),
    /// A full frame was available: the raw payload (header + body, with
    /// the length prefix already stripped) and the number of bytes
    /// consumed from the front of the source buffer.
    Frame { payload: Bytes, consumed: usize },
}

/// Attempt to decode one length-prefixed request frame from the front of
/// `buf` without consuming it; the caller advances the buffer by
/// `consumed` bytes once it has dispatched the frame.
pub fn try_decode_frame(buf: &[u8]) -> FrameDecode {
    if buf.len() < 4 {
        return FrameDecode::NeedMore(4 - buf.len());
    }
    let size = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let total = 4 + size;
    if buf.len() < total {
        return FrameDecode::NeedMorePayload(total);
    }

    FrameDecode::Frame {
        payload: Bytes::copy_from_slice(&buf[4..total]),
        consumed: total,
    }
}

/// Write a response payload with its length prefix: `{size}{payload}`.
pub fn frame_response(payload: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(4 + payload.len());
    out.put_i32(payload.len() as i32);
    out.put_slice(payload);
    out
}
