//! Per-connection handling: each accepted TCP connection is serviced on
//! its own OS thread with blocking I/O, reading length-prefixed frames and
//! handing decoded requests to the dispatcher. There is no connection
//! pool: partition workers, not connections, own all durable state, so
//! nothing here needs to be reused across connections.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::dispatcher::{ClusterManager, Dispatcher};
use crate::wire::messages::{FetchRequest, ProduceRequest, TopicsRequest};
use crate::wire::{self, ApiKey, RequestHeader};

/// Read/write buffers for one connection: accumulate reads, freeze
/// completed frames off without copying, drain writes incrementally.
struct ZeroCopyBuffer {
    read_buf: BytesMut,
}

impl ZeroCopyBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(capacity),
        }
    }

    fn read_into(&mut self, data: &[u8]) {
        self.read_buf.put_slice(data);
    }
}

/// Handle one connection end-to-end until the peer disconnects or a
/// decode error forces the connection closed (spec §7 "Corrupt input
/// frame ... connection MAY be closed").
pub fn serve_connection<C: ClusterManager>(mut stream: TcpStream, dispatcher: Arc<Dispatcher<C>>) {
    let peer = stream.peer_addr().ok();
    debug!(?peer, "connection accepted");
    stream.set_nodelay(true).ok();

    let mut buf = ZeroCopyBuffer::new(64 * 1024);
    let mut read_chunk = [0u8; 65536];

    loop {
        match stream.read(&mut read_chunk) {
            Ok(0) => {
                debug!(?peer, "connection closed by peer");
                break;
            }
            Ok(n) => buf.read_into(&read_chunk[..n]),
            Err(e) => {
                warn!(?peer, error = %e, "read error, closing connection");
                break;
            }
        }

        loop {
            match wire::try_decode_frame(&buf.read_buf) {
                wire::FrameDecode::NeedMore(_) | wire::FrameDecode::NeedMorePayload(_) => break,
                wire::FrameDecode::Frame { payload, consumed } => {
                    let response = match handle_frame(payload, dispatcher.as_ref()) {
                        Ok(resp) => resp,
                        Err(e) => {
                            warn!(?peer, error = %e, "decode error, closing connection");
                            buf.read_buf.advance(consumed);
                            return;
                        }
                    };
                    buf.read_buf.advance(consumed);
                    if stream.write_all(&response).is_err() {
                        warn!(?peer, "write error, closing connection");
                        return;
                    }
                }
            }
        }
    }
}

/// Decode one frame's request header and body, dispatch it, and encode
/// the response frame (spec §4.1).
fn handle_frame<C: ClusterManager>(payload: Bytes, dispatcher: &Dispatcher<C>) -> vonnegut_common::error::Result<BytesMut> {
    let mut body = payload;
    let header = RequestHeader::decode(&mut body)?;
    let api_key = ApiKey::from_i16(header.api_key)?;

    let mut response_body = BytesMut::new();
    response_body.put_i32(header.correlation_id);

    match api_key {
        ApiKey::Produce => {
            let req = ProduceRequest::decode(&mut body)?;
            dispatcher.produce(req).encode(&mut response_body);
        }
        ApiKey::Fetch => {
            let req = FetchRequest::decode(&mut body)?;
            dispatcher.fetch(req).encode(&mut response_body);
        }
        ApiKey::Metadata | ApiKey::Topics => {
            let req = TopicsRequest::decode(&mut body)?;
            dispatcher.metadata(req).encode(&mut response_body);
        }
        ApiKey::ApiVersions => {
            encode_api_versions_response(&mut response_body);
        }
    }

    Ok(wire::frame_response(&response_body))
}

/// `ApiVersions` carries no request body beyond the common header; the
/// response enumerates the api_key/min/max version triples this codec
/// supports, letting a generic client probe before sending Produce/Fetch
/// (SPEC_FULL §1.2).
fn encode_api_versions_response(dst: &mut BytesMut) {
    let supported = [
        ApiKey::Produce.as_i16(),
        ApiKey::Fetch.as_i16(),
        ApiKey::Metadata.as_i16(),
        ApiKey::Topics.as_i16(),
        ApiKey::ApiVersions.as_i16(),
    ];
    dst.put_i16(0); // error_code
    dst.put_i32(supported.len() as i32);
    for api_key in supported {
        dst.put_i16(api_key);
        dst.put_i16(0); // min_version
        dst.put_i16(0); // max_version
    }
}
