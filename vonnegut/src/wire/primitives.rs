//! Checked primitive encode/decode helpers for the wire codec.
//!
//! Every decode helper returns `Result<_, WireError>` instead of panicking;
//! `bytes::Buf`'s own `get_i16`/`get_i32`/etc. panic when the buffer is
//! short, which is wrong here: a truncated or adversarial frame must turn
//! into a decode error the connection can report, never a crash.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use vonnegut_common::error::WireError;

fn need(src: &Bytes, n: usize) -> Result<(), WireError> {
    if src.remaining() < n {
        Err(WireError::NeedMoreBytes(n - src.remaining()))
    } else {
        Ok(())
    }
}

pub fn get_i16(src: &mut Bytes) -> Result<i16, WireError> {
    need(src, 2)?;
    Ok(src.get_i16())
}

pub fn get_i32(src: &mut Bytes) -> Result<i32, WireError> {
    need(src, 4)?;
    Ok(src.get_i32())
}

pub fn get_i64(src: &mut Bytes) -> Result<i64, WireError> {
    need(src, 8)?;
    Ok(src.get_i64())
}

/// Decode a `string16`: `{len: i16}{utf8 bytes}`. A length of `-1` decodes
/// to `None` (Kafka's nullable-string convention).
pub fn get_string16(src: &mut Bytes) -> Result<Option<String>, WireError> {
    let len = get_i16(src)?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    need(src, len)?;
    let bytes = src.copy_to_bytes(len);
    let s = String::from_utf8(bytes.to_vec())
        .map_err(|e| WireError::CorruptMessage(format!("invalid utf8 in string16: {e}")))?;
    Ok(Some(s))
}

pub fn put_string16(dst: &mut BytesMut, s: Option<&str>) {
    match s {
        None => dst.put_i16(-1),
        Some(s) => {
            dst.put_i16(s.len() as i16);
            dst.put_slice(s.as_bytes());
        }
    }
}

/// Decode a `bytes32`: `{len: i32}{raw bytes}`. A length of `-1` decodes to
/// `None`.
pub fn get_bytes32(src: &mut Bytes) -> Result<Option<Bytes>, WireError> {
    let len = get_i32(src)?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    need(src, len)?;
    Ok(Some(src.copy_to_bytes(len)))
}

pub fn put_bytes32(dst: &mut BytesMut, b: Option<&[u8]>) {
    match b {
        None => dst.put_i32(-1),
        Some(b) => {
            dst.put_i32(b.len() as i32);
            dst.put_slice(b);
        }
    }
}

/// Decode an `array<T>`: `{count: i32}{T * count}`. A count of `-1` decodes
/// to an empty vec (Kafka's nullable-array convention collapses to empty
/// here since Vonnegut never distinguishes "absent" from "empty" array).
pub fn get_array<T>(
    src: &mut Bytes,
    mut decode_one: impl FnMut(&mut Bytes) -> Result<T, WireError>,
) -> Result<Vec<T>, WireError> {
    let count = get_i32(src)?;
    if count < 0 {
        return Ok(Vec::new());
    }
    let count = count as usize;
    let mut out = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        out.push(decode_one(src)?);
    }
    Ok(out)
}

pub fn put_array<T>(dst: &mut BytesMut, items: &[T], mut encode_one: impl FnMut(&mut BytesMut, &T)) {
    dst.put_i32(items.len() as i32);
    for item in items {
        encode_one(dst, item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string16_round_trips() {
        let mut buf = BytesMut::new();
        put_string16(&mut buf, Some("vonnegut"));
        let mut frozen = buf.freeze();
        assert_eq!(get_string16(&mut frozen).unwrap(), Some("vonnegut".to_string()));
    }

    #[test]
    fn string16_null_round_trips() {
        let mut buf = BytesMut::new();
        put_string16(&mut buf, None);
        let mut frozen = buf.freeze();
        assert_eq!(get_string16(&mut frozen).unwrap(), None);
    }

    #[test]
    fn truncated_i32_errors_instead_of_panicking() {
        let mut src = Bytes::from_static(&[0, 1]);
        assert!(matches!(get_i32(&mut src), Err(WireError::NeedMoreBytes(_))));
    }

    #[test]
    fn array_round_trips() {
        let mut buf = BytesMut::new();
        put_array(&mut buf, &[1i32, 2, 3], |dst, v| dst.put_i32(*v));
        let mut frozen = buf.freeze();
        let decoded = get_array(&mut frozen, |src| get_i32(src)).unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }
}
