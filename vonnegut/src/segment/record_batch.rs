//! Record and record-batch framing for `.log` files (spec §3):
//! `{offset:int64 BE, size:int32 BE}{payload: size bytes}`, repeated once
//! per record with no padding or gaps between records.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use vonnegut_common::error::{Result, SegmentError};

pub const RECORD_HEADER_LEN: usize = 12;

/// One decoded record: its assigned offset and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub offset: i64,
    pub payload: Bytes,
}

/// Encode a batch of payloads, assigning them consecutive offsets starting
/// at `first_offset` (spec §4.3 step 1 and §9's "engine-assigned offsets
/// always win"). Returns the encoded bytes.
pub fn encode_batch(first_offset: i64, payloads: &[Bytes]) -> Bytes {
    let total: usize = payloads
        .iter()
        .map(|p| RECORD_HEADER_LEN + p.len())
        .sum();
    let mut out = BytesMut::with_capacity(total);
    for (i, payload) in payloads.iter().enumerate() {
        out.put_i64(first_offset + i as i64);
        out.put_i32(payload.len() as i32);
        out.put_slice(payload);
    }
    out.freeze()
}

/// Decode every whole record out of `data`, which is assumed to already be
/// a run of complete records (e.g. the `record_set` of a produce request
/// after the engine overwrites its offsets, or a fetched byte range). Used
/// by the dispatcher to extract payloads from a client-submitted
/// `record_set` before handing them to the partition writer.
pub fn decode_payloads(mut data: Bytes) -> Result<Vec<Bytes>> {
    let mut out = Vec::new();
    while data.has_remaining() {
        if data.remaining() < RECORD_HEADER_LEN {
            return Err(SegmentError::TruncatedHeader(0).into());
        }
        let _offset = data.get_i64();
        let size = data.get_i32();
        if size < 0 {
            return Err(SegmentError::TruncatedHeader(0).into());
        }
        let size = size as usize;
        if data.remaining() < size {
            return Err(SegmentError::TruncatedPayload(0, size, data.remaining()).into());
        }
        out.push(data.copy_to_bytes(size));
    }
    Ok(out)
}

/// Result of scanning a `.log` file header-by-header (spec §4.3 recovery
/// step 3 and §4.4 step 3's forward scan).
pub struct ScanResult {
    /// Offset of the last fully-read record, if any were read.
    pub last_offset: Option<i64>,
    /// Byte position immediately after the last fully-read record; this is
    /// also the point at which a truncated trailing record begins, if any.
    pub end_pos: u64,
    /// True if a partial (truncated) record followed the last complete one.
    pub truncated: bool,
}

/// Scan `.log` bytes starting at `start_pos` (already excluded from
/// `data`), reading one record header+payload at a time until EOF or a
/// short header/payload is hit. Pure function over a byte slice so both
/// recovery (which then truncates the file) and tests can drive it without
/// touching the filesystem.
pub fn scan_records(data: &[u8], start_pos: u64) -> ScanResult {
    let mut pos = 0usize;
    let mut last_offset = None;
    let mut truncated = false;

    loop {
        if pos == data.len() {
            break;
        }
        if data.len() - pos < RECORD_HEADER_LEN {
            truncated = true;
            break;
        }
        let offset = i64::from_be_bytes(data[pos..pos + 8].try_into().unwrap());
        let size = i32::from_be_bytes(data[pos + 8..pos + 12].try_into().unwrap());
        if size < 0 {
            truncated = true;
            break;
        }
        let size = size as usize;
        let record_len = RECORD_HEADER_LEN + size;
        if data.len() - pos < record_len {
            truncated = true;
            break;
        }
        pos += record_len;
        last_offset = Some(offset);
    }

    ScanResult {
        last_offset,
        end_pos: start_pos + pos as u64,
        truncated,
    }
}

/// Find the record whose offset equals `target` within `data` (already
/// sliced to start at some file position `p0`), scanning headers forward.
/// Returns the byte offset within `data` at which that record's header
/// begins, or `None` if `data` is exhausted before reaching it (spec §4.4
/// step 3).
pub fn find_offset(data: &[u8], target: i64) -> Option<usize> {
    let mut pos = 0usize;
    while pos + RECORD_HEADER_LEN <= data.len() {
        let offset = i64::from_be_bytes(data[pos..pos + 8].try_into().unwrap());
        let size = i32::from_be_bytes(data[pos + 8..pos + 12].try_into().unwrap());
        if size < 0 {
            return None;
        }
        let size = size as usize;
        if offset == target {
            return Some(pos);
        }
        let record_len = RECORD_HEADER_LEN + size;
        if pos + record_len > data.len() {
            return None;
        }
        pos += record_len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_scan_recovers_last_offset() {
        let payloads = vec![Bytes::from_static(b"a"), Bytes::from_static(b"bb"), Bytes::from_static(b"ccc")];
        let encoded = encode_batch(10, &payloads);
        let scan = scan_records(&encoded, 0);
        assert_eq!(scan.last_offset, Some(12));
        assert_eq!(scan.end_pos as usize, encoded.len());
        assert!(!scan.truncated);
    }

    #[test]
    fn scan_stops_at_truncated_trailing_record() {
        let payloads = vec![Bytes::from_static(b"a"), Bytes::from_static(b"bb")];
        let mut encoded = encode_batch(0, &payloads).to_vec();
        encoded.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 10, 1, 2]);
        let scan = scan_records(&encoded, 0);
        assert_eq!(scan.last_offset, Some(1));
        assert!(scan.truncated);
        assert_eq!(scan.end_pos as usize, RECORD_HEADER_LEN + 1 + RECORD_HEADER_LEN + 2);
    }

    #[test]
    fn find_offset_locates_record() {
        let payloads = vec![Bytes::from_static(b"a"), Bytes::from_static(b"bb"), Bytes::from_static(b"ccc")];
        let encoded = encode_batch(5, &payloads);
        let pos = find_offset(&encoded, 6).unwrap();
        assert_eq!(i64::from_be_bytes(encoded[pos..pos + 8].try_into().unwrap()), 6);
    }

    #[test]
    fn decode_payloads_round_trips() {
        let payloads = vec![Bytes::from_static(b"x"), Bytes::from_static(b"yz")];
        let encoded = encode_batch(0, &payloads);
        let decoded = decode_payloads(encoded).unwrap();
        assert_eq!(decoded, payloads);
    }
}
