//! Fetch path: resolve a logical offset to a `(segment, file position)` via
//! the sparse index, then stream bytes forward from there (spec §4.4).
//!
//! This is read-only and runs concurrently with the partition's single
//! writer using positional reads (spec §5 "Reads vs writes"); it never
//! takes the writer's append path, only opens its own file handles.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::time::Instant;

use bytes::Bytes;
use vonnegut_common::error::Result;
use vonnegut_common::types::TopicPartition;

use crate::segment;

/// Outcome of a fetch against one partition.
pub struct FetchOutcome {
    pub record_set: Bytes,
    pub high_water_mark: i64,
    /// True if `start_offset` was outside `[0, high_water_mark]`.
    pub out_of_range: bool,
}

/// Read up to `max_bytes` (0 = unbounded-to-segment-end) worth of whole
/// records starting at the record whose offset equals `start_offset`.
///
/// `segment_base_offsets` must be ascending and include the active
/// segment's base offset; `dir` is the partition directory.
pub fn fetch(
    tp: &TopicPartition,
    dir: &Path,
    segment_base_offsets: &[i64],
    high_water_mark: i64,
    start_offset: i64,
    max_bytes: i32,
) -> Result<FetchOutcome> {
    let started = Instant::now();
    let outcome = fetch_inner(dir, segment_base_offsets, high_water_mark, start_offset, max_bytes)?;

    vonnegut_common::metrics::record_fetch_latency(started.elapsed().as_micros() as f64);
    if !outcome.record_set.is_empty() {
        vonnegut_common::metrics::record_fetch_bytes(&tp.topic, tp.partition, outcome.record_set.len() as u64);
    }
    Ok(outcome)
}

fn fetch_inner(
    dir: &Path,
    segment_base_offsets: &[i64],
    high_water_mark: i64,
    start_offset: i64,
    max_bytes: i32,
) -> Result<FetchOutcome> {
    if start_offset < 0 || start_offset > high_water_mark {
        return Ok(FetchOutcome {
            record_set: Bytes::new(),
            high_water_mark,
            out_of_range: true,
        });
    }
    if start_offset == high_water_mark {
        return Ok(FetchOutcome {
            record_set: Bytes::new(),
            high_water_mark,
            out_of_range: false,
        });
    }

    // Step 1: locate the segment whose base offset is the largest <= start_offset.
    let segment_idx = segment_base_offsets
        .iter()
        .rposition(|&base| base <= start_offset)
        .expect("start_offset < high_water_mark implies a containing segment exists");

    for &base_offset in &segment_base_offsets[segment_idx..] {
        if let Some(bytes) = read_from_segment(dir, base_offset, start_offset, max_bytes)? {
            return Ok(FetchOutcome {
                record_set: bytes,
                high_water_mark,
                out_of_range: false,
            });
        }
        // Record not found in this segment (EOF reached); advance to the
        // next segment and retry from its base offset (spec §4.4 step 3).
    }

    Ok(FetchOutcome {
        record_set: Bytes::new(),
        high_water_mark,
        out_of_range: true,
    })
}

/// Try to locate and read `start_offset` out of one segment. Returns
/// `Ok(None)` when the segment's `.log` is exhausted before the offset is
/// found, signalling the caller to advance to the next segment.
fn read_from_segment(
    dir: &Path,
    base_offset: i64,
    start_offset: i64,
    max_bytes: i32,
) -> Result<Option<Bytes>> {
    let log_path = segment::log_path(dir, base_offset);
    let log_file = File::open(&log_path)?;
    let log_len = log_file.metadata()?.len();

    // Step 2: binary-search the sparse index for a starting file position.
    let index_path = segment::index_path(dir, base_offset);
    let p0 = if index_path.exists() {
        let index_file = File::open(&index_path)?;
        let reader = segment::IndexReader::open(index_file)?;
        let rel_target = (start_offset - base_offset) as i32;
        reader.floor_entry(rel_target)?.map(|e| e.file_pos as u64).unwrap_or(0)
    } else {
        0
    };

    if p0 >= log_len {
        return Ok(None);
    }

    // Step 3: scan forward from p0 until the target offset's header is found.
    let mut buf = vec![0u8; (log_len - p0) as usize];
    log_file.read_exact_at(&mut buf, p0)?;

    let Some(rel_pos) = segment::find_offset(&buf, start_offset) else {
        return Ok(None);
    };

    // Step 4: return up to max_bytes worth of whole records from here,
    // never crossing a segment boundary, but always returning at least
    // the first record even if it alone exceeds max_bytes.
    let available = &buf[rel_pos..];
    let take = select_whole_records(available, max_bytes);
    Ok(Some(Bytes::copy_from_slice(&available[..take])))
}

/// Pick the largest whole-record-aligned prefix of `data` that fits within
/// `max_bytes` (0 = unbounded), always including at least the first record
/// (spec §4.4 step 4 "progress guarantee").
fn select_whole_records(data: &[u8], max_bytes: i32) -> usize {
    let limit = if max_bytes <= 0 { usize::MAX } else { max_bytes as usize };
    let mut pos = 0usize;
    let mut first = true;

    loop {
        if pos + segment::record_batch::RECORD_HEADER_LEN > data.len() {
            break;
        }
        let size = i32::from_be_bytes(data[pos + 8..pos + 12].try_into().unwrap());
        if size < 0 {
            break;
        }
        let record_len = segment::record_batch::RECORD_HEADER_LEN + size as usize;
        if pos + record_len > data.len() {
            break;
        }
        if !first && pos + record_len > limit {
            break;
        }
        pos += record_len;
        first = false;
        if pos >= limit {
            break;
        }
    }

    pos
}
