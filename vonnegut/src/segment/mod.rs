//! On-disk segment format: a `.log`/`.index` file pair sharing a base-offset
//! file stem (spec §2, §3). This module owns file-naming, opening, and
//! byte-level framing; the append/roll/recover state machine lives in
//! `crate::log`.

pub mod index;
pub mod record_batch;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use vonnegut_common::error::{Result, SegmentError};

pub use index::{IndexEntry, IndexReader, IndexWriter};
pub use record_batch::{decode_payloads, encode_batch, find_offset, scan_records, Record};

/// Base offsets are zero-padded to 20 decimal digits in file names
/// (spec §3 "File name of `.log` equals the base offset...").
pub const BASE_OFFSET_WIDTH: usize = 20;

pub fn log_path(dir: &Path, base_offset: i64) -> PathBuf {
    dir.join(format!("{base_offset:0width$}.log", width = BASE_OFFSET_WIDTH))
}

pub fn index_path(dir: &Path, base_offset: i64) -> PathBuf {
    dir.join(format!("{base_offset:0width$}.index", width = BASE_OFFSET_WIDTH))
}

/// Parse a `.log`/`.index` file stem back into its base offset.
pub fn parse_base_offset(stem: &str) -> Result<i64> {
    if stem.len() != BASE_OFFSET_WIDTH {
        return Err(SegmentError::InvalidBaseOffsetName(stem.to_string()).into());
    }
    stem.parse::<i64>()
        .map_err(|_| SegmentError::InvalidBaseOffsetName(stem.to_string()).into())
}

/// List every segment base offset present in `dir` by scanning for
/// `*.log` files (spec §4.3 recovery step 1).
pub fn list_base_offsets(dir: &Path) -> Result<Vec<i64>> {
    let mut offsets = Vec::new();
    if !dir.exists() {
        return Ok(offsets);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("log") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                offsets.push(parse_base_offset(stem)?);
            }
        }
    }
    offsets.sort_unstable();
    Ok(offsets)
}

/// Create a fresh, empty `.log`/`.index` pair for `base_offset`. Used both
/// when bootstrapping a brand-new partition and when rolling to a new
/// active segment (spec §4.3 "create new empty files named by that base
/// offset").
pub fn create_segment_files(dir: &Path, base_offset: i64) -> Result<(File, File)> {
    std::fs::create_dir_all(dir)?;
    let log = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path(dir, base_offset))?;
    let index = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(index_path(dir, base_offset))?;
    Ok((log, index))
}

/// Open an existing segment's `.log` for append, positioned at `pos`, and
/// its `.index` for append, positioned at `index_pos`. `.log` is truncated
/// to `pos` first if recovery determined a trailing partial record must be
/// discarded (spec §4.3 step 3).
pub fn open_segment_for_append(
    dir: &Path,
    base_offset: i64,
    pos: u64,
    index_pos: u64,
) -> Result<(File, File)> {
    let log_path = log_path(dir, base_offset);
    let index_path = index_path(dir, base_offset);

    let log = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&log_path)?;
    log.set_len(pos)?;

    let mut log = log;
    log.seek_to_end_at(pos)?;

    let index = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&index_path)?;
    index.set_len(index_pos)?;
    let mut index = index;
    index.seek_to_end_at(index_pos)?;

    Ok((log, index))
}

/// Small helper trait so callers can position an append handle without
/// pulling in `std::io::Seek` boilerplate at every call site.
trait SeekToEndAt {
    fn seek_to_end_at(&mut self, pos: u64) -> std::io::Result<()>;
}

impl SeekToEndAt for File {
    fn seek_to_end_at(&mut self, pos: u64) -> std::io::Result<()> {
        use std::io::{Seek, SeekFrom};
        self.seek(SeekFrom::Start(pos))?;
        Ok(())
    }
}

/// Append raw bytes to a `.log` file handle positioned at EOF.
pub fn append_log_bytes(log: &mut File, data: &[u8]) -> Result<()> {
    log.write_all(data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_offset_round_trips_through_file_name() {
        let dir = tempfile::tempdir().unwrap();
        create_segment_files(dir.path(), 42).unwrap();
        let offsets = list_base_offsets(dir.path()).unwrap();
        assert_eq!(offsets, vec![42]);
    }

    #[test]
    fn invalid_stem_is_rejected() {
        assert!(parse_base_offset("not-a-number").is_err());
        assert!(parse_base_offset("123").is_err());
    }
}
