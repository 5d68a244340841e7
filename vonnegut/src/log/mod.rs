//! Partition log: the single-writer state machine owning one partition's
//! segments (spec §4.3). `append` assigns offsets, serializes records,
//! conditionally writes a sparse index entry, and conditionally rolls to a
//! new segment. Recovery reconstructs this state from disk at startup.

use std::fs::File;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, warn};

use vonnegut_common::config::LogConfig;
use vonnegut_common::error::{LogError, Result};
use vonnegut_common::types::TopicPartition;

use crate::segment::{self, IndexEntry, IndexWriter};

/// In-memory state of the single writer for one partition (spec §3
/// "Partition state").
pub struct PartitionLog {
    topic_partition: TopicPartition,
    dir: PathBuf,
    config: LogConfig,

    log_file: File,
    index: IndexWriter,

    /// Base offset of the active segment.
    base_offset: i64,
    /// Current write position in the active `.log`.
    pos: u64,
    /// Bytes written to the active `.log` since the last index entry.
    byte_count: u64,
    /// Next offset to assign.
    next_offset: i64,

    /// Sealed segments' base offsets, ascending, excluding the active one.
    sealed_base_offsets: Vec<i64>,
}

/// Outcome of a successful `append`: the offset assigned to the batch's
/// first record and how many records were appended.
#[derive(Debug, Clone, Copy)]
pub struct AppendResult {
    pub first_offset: i64,
    pub count: i64,
}

impl PartitionLog {
    /// Open (creating if absent) the partition directory at `dir` and run
    /// recovery to reconstruct writer state (spec §4.3 "Recovery").
    pub fn open(topic_partition: TopicPartition, dir: impl Into<PathBuf>, config: LogConfig) -> Result<Self> {
        let dir = dir.into();
        if config.segment_bytes > vonnegut_common::config::MAX_SEGMENT_BYTES {
            return Err(LogError::SegmentTooLargeFor24BitIndex(
                config.segment_bytes as i64,
                vonnegut_common::config::MAX_SEGMENT_BYTES as i64,
            )
            .into());
        }

        std::fs::create_dir_all(&dir)?;
        let mut base_offsets = segment::list_base_offsets(&dir)?;

        let mut sealed = Vec::new();
        let base_offset = if base_offsets.is_empty() {
            info!(dir = %dir.display(), "creating fresh base-0 segment");
            segment::create_segment_files(&dir, 0)?;
            0
        } else {
            let active = base_offsets.pop().unwrap();
            sealed = base_offsets;
            active
        };

        let (pos_hint, index_pos) = Self::recover_hint(&dir, base_offset)?;
        let (next_offset, log_end_pos) = Self::scan_and_truncate(&dir, base_offset, pos_hint)?;

        let (log_file, index_file) =
            segment::open_segment_for_append(&dir, base_offset, log_end_pos, index_pos)?;
        let index = IndexWriter::open(index_file, index_pos);

        info!(
            dir = %dir.display(),
            base_offset,
            next_offset,
            "partition log recovered"
        );

        Ok(Self {
            topic_partition,
            dir,
            config,
            log_file,
            index,
            base_offset,
            pos: log_end_pos,
            byte_count: 0,
            next_offset,
            sealed_base_offsets: sealed,
        })
    }

    /// Read the last index entry, if any, to seed the recovery scan's start
    /// position: `(pos_hint, index_pos)` where `pos_hint` is the `.log`
    /// byte position to resume scanning from and `index_pos` is the
    /// current `.index` length in bytes (spec §4.3 step 2).
    fn recover_hint(dir: &Path, base_offset: i64) -> Result<(u64, u64)> {
        let path = crate::segment::index_path(dir, base_offset);
        if !path.exists() {
            return Ok((0, 0));
        }
        let file = File::open(&path)?;
        let reader = crate::segment::IndexReader::open(file)?;
        reader.validate_monotone()?;
        let index_pos = reader.len_entries() * segment::index::ENTRY_WIDTH;
        match reader.last_entry()? {
            Some(entry) => Ok((entry.file_pos as u64, index_pos)),
            None => Ok((0, index_pos)),
        }
    }

    /// Scan forward from the index hint, truncating a trailing partial
    /// record if one is found (spec §4.3 step 3).
    fn scan_and_truncate(dir: &Path, base_offset: i64, pos_hint: u64) -> Result<(i64, u64)> {
        let log_path = crate::segment::log_path(dir, base_offset);
        let data = std::fs::read(&log_path)?;
        if pos_hint as usize > data.len() {
            return Err(LogError::RecoveryHintBeyondLogEnd {
                path: log_path,
                pos_hint,
                log_len: data.len(),
            }
            .into());
        }
        let scan = segment::scan_records(&data[pos_hint as usize..], pos_hint);

        if scan.truncated {
            warn!(
                path = %log_path.display(),
                end_pos = scan.end_pos,
                "truncating partial trailing record found during recovery"
            );
            let file = std::fs::OpenOptions::new().write(true).open(&log_path)?;
            file.set_len(scan.end_pos)?;
        }

        let next_offset = match scan.last_offset {
            Some(o) => o + 1,
            None => base_offset,
        };
        Ok((next_offset, scan.end_pos))
    }

    pub fn high_water_mark(&self) -> i64 {
        self.next_offset
    }

    pub fn base_offset(&self) -> i64 {
        self.base_offset
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All segment base offsets known to this partition, ascending,
    /// including the active one.
    pub fn segment_base_offsets(&self) -> Vec<i64> {
        let mut all = self.sealed_base_offsets.clone();
        all.push(self.base_offset);
        all
    }

    /// Append a non-empty batch of payloads, assigning them offsets
    /// starting at the next offset to assign (spec §4.3 "Append
    /// algorithm"). Offsets embedded in client-supplied frames are never
    /// consulted; engine-assigned offsets always win (spec §9).
    pub fn append(&mut self, payloads: &[Bytes]) -> Result<AppendResult> {
        if payloads.is_empty() {
            return Err(LogError::EmptyBatch.into());
        }
        let started = std::time::Instant::now();

        let first_offset = self.next_offset;
        let encoded = segment::encode_batch(first_offset, payloads);
        let s = encoded.len() as u64;
        let n = payloads.len() as i64;

        if self.should_roll(s) {
            self.roll(first_offset)?;
        }

        let pos_before_write = self.pos;
        segment::append_log_bytes(&mut self.log_file, &encoded)?;
        self.pos += s;
        self.byte_count += s;
        self.next_offset += n;

        if self.byte_count >= self.config.index_interval_bytes {
            self.index.append(IndexEntry {
                rel_offset: (first_offset - self.base_offset) as i32,
                file_pos: pos_before_write as i32,
            })?;
            self.index.flush()?;
            self.byte_count = 0;
        }

        debug!(
            first_offset,
            count = n,
            bytes = s,
            "appended batch"
        );

        vonnegut_common::metrics::record_append(
            &self.topic_partition.topic,
            self.topic_partition.partition,
            n as u64,
            s,
        );
        vonnegut_common::metrics::record_append_latency(started.elapsed().as_micros() as f64);

        Ok(AppendResult {
            first_offset,
            count: n,
        })
    }

    /// Roll BEFORE appending a batch of size `s` iff either the batch would
    /// push the log past `segment_bytes`, or the next index entry would
    /// overflow `index_max_bytes` (spec §4.3 "Rolling predicate").
    fn should_roll(&self, s: u64) -> bool {
        let would_exceed_log = self.pos + s > self.config.segment_bytes;
        let would_need_index_entry = self.byte_count + s >= self.config.index_interval_bytes;
        let would_exceed_index =
            would_need_index_entry && self.index.pos() + segment::index::ENTRY_WIDTH > self.config.index_max_bytes;
        would_exceed_log || would_exceed_index
    }

    fn roll(&mut self, new_base_offset: i64) -> Result<()> {
        self.log_file.sync_all().ok();
        self.index.flush()?;

        self.sealed_base_offsets.push(self.base_offset);

        let (log_file, index_file) = segment::create_segment_files(&self.dir, new_base_offset)?;
        self.log_file = log_file;
        self.index = IndexWriter::open(index_file, 0);
        self.base_offset = new_base_offset;
        self.pos = 0;
        self.byte_count = 0;

        vonnegut_common::metrics::record_segment_roll(
            &self.topic_partition.topic,
            self.topic_partition.partition,
        );
        info!(new_base_offset, "rolled to new segment");
        Ok(())
    }

    /// Flush and close both open files (spec §3 "destroyed on shutdown,
    /// which flushes and closes both files").
    pub fn shutdown(&mut self) -> Result<()> {
        self.log_file.sync_all()?;
        self.index.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn cfg(segment_bytes: u64, index_interval_bytes: u64, index_max_bytes: u64) -> LogConfig {
        LogConfig {
            log_dirs: vec!["./data".into()],
            segment_bytes,
            index_max_bytes,
            index_interval_bytes,
        }
    }

    #[test]
    fn append_assigns_contiguous_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = PartitionLog::open(TopicPartition::new("t", 0), dir.path(), cfg(1 << 20, 1 << 20, 1 << 20)).unwrap();

        let r1 = log
            .append(&[Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from_static(b"c")])
            .unwrap();
        assert_eq!(r1.first_offset, 0);
        assert_eq!(r1.count, 3);

        let r2 = log.append(&[Bytes::from_static(b"d")]).unwrap();
        assert_eq!(r2.first_offset, 3);
        assert_eq!(log.high_water_mark(), 4);
    }

    #[test]
    fn rolls_when_segment_bytes_would_be_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = PartitionLog::open(TopicPartition::new("t", 0), dir.path(), cfg(40, 20, 12)).unwrap();

        for _ in 0..10 {
            log.append(&[Bytes::from_static(b"0123456789")]).unwrap();
        }

        let offsets = log.segment_base_offsets();
        assert!(offsets.len() > 1, "expected multiple segments, got {offsets:?}");
        assert_eq!(offsets[0], 0);
    }

    #[test]
    fn rolls_when_index_would_exceed_max_bytes_even_though_segment_bytes_has_headroom() {
        let dir = tempfile::tempdir().unwrap();
        // segment_bytes is large enough that would_exceed_log can never fire;
        // index_max_bytes is tuned so the index sits at index_max_bytes - 5
        // after one entry, so the second batch's index entry is the thing
        // that trips should_roll (spec.md:154).
        let mut log = PartitionLog::open(TopicPartition::new("t", 0), dir.path(), cfg(1 << 20, 1, 11)).unwrap();

        log.append(&[Bytes::from_static(b"0123456789")]).unwrap();
        log.append(&[Bytes::from_static(b"0123456789")]).unwrap();

        let offsets = log.segment_base_offsets();
        assert!(
            offsets.len() > 1,
            "expected a roll triggered purely by the index-cap branch, got {offsets:?}"
        );
        assert_eq!(offsets[0], 0);
    }

    #[test]
    fn recovery_truncates_partial_trailing_record() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut log = PartitionLog::open(TopicPartition::new("t", 0), dir.path(), cfg(1 << 20, 1 << 20, 1 << 20)).unwrap();
            for i in 0..100 {
                log.append(&[Bytes::from(format!("rec{i}"))]).unwrap();
            }
            log.shutdown().unwrap();
        }

        let log_path = crate::segment::log_path(dir.path(), 0);
        let len = std::fs::metadata(&log_path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&log_path).unwrap();
        file.set_len(len - 5).unwrap();
        drop(file);

        let log = PartitionLog::open(TopicPartition::new("t", 0), dir.path(), cfg(1 << 20, 1 << 20, 1 << 20)).unwrap();
        assert_eq!(log.high_water_mark(), 99);
    }

    #[test]
    fn recovery_without_index_reconstructs_next_offset() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut log = PartitionLog::open(TopicPartition::new("t", 0), dir.path(), cfg(1 << 20, 1 << 20, 1 << 20)).unwrap();
            for i in 0..10 {
                log.append(&[Bytes::from(format!("rec{i}"))]).unwrap();
            }
            log.shutdown().unwrap();
        }
        std::fs::remove_file(crate::segment::index_path(dir.path(), 0)).unwrap();

        let log = PartitionLog::open(TopicPartition::new("t", 0), dir.path(), cfg(1 << 20, 1 << 20, 1 << 20)).unwrap();
        assert_eq!(log.high_water_mark(), 10);
    }

    #[test]
    fn recovery_is_a_fixed_point() {
        let dir = tempfile::tempdir().unwrap();
        let hwm_before = {
            let mut log = PartitionLog::open(TopicPartition::new("t", 0), dir.path(), cfg(1 << 20, 1 << 20, 1 << 20)).unwrap();
            for i in 0..20 {
                log.append(&[Bytes::from(format!("rec{i}"))]).unwrap();
            }
            log.shutdown().unwrap();
            log.high_water_mark()
        };

        let log = PartitionLog::open(TopicPartition::new("t", 0), dir.path(), cfg(1 << 20, 1 << 20, 1 << 20)).unwrap();
        assert_eq!(log.high_water_mark(), hwm_before);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = PartitionLog::open(TopicPartition::new("t", 0), dir.path(), cfg(1 << 20, 1 << 20, 1 << 20)).unwrap();
        assert!(log.append(&[]).is_err());
    }
}
