//! Process-wide registry mapping `(topic, partition) -> worker` so that
//! the dispatcher can address a partition by name without knowing whether
//! it has been created yet (spec §5 "Shared resources", §9 "Registry of
//! partitions"). Grounded in `engine::StreamingEngine`'s `DashMap<String,
//! Topic>` pattern, keyed here by the full `TopicPartition` instead of a
//! nested topic->partition structure since every lookup already carries
//! both.

use std::path::PathBuf;

use dashmap::DashMap;
use tracing::info;

use vonnegut_common::config::LogConfig;
use vonnegut_common::error::Result;
use vonnegut_common::types::TopicPartition;

use crate::worker::{PartitionWorker, WorkerTask};

/// Registered partitions and the log directories they live under.
pub struct PartitionRegistry {
    log_dirs: Vec<PathBuf>,
    config: LogConfig,
    queue_depth: usize,
    workers: DashMap<TopicPartition, PartitionWorker>,
}

impl PartitionRegistry {
    pub fn new(config: LogConfig, queue_depth: usize) -> Self {
        Self {
            log_dirs: config.log_dirs.clone(),
            config,
            queue_depth,
            workers: DashMap::new(),
        }
    }

    /// Pick a log directory for a partition deterministically so restarts
    /// land on the same directory (spec §6 "log_dirs ... one is selected
    /// per partition").
    fn dir_for(&self, tp: &TopicPartition) -> PathBuf {
        let idx = (tp.partition.unsigned_abs() as usize) % self.log_dirs.len().max(1);
        self.log_dirs[idx].join(tp.dir_name())
    }

    pub fn is_registered(&self, tp: &TopicPartition) -> bool {
        self.workers.contains_key(tp)
    }

    /// Ensure a worker exists for `tp`, spawning (and running recovery for)
    /// one if this is the first time it's addressed, mirroring the
    /// dispatcher's `ensure_topic` collaborator call (spec §4.5).
    pub fn ensure(&self, tp: &TopicPartition) -> Result<()> {
        if self.workers.contains_key(tp) {
            return Ok(());
        }
        let dir = self.dir_for(tp);
        info!(%tp, dir = %dir.display(), "registering new partition worker");
        let worker = PartitionWorker::spawn(tp.clone(), dir, self.config.clone(), self.queue_depth)?;
        self.workers.insert(tp.clone(), worker);
        Ok(())
    }

    pub fn sender(&self, tp: &TopicPartition) -> Option<crossbeam::channel::Sender<WorkerTask>> {
        self.workers.get(tp).map(|w| w.sender())
    }

    /// Every currently-registered partition, for metadata responses.
    pub fn registered(&self) -> Vec<TopicPartition> {
        self.workers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn remove(&self, tp: &TopicPartition) {
        self.workers.remove(tp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(dir: PathBuf) -> LogConfig {
        LogConfig {
            log_dirs: vec![dir],
            segment_bytes: 1 << 20,
            index_max_bytes: 1 << 20,
            index_interval_bytes: 1 << 20,
        }
    }

    #[test]
    fn ensure_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PartitionRegistry::new(cfg(dir.path().to_path_buf()), 16);
        let tp = TopicPartition::new("orders", 0);

        registry.ensure(&tp).unwrap();
        assert!(registry.is_registered(&tp));
        registry.ensure(&tp).unwrap();
        assert_eq!(registry.registered().len(), 1);
    }

    #[test]
    fn remove_drops_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PartitionRegistry::new(cfg(dir.path().to_path_buf()), 16);
        let tp = TopicPartition::new("orders", 0);

        registry.ensure(&tp).unwrap();
        registry.remove(&tp);
        assert!(!registry.is_registered(&tp));
    }

    #[test]
    fn unregistered_partition_has_no_sender() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PartitionRegistry::new(cfg(dir.path().to_path_buf()), 16);
        assert!(registry.sender(&TopicPartition::new("missing", 0)).is_none());
    }
}
