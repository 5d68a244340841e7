//! One dedicated OS thread per partition, consuming a bounded queue of
//! append/fetch tasks in FIFO order (spec §5 "Scheduling model"). Adapted
//! from the reactor's thread-per-core worker loop, but pinned to a single
//! partition rather than a CPU core: there is exactly one writer per
//! partition, and fetches are dispatched here too so that `append` and
//! `fetch` against the same partition observe a single total order of
//! queued requests even though fetches themselves only take read locks on
//! the filesystem.

use std::path::PathBuf;
use std::thread::JoinHandle;

use bytes::Bytes;
use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::{error, info};

use vonnegut_common::config::LogConfig;
use vonnegut_common::error::Result;
use vonnegut_common::types::TopicPartition;

use crate::fetch::{self, FetchOutcome};
use crate::log::{AppendResult, PartitionLog};

/// A unit of work queued to a partition's worker thread.
pub enum WorkerTask {
    Append {
        payloads: Vec<Bytes>,
        reply: Sender<Result<AppendResult>>,
    },
    Fetch {
        start_offset: i64,
        max_bytes: i32,
        reply: Sender<Result<FetchOutcome>>,
    },
    Shutdown,
}

/// A running partition worker: its task queue and the join handle for its
/// thread.
pub struct PartitionWorker {
    tx: Sender<WorkerTask>,
    handle: Option<JoinHandle<()>>,
}

impl PartitionWorker {
    /// Spawn the worker thread, opening (and recovering) the partition log
    /// before the thread starts servicing its queue.
    pub fn spawn(
        topic_partition: TopicPartition,
        dir: PathBuf,
        config: LogConfig,
        queue_depth: usize,
    ) -> Result<Self> {
        let mut log = PartitionLog::open(topic_partition.clone(), dir, config)?;
        let (tx, rx): (Sender<WorkerTask>, Receiver<WorkerTask>) = bounded(queue_depth);

        let handle = std::thread::Builder::new()
            .name(format!("vonnegut-{topic_partition}"))
            .spawn(move || {
                info!(%topic_partition, "partition worker started");
                for task in rx.iter() {
                    match task {
                        WorkerTask::Append { payloads, reply } => {
                            let result = log.append(&payloads);
                            let failed = result.is_err();
                            if let Err(e) = &result {
                                error!(%topic_partition, error = %e, "append failed, partition needs restart");
                            }
                            let _ = reply.send(result);
                            if failed {
                                break;
                            }
                        }
                        WorkerTask::Fetch {
                            start_offset,
                            max_bytes,
                            reply,
                        } => {
                            let result = fetch::fetch(
                                &topic_partition,
                                log.dir(),
                                &log.segment_base_offsets(),
                                log.high_water_mark(),
                                start_offset,
                                max_bytes,
                            );
                            let _ = reply.send(result);
                        }
                        WorkerTask::Shutdown => break,
                    }
                }
                if let Err(e) = log.shutdown() {
                    error!(%topic_partition, error = %e, "error flushing partition log on shutdown");
                }
                info!(%topic_partition, "partition worker stopped");
            })
            .expect("failed to spawn partition worker thread");

        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> Sender<WorkerTask> {
        self.tx.clone()
    }

    pub fn shutdown(&mut self) {
        let _ = self.tx.send(WorkerTask::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PartitionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    fn cfg() -> LogConfig {
        LogConfig {
            log_dirs: vec!["./data".into()],
            segment_bytes: 1 << 20,
            index_max_bytes: 1 << 20,
            index_interval_bytes: 1 << 20,
        }
    }

    #[test]
    fn append_then_fetch_round_trips_through_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let mut worker = PartitionWorker::spawn(
            TopicPartition::new("orders", 0),
            dir.path().to_path_buf(),
            cfg(),
            16,
        )
        .unwrap();

        let (reply_tx, reply_rx) = unbounded();
        worker
            .sender()
            .send(WorkerTask::Append {
                payloads: vec![Bytes::from_static(b"hello")],
                reply: reply_tx,
            })
            .unwrap();
        let append_result = reply_rx.recv().unwrap().unwrap();
        assert_eq!(append_result.first_offset, 0);

        let (reply_tx, reply_rx) = unbounded();
        worker
            .sender()
            .send(WorkerTask::Fetch {
                start_offset: 0,
                max_bytes: 0,
                reply: reply_tx,
            })
            .unwrap();
        let fetch_result = reply_rx.recv().unwrap().unwrap();
        assert!(!fetch_result.out_of_range);
        assert_eq!(fetch_result.high_water_mark, 1);

        worker.shutdown();
    }
}
