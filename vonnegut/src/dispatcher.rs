//! Request dispatcher: routes decoded requests to the owning partition
//! worker and assembles responses in request order (spec §4.5).
//!
//! The cluster-manager and segment registry are named external
//! collaborators (spec §6) rather than in-scope modules. `ClusterManager`
//! is the narrow trait seam this dispatcher talks to; `NoopClusterManager`
//! is the in-process default (a chain-of-one that always claims
//! leadership) used until a real cluster manager exists.

use crossbeam::channel::bounded;
use tracing::warn;

use vonnegut_common::error::Error;
use vonnegut_common::types::{ErrorCode, TopicPartition};

use crate::registry::PartitionRegistry;
use crate::wire::messages::{
    FetchPartitionResponse, FetchRequest, FetchResponse, FetchTopicResponse, MetadataResponse,
    PartitionMetadata, ProducePartitionResponse, ProduceRequest, ProduceResponse,
    ProduceTopicResponse, TopicMetadata, TopicsRequest,
};
use crate::worker::WorkerTask;

/// Decides which node owns a `(topic, partition)` and answers metadata
/// queries (spec §6 "Cluster manager"). Out of scope beyond this seam:
/// chain topology, leader election, replica assignment.
pub trait ClusterManager: Send + Sync {
    /// `true` if this node is the leader (and therefore the right place to
    /// route reads/writes) for `tp`.
    fn owns(&self, tp: &TopicPartition) -> bool;

    /// Replica chain to report for `tp` in a metadata/topics response.
    fn replicas(&self, tp: &TopicPartition) -> Vec<String>;
}

/// Single-node default: this node owns everything it is asked about.
pub struct NoopClusterManager;

impl ClusterManager for NoopClusterManager {
    fn owns(&self, _tp: &TopicPartition) -> bool {
        true
    }

    fn replicas(&self, _tp: &TopicPartition) -> Vec<String> {
        vec!["self".to_string()]
    }
}

pub struct Dispatcher<C: ClusterManager> {
    registry: PartitionRegistry,
    cluster: C,
}

impl<C: ClusterManager> Dispatcher<C> {
    pub fn new(registry: PartitionRegistry, cluster: C) -> Self {
        Self { registry, cluster }
    }

    /// Route a decoded Produce request; per-partition failures are
    /// embedded in that partition's response slot, never failing the
    /// whole request (spec §7 "Propagation").
    pub fn produce(&self, req: ProduceRequest) -> ProduceResponse {
        let mut topics = Vec::with_capacity(req.topics.len());
        for topic_req in req.topics {
            let mut partitions = Vec::with_capacity(topic_req.partitions.len());
            for p in topic_req.partitions {
                let tp = TopicPartition::new(topic_req.topic.clone(), p.partition);
                let (error_code, offset) = match self.produce_one(&tp, p.record_set) {
                    Ok(offset) => (ErrorCode::None.code(), offset),
                    Err(DispatchError::NotLeader) => (ErrorCode::NotLeaderForPartition.code(), -1),
                    Err(DispatchError::Corrupt) => (ErrorCode::CorruptMessage.code(), -1),
                    Err(DispatchError::Internal(e)) => {
                        warn!(%tp, error = %e, "produce failed");
                        (ErrorCode::RequestTimedOut.code(), -1)
                    }
                };
                partitions.push(ProducePartitionResponse {
                    partition: p.partition,
                    error_code,
                    offset,
                });
            }
            topics.push(ProduceTopicResponse {
                topic: topic_req.topic,
                partitions,
            });
        }
        ProduceResponse { topics }
    }

    fn produce_one(&self, tp: &TopicPartition, record_set: bytes::Bytes) -> std::result::Result<i64, DispatchError> {
        if !self.cluster.owns(tp) {
            return Err(DispatchError::NotLeader);
        }
        self.registry.ensure(tp).map_err(DispatchError::Internal)?;
        let payloads = crate::segment::decode_payloads(record_set).map_err(|_| DispatchError::Corrupt)?;
        if payloads.is_empty() {
            return Err(DispatchError::Corrupt);
        }
        let sender = self.registry.sender(tp).ok_or(DispatchError::NotLeader)?;
        let (reply_tx, reply_rx) = bounded(1);
        sender
            .send(WorkerTask::Append {
                payloads,
                reply: reply_tx,
            })
            .map_err(|_| DispatchError::Internal(Error::Log(vonnegut_common::error::LogError::ShuttingDown)))?;
        let result = reply_rx
            .recv()
            .map_err(|_| DispatchError::Internal(Error::Log(vonnegut_common::error::LogError::ShuttingDown)))?
            .map_err(DispatchError::Internal)?;
        Ok(result.first_offset)
    }

    /// Route a decoded Fetch request (spec §4.5, §4.4).
    pub fn fetch(&self, req: FetchRequest) -> FetchResponse {
        let mut topics = Vec::with_capacity(req.topics.len());
        for topic_req in req.topics {
            let mut partitions = Vec::with_capacity(topic_req.partitions.len());
            for p in topic_req.partitions {
                let tp = TopicPartition::new(topic_req.topic.clone(), p.partition);
                partitions.push(self.fetch_one(&tp, p.partition, p.fetch_offset, p.max_bytes));
            }
            topics.push(FetchTopicResponse {
                topic: topic_req.topic,
                partitions,
            });
        }
        FetchResponse { topics }
    }

    fn fetch_one(&self, tp: &TopicPartition, partition: i32, fetch_offset: i64, max_bytes: i32) -> FetchPartitionResponse {
        if !self.registry.is_registered(tp) || !self.cluster.owns(tp) {
            return FetchPartitionResponse {
                partition,
                error_code: if self.cluster.owns(tp) {
                    ErrorCode::UnknownTopicOrPartition.code()
                } else {
                    ErrorCode::NotLeaderForPartition.code()
                },
                high_water_mark: 0,
                record_set: bytes::Bytes::new(),
            };
        }

        let Some(sender) = self.registry.sender(tp) else {
            return FetchPartitionResponse {
                partition,
                error_code: ErrorCode::UnknownTopicOrPartition.code(),
                high_water_mark: 0,
                record_set: bytes::Bytes::new(),
            };
        };

        let (reply_tx, reply_rx) = bounded(1);
        if sender
            .send(WorkerTask::Fetch {
                start_offset: fetch_offset,
                max_bytes,
                reply: reply_tx,
            })
            .is_err()
        {
            return FetchPartitionResponse {
                partition,
                error_code: ErrorCode::RequestTimedOut.code(),
                high_water_mark: 0,
                record_set: bytes::Bytes::new(),
            };
        }

        match reply_rx.recv() {
            Ok(Ok(outcome)) if outcome.out_of_range => FetchPartitionResponse {
                partition,
                error_code: ErrorCode::OffsetOutOfRange.code(),
                high_water_mark: outcome.high_water_mark,
                record_set: bytes::Bytes::new(),
            },
            Ok(Ok(outcome)) => FetchPartitionResponse {
                partition,
                error_code: ErrorCode::None.code(),
                high_water_mark: outcome.high_water_mark,
                record_set: outcome.record_set,
            },
            Ok(Err(e)) => {
                warn!(%tp, error = %e, "fetch failed");
                FetchPartitionResponse {
                    partition,
                    error_code: ErrorCode::RequestTimedOut.code(),
                    high_water_mark: 0,
                    record_set: bytes::Bytes::new(),
                }
            }
            Err(_) => FetchPartitionResponse {
                partition,
                error_code: ErrorCode::RequestTimedOut.code(),
                high_water_mark: 0,
                record_set: bytes::Bytes::new(),
            },
        }
    }

    /// Answer a Metadata/Topics request (spec §4.1). An empty topic list
    /// means "all known topics".
    pub fn metadata(&self, req: TopicsRequest) -> MetadataResponse {
        let wanted: Vec<TopicPartition> = if req.topics.is_empty() {
            self.registry.registered()
        } else {
            self.registry
                .registered()
                .into_iter()
                .filter(|tp| req.topics.contains(&tp.topic))
                .collect()
        };

        let mut by_topic: std::collections::BTreeMap<String, Vec<PartitionMetadata>> =
            std::collections::BTreeMap::new();
        for tp in wanted {
            by_topic.entry(tp.topic.clone()).or_default().push(PartitionMetadata {
                partition: tp.partition,
                replicas: self.cluster.replicas(&tp),
            });
        }

        MetadataResponse {
            topics: by_topic
                .into_iter()
                .map(|(topic, partitions)| TopicMetadata { topic, partitions })
                .collect(),
        }
    }
}

enum DispatchError {
    NotLeader,
    Corrupt,
    Internal(Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::messages::{FetchPartitionRequest, FetchTopicRequest, ProducePartitionRequest, ProduceTopicRequest};
    use vonnegut_common::config::LogConfig;

    fn cfg(dir: std::path::PathBuf) -> LogConfig {
        LogConfig {
            log_dirs: vec![dir],
            segment_bytes: 1 << 20,
            index_max_bytes: 1 << 20,
            index_interval_bytes: 1 << 20,
        }
    }

    fn dispatcher(dir: std::path::PathBuf) -> Dispatcher<NoopClusterManager> {
        Dispatcher::new(PartitionRegistry::new(cfg(dir), 16), NoopClusterManager)
    }

    #[test]
    fn produce_then_fetch_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path().to_path_buf());

        let record_set = crate::segment::encode_batch(0, &[bytes::Bytes::from_static(b"a"), bytes::Bytes::from_static(b"b")]);
        let produce_resp = d.produce(ProduceRequest {
            acks: 1,
            timeout_ms: 1000,
            topics: vec![ProduceTopicRequest {
                topic: "orders".to_string(),
                partitions: vec![ProducePartitionRequest { partition: 0, record_set }],
            }],
        });
        let p = &produce_resp.topics[0].partitions[0];
        assert_eq!(p.error_code, ErrorCode::None.code());
        assert_eq!(p.offset, 0);

        let fetch_resp = d.fetch(FetchRequest {
            replica_id: -1,
            max_wait_ms: 0,
            min_bytes: 0,
            topics: vec![FetchTopicRequest {
                topic: "orders".to_string(),
                partitions: vec![FetchPartitionRequest {
                    partition: 0,
                    fetch_offset: 0,
                    max_bytes: 0,
                }],
            }],
        });
        let fp = &fetch_resp.topics[0].partitions[0];
        assert_eq!(fp.error_code, ErrorCode::None.code());
        assert_eq!(fp.high_water_mark, 2);
    }

    #[test]
    fn fetch_unknown_partition_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path().to_path_buf());

        let fetch_resp = d.fetch(FetchRequest {
            replica_id: -1,
            max_wait_ms: 0,
            min_bytes: 0,
            topics: vec![FetchTopicRequest {
                topic: "missing".to_string(),
                partitions: vec![FetchPartitionRequest {
                    partition: 0,
                    fetch_offset: 0,
                    max_bytes: 0,
                }],
            }],
        });
        assert_eq!(fetch_resp.topics[0].partitions[0].error_code, ErrorCode::UnknownTopicOrPartition.code());
    }

    #[test]
    fn metadata_lists_registered_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path().to_path_buf());
        let record_set = crate::segment::encode_batch(0, &[bytes::Bytes::from_static(b"a")]);
        d.produce(ProduceRequest {
            acks: 1,
            timeout_ms: 1000,
            topics: vec![ProduceTopicRequest {
                topic: "orders".to_string(),
                partitions: vec![ProducePartitionRequest { partition: 0, record_set }],
            }],
        });

        let meta = d.metadata(TopicsRequest::default());
        assert_eq!(meta.topics.len(), 1);
        assert_eq!(meta.topics[0].topic, "orders");
    }
}
