//! Typed request/response bodies for the four APIs this codec recognizes
//! (spec §4.1): Produce, Fetch, Metadata, Topics. Encode/decode mirror each
//! other field-for-field so that encoding a decoded request reproduces the
//! original bytes.

use bytes::{BufMut, Bytes, BytesMut};
use vonnegut_common::error::WireError;

use super::primitives::*;

/// `topic_data[].partition_data[]` entry of a Produce request.
#[derive(Debug, Clone)]
pub struct ProducePartitionRequest {
    pub partition: i32,
    pub record_set: Bytes,
}

#[derive(Debug, Clone)]
pub struct ProduceTopicRequest {
    pub topic: String,
    pub partitions: Vec<ProducePartitionRequest>,
}

#[derive(Debug, Clone)]
pub struct ProduceRequest {
    pub acks: i16,
    pub timeout_ms: i32,
    pub topics: Vec<ProduceTopicRequest>,
}

impl ProduceRequest {
    pub fn decode(src: &mut Bytes) -> Result<Self, WireError> {
        let acks = get_i16(src)?;
        let timeout_ms = get_i32(src)?;
        let topics = get_array(src, |src| {
            let topic = get_string16(src)?
                .ok_or_else(|| WireError::CorruptMessage("produce topic name is null".into()))?;
            let partitions = get_array(src, |src| {
                let partition = get_i32(src)?;
                let record_set_size = get_i32(src)?;
                if record_set_size < 0 {
                    return Err(WireError::CorruptMessage(
                        "negative record_set_size".into(),
                    ));
                }
                let record_set = get_bytes32_fixed(src, record_set_size as usize)?;
                Ok(ProducePartitionRequest {
                    partition,
                    record_set,
                })
            })?;
            Ok(ProduceTopicRequest { topic, partitions })
        })?;
        Ok(Self {
            acks,
            timeout_ms,
            topics,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_i16(self.acks);
        dst.put_i32(self.timeout_ms);
        put_array(dst, &self.topics, |dst, t| {
            put_string16(dst, Some(&t.topic));
            put_array(dst, &t.partitions, |dst, p| {
                dst.put_i32(p.partition);
                dst.put_i32(p.record_set.len() as i32);
                dst.put_slice(&p.record_set);
            });
        });
    }
}

/// Unlike `bytes32`, `record_set` is never null: its length was already
/// read as `record_set_size` and is carried alongside rather than
/// re-encoded with its own `-1`-means-null prefix.
fn get_bytes32_fixed(src: &mut Bytes, len: usize) -> Result<Bytes, WireError> {
    if src.len() < len {
        return Err(WireError::NeedMoreBytes(len - src.len()));
    }
    Ok(src.split_to(len))
}

#[derive(Debug, Clone)]
pub struct ProducePartitionResponse {
    pub partition: i32,
    pub error_code: i16,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct ProduceTopicResponse {
    pub topic: String,
    pub partitions: Vec<ProducePartitionResponse>,
}

#[derive(Debug, Clone, Default)]
pub struct ProduceResponse {
    pub topics: Vec<ProduceTopicResponse>,
}

impl ProduceResponse {
    pub fn decode(src: &mut Bytes) -> Result<Self, WireError> {
        let topics = get_array(src, |src| {
            let topic = get_string16(src)?
                .ok_or_else(|| WireError::CorruptMessage("produce response topic is null".into()))?;
            let partitions = get_array(src, |src| {
                Ok(ProducePartitionResponse {
                    partition: get_i32(src)?,
                    error_code: get_i16(src)?,
                    offset: get_i64(src)?,
                })
            })?;
            Ok(ProduceTopicResponse { topic, partitions })
        })?;
        Ok(Self { topics })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        put_array(dst, &self.topics, |dst, t| {
            put_string16(dst, Some(&t.topic));
            put_array(dst, &t.partitions, |dst, p| {
                dst.put_i32(p.partition);
                dst.put_i16(p.error_code);
                dst.put_i64(p.offset);
            });
        });
    }
}

/// `topic_data[].partition_data[]` entry of a Fetch request.
#[derive(Debug, Clone)]
pub struct FetchPartitionRequest {
    pub partition: i32,
    pub fetch_offset: i64,
    pub max_bytes: i32,
}

#[derive(Debug, Clone)]
pub struct FetchTopicRequest {
    pub topic: String,
    pub partitions: Vec<FetchPartitionRequest>,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub replica_id: i32,
    pub max_wait_ms: i32,
    pub min_bytes: i32,
    pub topics: Vec<FetchTopicRequest>,
}

impl FetchRequest {
    pub fn decode(src: &mut Bytes) -> Result<Self, WireError> {
        let replica_id = get_i32(src)?;
        let max_wait_ms = get_i32(src)?;
        let min_bytes = get_i32(src)?;
        let topics = get_array(src, |src| {
            let topic = get_string16(src)?
                .ok_or_else(|| WireError::CorruptMessage("fetch topic name is null".into()))?;
            let partitions = get_array(src, |src| {
                Ok(FetchPartitionRequest {
                    partition: get_i32(src)?,
                    fetch_offset: get_i64(src)?,
                    max_bytes: get_i32(src)?,
                })
            })?;
            Ok(FetchTopicRequest { topic, partitions })
        })?;
        Ok(Self {
            replica_id,
            max_wait_ms,
            min_bytes,
            topics,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_i32(self.replica_id);
        dst.put_i32(self.max_wait_ms);
        dst.put_i32(self.min_bytes);
        put_array(dst, &self.topics, |dst, t| {
            put_string16(dst, Some(&t.topic));
            put_array(dst, &t.partitions, |dst, p| {
                dst.put_i32(p.partition);
                dst.put_i64(p.fetch_offset);
                dst.put_i32(p.max_bytes);
            });
        });
    }
}

#[derive(Debug, Clone)]
pub struct FetchPartitionResponse {
    pub partition: i32,
    pub error_code: i16,
    pub high_water_mark: i64,
    pub record_set: Bytes,
}

#[derive(Debug, Clone)]
pub struct FetchTopicResponse {
    pub topic: String,
    pub partitions: Vec<FetchPartitionResponse>,
}

#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub topics: Vec<FetchTopicResponse>,
}

impl FetchResponse {
    pub fn decode(src: &mut Bytes) -> Result<Self, WireError> {
        let topics = get_array(src, |src| {
            let topic = get_string16(src)?
                .ok_or_else(|| WireError::CorruptMessage("fetch response topic is null".into()))?;
            let partitions = get_array(src, |src| {
                let partition = get_i32(src)?;
                let error_code = get_i16(src)?;
                let high_water_mark = get_i64(src)?;
                let record_set_size = get_i32(src)?;
                if record_set_size < 0 {
                    return Err(WireError::CorruptMessage(
                        "negative record_set_size".into(),
                    ));
                }
                let record_set = get_bytes32_fixed(src, record_set_size as usize)?;
                Ok(FetchPartitionResponse {
                    partition,
                    error_code,
                    high_water_mark,
                    record_set,
                })
            })?;
            Ok(FetchTopicResponse { topic, partitions })
        })?;
        Ok(Self { topics })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        put_array(dst, &self.topics, |dst, t| {
            put_string16(dst, Some(&t.topic));
            put_array(dst, &t.partitions, |dst, p| {
                dst.put_i32(p.partition);
                dst.put_i16(p.error_code);
                dst.put_i64(p.high_water_mark);
                dst.put_i32(p.record_set.len() as i32);
                dst.put_slice(&p.record_set);
            });
        });
    }
}

/// Shared by Metadata and Topics requests: a list of topic names, empty
/// meaning "all topics" (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct TopicsRequest {
    pub topics: Vec<String>,
}

impl TopicsRequest {
    pub fn decode(src: &mut Bytes) -> Result<Self, WireError> {
        let topics = get_array(src, |src| {
            get_string16(src)?
                .ok_or_else(|| WireError::CorruptMessage("topic name is null".into()))
        })?;
        Ok(Self { topics })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        put_array(dst, &self.topics, |dst, t| put_string16(dst, Some(t)));
    }
}

/// One partition's replica-chain assignment, as reported by the
/// cluster-manager collaborator (spec §4.1, §6) and echoed verbatim.
#[derive(Debug, Clone)]
pub struct PartitionMetadata {
    pub partition: i32,
    pub replicas: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TopicMetadata {
    pub topic: String,
    pub partitions: Vec<PartitionMetadata>,
}

#[derive(Debug, Clone, Default)]
pub struct MetadataResponse {
    pub topics: Vec<TopicMetadata>,
}

impl MetadataResponse {
    pub fn decode(src: &mut Bytes) -> Result<Self, WireError> {
        let topics = get_array(src, |src| {
            let topic = get_string16(src)?
                .ok_or_else(|| WireError::CorruptMessage("metadata topic is null".into()))?;
            let partitions = get_array(src, |src| {
                let partition = get_i32(src)?;
                let replicas = get_array(src, |src| {
                    get_string16(src)?
                        .ok_or_else(|| WireError::CorruptMessage("replica name is null".into()))
                })?;
                Ok(PartitionMetadata {
                    partition,
                    replicas,
                })
            })?;
            Ok(TopicMetadata { topic, partitions })
        })?;
        Ok(Self { topics })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        put_array(dst, &self.topics, |dst, t| {
            put_string16(dst, Some(&t.topic));
            put_array(dst, &t.partitions, |dst, p| {
                dst.put_i32(p.partition);
                put_array(dst, &p.replicas, |dst, r| put_string16(dst, Some(r)));
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produce_request_round_trips() {
        let req = ProduceRequest {
            acks: 1,
            timeout_ms: 5000,
            topics: vec![ProduceTopicRequest {
                topic: "orders".to_string(),
                partitions: vec![ProducePartitionRequest {
                    partition: 0,
                    record_set: Bytes::from_static(b"hello"),
                }],
            }],
        };
        let mut buf = BytesMut::new();
        req.encode(&mut buf);
        let mut frozen = buf.freeze();
        let decoded = ProduceRequest::decode(&mut frozen).unwrap();
        assert_eq!(decoded.acks, 1);
        assert_eq!(decoded.topics[0].topic, "orders");
        assert_eq!(decoded.topics[0].partitions[0].record_set, Bytes::from_static(b"hello"));
        assert!(frozen.is_empty());
    }

    #[test]
    fn fetch_response_round_trips() {
        let resp = FetchResponse {
            topics: vec![FetchTopicResponse {
                topic: "orders".to_string(),
                partitions: vec![FetchPartitionResponse {
                    partition: 0,
                    error_code: 0,
                    high_water_mark: 4,
                    record_set: Bytes::from_static(b"abcd"),
                }],
            }],
        };
        let mut buf = BytesMut::new();
        resp.encode(&mut buf);
        let mut frozen = buf.freeze();
        let decoded = FetchResponse::decode(&mut frozen).unwrap();
        assert_eq!(decoded.topics[0].partitions[0].high_water_mark, 4);
    }

    #[test]
    fn topics_request_empty_means_all() {
        let mut buf = BytesMut::new();
        TopicsRequest::default().encode(&mut buf);
        let mut frozen = buf.freeze();
        let decoded = TopicsRequest::decode(&mut frozen).unwrap();
        assert!(decoded.topics.is_empty());
    }
}
