//! Metrics for Vonnegut, following the `metrics` facade used throughout the
//! teacher corpus so a Prometheus exporter can be wired up by the binary
//! without this crate depending on one directly.

use metrics::{counter, histogram};

/// Record a successful append: record count and encoded byte size.
pub fn record_append(topic: &str, partition: i32, records: u64, bytes: u64) {
    let partition = partition.to_string();
    counter!("vonnegut_records_appended_total", "topic" => topic.to_string(), "partition" => partition.clone())
        .increment(records);
    counter!("vonnegut_bytes_appended_total", "topic" => topic.to_string(), "partition" => partition)
        .increment(bytes);
}

/// Record a segment roll.
pub fn record_segment_roll(topic: &str, partition: i32) {
    counter!("vonnegut_segment_rolls_total", "topic" => topic.to_string(), "partition" => partition.to_string())
        .increment(1);
}

/// Record append latency in microseconds.
pub fn record_append_latency(latency_us: f64) {
    histogram!("vonnegut_append_latency_us").record(latency_us);
}

/// Record fetch latency in microseconds.
pub fn record_fetch_latency(latency_us: f64) {
    histogram!("vonnegut_fetch_latency_us").record(latency_us);
}

/// Record bytes returned by a fetch.
pub fn record_fetch_bytes(topic: &str, partition: i32, bytes: u64) {
    counter!("vonnegut_bytes_fetched_total", "topic" => topic.to_string(), "partition" => partition.to_string())
        .increment(bytes);
}
