use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vonnegut::fetch;
use vonnegut::log::PartitionLog;
use vonnegut_common::config::LogConfig;
use vonnegut_common::types::TopicPartition;

fn cfg() -> LogConfig {
    LogConfig {
        log_dirs: vec!["./data".into()],
        segment_bytes: 64 * 1024 * 1024,
        index_max_bytes: 10 * 1024 * 1024,
        index_interval_bytes: 4096,
    }
}

fn bench_append_1kb(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut log = PartitionLog::open(TopicPartition::new("bench-topic", 0), dir.path(), cfg()).unwrap();
    let payload = Bytes::from(vec![b'x'; 1024]);

    c.bench_function("append_1kb", |b| {
        b.iter(|| {
            log.append(black_box(&[payload.clone()])).unwrap();
        })
    });
}

fn bench_fetch_1kb(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let tp = TopicPartition::new("bench-topic", 0);
    let mut log = PartitionLog::open(tp.clone(), dir.path(), cfg()).unwrap();
    let payload = Bytes::from(vec![b'x'; 1024]);
    for _ in 0..10_000 {
        log.append(&[payload.clone()]).unwrap();
    }

    c.bench_function("fetch_1kb_from_middle", |b| {
        b.iter(|| {
            fetch::fetch(
                &tp,
                log.dir(),
                &log.segment_base_offsets(),
                log.high_water_mark(),
                black_box(5_000),
                black_box(4096),
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_append_1kb, bench_fetch_1kb);
criterion_main!(benches);
