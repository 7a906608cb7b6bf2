use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use event_receiver::config::PoolConfig;
use event_receiver::errors::ProcessError;
use event_receiver::ingest::{MemoryQueue, QueueMessage};
use event_receiver::pool::WorkerPool;
use event_receiver::processor::processor_fn;
use tokio_util::sync::CancellationToken;

const MESSAGES: usize = 256;

fn filled_queue() -> Arc<MemoryQueue> {
    let q = MemoryQueue::new();
    for i in 0..MESSAGES {
        q.push(QueueMessage::new(
            Bytes::from(format!(r#"{{"id":"job-{i}"}}"#)),
            format!("r{i}"),
        ));
    }
    Arc::new(q)
}

/// Receive, dispatch, process and delete a full in-memory backlog.
fn bench_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime");

    c.bench_function("worker_pool/drain_256_x8", |b| {
        b.iter_batched(
            filled_queue,
            |queue| {
                rt.block_on(async {
                    let processor =
                        Arc::new(processor_fn(|_: Bytes| async { Ok::<_, ProcessError>(()) }));
                    let cfg = PoolConfig::new("bench", 8).expect("config").with_wait_seconds(0);
                    let pool = WorkerPool::new(queue.clone(), processor, cfg);
                    let monitor = pool.monitor();
                    let shutdown = CancellationToken::new();

                    let watcher = {
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            while monitor.stats().deleted < MESSAGES as u64 {
                                tokio::time::sleep(Duration::from_micros(50)).await;
                            }
                            shutdown.cancel();
                        })
                    };

                    let summary = pool.run(shutdown).await;
                    watcher.await.expect("watcher");
                    criterion::black_box(summary);
                })
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
