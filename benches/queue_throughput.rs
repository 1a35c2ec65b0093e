use attestor::queue::PriorityQueue;
use attestor::request::{InputMap, ProofRequest, ProofRequestOptions};
use attestor::Job;
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn sample_job(priority: i32) -> Job {
    Job::new(
        ProofRequest {
            proof_type: "balance_threshold".into(),
            subject_id: None,
            account_id: None,
            public_inputs: InputMap::new(),
            private_inputs: InputMap::new(),
            options: ProofRequestOptions::default(),
        },
        "balance_threshold",
        priority,
    )
}

fn bench_enqueue_dequeue(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("build tokio runtime for bench harness");

    c.bench_function("enqueue_1000_jobs", |b| {
        b.iter(|| {
            let queue = PriorityQueue::new();
            for i in 0..1000 {
                queue.enqueue(sample_job(i % 10)).expect("queue not closed");
            }
        });
    });

    c.bench_function("enqueue_dequeue_1000_jobs", |b| {
        b.iter(|| {
            rt.block_on(async {
                let queue = Arc::new(PriorityQueue::new());
                for i in 0..1000 {
                    queue.enqueue(sample_job(i % 10)).expect("queue not closed");
                }
                let cancel = CancellationToken::new();
                for _ in 0..1000 {
                    queue.dequeue(&cancel).await.expect("job available");
                }
            });
        });
    });
}

criterion_group!(benches, bench_enqueue_dequeue);
criterion_main!(benches);
