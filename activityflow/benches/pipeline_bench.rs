//! Benchmarks for payload hashing and pipeline overhead.

use activityflow::activities::activity_fn;
use activityflow::context::ActivityContext;
use activityflow::observability::{hash_data, hash_error};
use activityflow::pipeline::PipelineBuilder;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn hashing_benchmark(c: &mut Criterion) {
    let payload = vec![7u8; 4096];
    c.bench_function("hash_data_4k", |b| b.iter(|| hash_data(black_box(&payload))));
    c.bench_function("hash_error", |b| {
        b.iter(|| hash_error(black_box("GRPC_UNAVAILABLE")));
    });
}

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let pipeline = runtime.block_on(async {
        PipelineBuilder::new()
            .build("echo", activity_fn(|_ctx, input| async move { Ok(input) }))
            .unwrap()
    });

    c.bench_function("pipeline_invoke_echo", |b| {
        b.iter(|| {
            runtime.block_on(async {
                pipeline
                    .invoke(ActivityContext::new("echo"), black_box(b"payload".to_vec()))
                    .await
            })
        });
    });
}

criterion_group!(benches, hashing_benchmark, pipeline_benchmark);
criterion_main!(benches);
