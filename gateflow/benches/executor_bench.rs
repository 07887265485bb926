//! Benchmarks for graph building and execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gateflow::cancellation::CancellationToken;
use gateflow::context::RunContextTemplate;
use gateflow::pipeline::Executor;
use gateflow::testing::{daily_period, linear_pipeline};

const NODES: [&str; 11] = [
    "n01", "n02", "n03", "n04", "n05", "n06", "n07", "n08", "n09", "n10", "n11",
];

fn build_benchmark(c: &mut Criterion) {
    c.bench_function("build_linear_11", |b| {
        b.iter(|| black_box(linear_pipeline(black_box(&NODES))));
    });
}

fn execute_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let graph = linear_pipeline(&NODES);
    let template = RunContextTemplate::new().with_root("/data");
    let executor = Executor::default();
    let cancel = CancellationToken::new();
    let period = daily_period(2024, 1, 1);

    c.bench_function("execute_linear_11", |b| {
        b.iter(|| {
            runtime.block_on(async {
                black_box(executor.execute(&graph, template.bind(period), &cancel).await)
            })
        });
    });
}

criterion_group!(benches, build_benchmark, execute_benchmark);
criterion_main!(benches);
