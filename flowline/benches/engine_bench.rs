//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flowline::prelude::*;
use flowline::testing::SuccessStep;
use std::collections::HashMap;
use std::sync::Arc;

fn engine_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let engine = Engine::with_defaults();
    for name in ["validate", "pay", "notify"] {
        engine
            .register_step(name, Arc::new(SuccessStep::new(name)))
            .unwrap();
    }
    let definition = PipelineDefinition::new("bench")
        .steps(["validate", "pay", "notify"]);

    c.bench_function("three_step_pipeline", |b| {
        b.iter(|| {
            let ctx = runtime
                .block_on(engine.execute(&definition, HashMap::new()))
                .unwrap();
            black_box(ctx.status())
        })
    });
}

criterion_group!(benches, engine_benchmark);
criterion_main!(benches);
