//! Benchmarks for chain execution.

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use unitflow::context::Context;
use unitflow::errors::UnitError;
use unitflow::job::{Job, JobDefinition};
use unitflow::registry::UnitRegistry;
use unitflow::testing::TestEnv;
use unitflow::units::{Unit, UnitEnv, UnitOutcome};

#[derive(Debug)]
struct Seed(Context);

#[async_trait]
impl Unit for Seed {
    fn label(&self) -> &str {
        "seed"
    }

    async fn execute(
        &mut self,
        _input: Context,
        _env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        Ok(UnitOutcome::emit(self.0.clone()))
    }
}

fn registry(rows: usize) -> UnitRegistry {
    let rows: Vec<_> = (0..rows)
        .map(|i| serde_json::json!({"id": i, "qty": i % 10}))
        .collect();
    let seed = Context::from_json(serde_json::json!({ "rows": rows })).unwrap();
    let mut registry = UnitRegistry::with_builtin_units();
    registry.register("Seed", move |_| Box::new(Seed(seed.clone())));
    registry
}

fn job() -> JobDefinition {
    let none: [(&str, &str); 0] = [];
    JobDefinition::new("bench")
        .with_unit("Seed", none, "")
        .with_unit("Foreach", [("path", "rows")], "")
        .with_unit("Where", none, "input.qty > 4")
        .with_unit("Script", none, "input.total = input.qty * 2;")
}

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let registry = registry(1_000);
    let mut test_env = TestEnv::new();

    c.bench_function("fan_out_1000", |b| {
        b.iter(|| {
            // Cursors persist per instance, so every iteration needs a fresh job.
            let mut job = Job::new(job());
            black_box(runtime.block_on(job.execute(&registry, test_env.env())))
        });
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
