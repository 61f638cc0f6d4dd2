use criterion::{black_box, criterion_group, criterion_main, Criterion};

use inferenceql::eval::{Env, Settings};
use inferenceql::plan::plan;
use inferenceql::value::row_of;
use inferenceql::{parse, q, Models, Relation, Value};

fn relation(rows: usize) -> Relation {
    let rows = (0..rows)
        .map(|i| {
            row_of(vec![
                ("x", Value::Int(i as i64)),
                ("y", if i % 3 == 0 { Value::Null } else { Value::Int((i * 2) as i64) }),
            ])
        })
        .collect();
    Relation::new(rows, vec!["x".into(), "y".into()])
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let query = "SELECT x FROM data WHERE y IS NOT NULL ORDER BY x DESC LIMIT 10";

    let tree = parse(query).unwrap();
    let mut env = Env::base();
    env.insert("data", Value::Relation(relation(1_000).add_placeholders()));
    let settings = Settings::default();
    c.bench_function("plan select", |b| {
        b.iter(|| plan(black_box(&tree), &env, &settings).unwrap())
    });

    for size in [100usize, 1_000, 10_000] {
        let rows = relation(size);
        c.bench_function(&format!("q select {}", size), |b| {
            b.iter(|| q(black_box(query), rows.clone(), Models::default()).unwrap())
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
