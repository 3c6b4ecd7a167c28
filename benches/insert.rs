use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use tabularium::{DenseTable, Entity, StableTable};

fn benchmark(c: &mut Criterion) {
    const COUNT: u32 = 10_000;

    c.bench_function("dense_insert", |bencher| {
        bencher.iter(|| {
            let mut table = DenseTable::new();

            for id in 1..=COUNT {
                table.add(Entity::from_raw(id), black_box(u64::from(id)));
            }

            table
        })
    });

    c.bench_function("stable_insert", |bencher| {
        bencher.iter(|| {
            let mut table = StableTable::new();

            for id in 1..=COUNT {
                table.add(Entity::from_raw(id), black_box(u64::from(id)));
            }

            table
        })
    });
}

criterion_group!(
    name = this;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5));
    targets = benchmark,
);
criterion_main!(this);
