use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use tabularium::{DenseTable, Entity, EntityRange, StableTable};

fn benchmark(c: &mut Criterion) {
    const COUNT: u32 = 10_000;

    let mut dense = DenseTable::new();
    let mut stable = StableTable::new();
    let mut fragmented = StableTable::new();

    dense.add_range_with(EntityRange::from_raw(1, COUNT + 1), |entity| {
        u64::from(entity.raw())
    });
    stable.add_range_with(EntityRange::from_raw(1, COUNT + 1), |entity| {
        u64::from(entity.raw())
    });
    fragmented.add_range_with(EntityRange::from_raw(1, COUNT + 1), |entity| {
        u64::from(entity.raw())
    });

    for id in (1..=COUNT).step_by(2) {
        fragmented.remove(Entity::from_raw(id));
    }

    c.bench_function("dense_iterate", |bencher| {
        bencher.iter(|| {
            let mut sum = 0;

            dense.for_each_component(|&value| sum += value);

            black_box(sum)
        })
    });

    c.bench_function("stable_iterate", |bencher| {
        bencher.iter(|| {
            let mut sum = 0;

            stable.for_each_component(|&value| sum += value);

            black_box(sum)
        })
    });

    c.bench_function("stable_iterate_half_tombstoned", |bencher| {
        bencher.iter(|| {
            let mut sum = 0;

            fragmented.for_each_component(|&value| sum += value);

            black_box(sum)
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
