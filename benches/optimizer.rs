use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bar_cut_optimizer::{Angles, Optimizer, Part, Stock};
use criterion::*;
use rand::prelude::*;

fn build_optimizer(num_parts: u32, angled_fraction: f64) -> Optimizer {
    let mut rng: StdRng = SeedableRng::seed_from_u64(1);

    let mut optimizer = Optimizer::new();
    optimizer.add_stock(Stock { id: 1, length: 6000, quantity: 0 });
    optimizer.add_stock(Stock { id: 2, length: 4000, quantity: 50 });

    for i in 0..num_parts {
        let angle = if rng.gen_bool(angled_fraction) {
            rng.gen_range(15..=75)
        } else {
            0
        };
        optimizer.add_part(Part {
            id: i,
            length: rng.gen_range(200..=3000),
            quantity: 1,
            angles: Angles { tl: angle, tr: 0, bl: 0, br: 0 },
            thickness: None,
        });
    }

    optimizer
}

pub fn benchmark_square_parts(c: &mut Criterion) {
    c.bench_function("500 square parts, no shared cuts", |b| {
        b.iter(|| {
            let optimizer = build_optimizer(500, 0.0);
            let _ = optimizer.optimize_without_cancellation(|_, _| {});
        })
    });
}

pub fn benchmark_mixed_angled_parts(c: &mut Criterion) {
    c.bench_function("500 parts, half mitred", |b| {
        b.iter(|| {
            let optimizer = build_optimizer(500, 0.5);
            let _ = optimizer.optimize_without_cancellation(|_, _| {});
        })
    });
}

pub fn benchmark_large_angled_population(c: &mut Criterion) {
    c.bench_function("5000 parts, half mitred", |b| {
        b.iter(|| {
            let optimizer = build_optimizer(5000, 0.5);
            let cancel = Arc::new(AtomicBool::new(false));
            let _ = optimizer.optimize(cancel, |_, _| {});
        })
    });
}

criterion_group!(
    benches,
    benchmark_square_parts,
    benchmark_mixed_angled_parts,
    benchmark_large_angled_population
);
criterion_main!(benches);
