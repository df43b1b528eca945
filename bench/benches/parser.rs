use aeon::{parser::parse_module, scope::Scopes};
use criterion::{criterion_group, criterion_main, Criterion};
use std::{hint::black_box, path::Path, sync::Arc};

static INPUT: &str = include_str!("../inputs/big.aeon");

fn parser(input: &str, file: &Arc<Path>) {
    let mut scopes = Scopes::new();
    let body = parse_module(input.as_bytes(), file.clone(), &mut scopes).unwrap();
    _ = black_box((body, scopes));
}

fn criterion_benchmark(c: &mut Criterion) {
    let file: Arc<Path> = Arc::from(Path::new("big.aeon"));
    c.bench_function("parser", |b| {
        b.iter(|| {
            black_box(parser(black_box(INPUT), &file));
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
