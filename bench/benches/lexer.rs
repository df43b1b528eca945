use aeon::{lexer::Lexer, token::TokenKind};
use criterion::{criterion_group, criterion_main, Criterion};
use std::{hint::black_box, path::Path, sync::Arc};

static INPUT: &str = include_str!("../inputs/big.aeon");

fn lexer(input: &str, file: &Arc<Path>) {
    let mut i = 0;
    for token in Lexer::new(input.as_bytes(), file.clone()) {
        if matches!(token.kind, TokenKind::Invalid) {
            continue;
        }
        i += 1;
    }
    black_box(i);
}

fn criterion_benchmark(c: &mut Criterion) {
    let file: Arc<Path> = Arc::from(Path::new("big.aeon"));
    c.bench_function("lexer", |b| {
        b.iter(|| {
            black_box(lexer(black_box(INPUT), &file));
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
