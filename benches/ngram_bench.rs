//! Criterion benchmarks for n-gram generation and result reduction.
//!
//! Run with: cargo bench

use corpus_ngrams::prelude::*;
use corpus_ngrams::witness::ngram_counts;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn tokenizer() -> Tokenizer {
    Tokenizer::from_profile(TokenizerProfile::Cbeta)
}

/// Synthetic witness text with recurring runs, so n-grams repeat the way
/// formulaic prose does.
fn synthetic_tokens(length: usize) -> Vec<String> {
    (0..length)
        .map(|i| {
            let c = b'a' + ((i * 7 + i / 13) % 26) as u8;
            (c as char).to_string()
        })
        .collect()
}

fn bench_ngram_generation(c: &mut Criterion) {
    let tokenizer = tokenizer();
    let mut group = c.benchmark_group("ngram_generation");

    for length in [1_000, 10_000, 50_000] {
        let tokens = synthetic_tokens(length);
        group.bench_with_input(BenchmarkId::new("size_3", length), &length, |b, _| {
            b.iter(|| ngram_counts(black_box(&tokens), &tokenizer, 3))
        });
        group.bench_with_input(BenchmarkId::new("size_8", length), &length, |b, _| {
            b.iter(|| ngram_counts(black_box(&tokens), &tokenizer, 8))
        });
    }

    group.finish();
}

fn bench_reduce(c: &mut Criterion) {
    let tokenizer = tokenizer();
    let mut group = c.benchmark_group("reduce");

    for length in [1_000, 10_000] {
        let tokens = synthetic_tokens(length);
        // Full raw query shape: every n-gram of sizes 1..=5 for one witness.
        let mut rows = Vec::new();
        for size in 1..=5 {
            for (ngram, count) in ngram_counts(&tokens, &tokenizer, size) {
                rows.push(ResultRow::base(ngram, size as u32, "T1", "base", count, "A"));
            }
        }
        group.bench_with_input(BenchmarkId::new("witness", length), &length, |b, _| {
            b.iter(|| {
                let mut results = Results::new(black_box(rows.clone()), tokenizer.clone());
                results.reduce();
                results
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ngram_generation, bench_reduce);
criterion_main!(benches);
