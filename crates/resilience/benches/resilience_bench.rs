//! Benchmarks for the admission-control hot paths.
//!
//! The breaker check and token acquisition sit in front of every outbound
//! call, so their overhead should stay in the tens of nanoseconds.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use palisade_resilience::{CircuitBreaker, RateLimitConfig, TokenBucket};

fn bench_breaker_admission(c: &mut Criterion) {
    let breaker = CircuitBreaker::default();

    c.bench_function("circuit_breaker_can_execute_closed", |b| {
        b.iter(|| std::hint::black_box(breaker.can_execute()))
    });

    c.bench_function("circuit_breaker_record_success", |b| {
        b.iter(|| breaker.record_success())
    });
}

fn bench_token_bucket(c: &mut Criterion) {
    let bucket = TokenBucket::new(RateLimitConfig {
        max_tokens: 1_000_000,
        window: Duration::from_secs(1),
    })
    .expect("valid bucket");

    c.bench_function("token_bucket_acquire", |b| {
        b.iter(|| std::hint::black_box(bucket.try_acquire()))
    });
}

criterion_group!(benches, bench_breaker_admission, bench_token_bucket);
criterion_main!(benches);
