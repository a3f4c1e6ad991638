#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::net::IpAddr;
use std::time::Duration;
use tokio::runtime::Runtime;
use wardgate_security::{InMemoryRateLimiter, RateLimitScope, RateLimiter};

fn bench_check(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let limiter = InMemoryRateLimiter::new(10, Duration::from_secs(60), Duration::from_secs(300));
    let scope = RateLimitScope::SHARED_SECRET;
    let client: Option<IpAddr> = Some("203.0.113.7".parse().unwrap());
    rt.block_on(limiter.record_failure(client, &scope));

    c.bench_function("check_tracked_key", |b| {
        b.iter(|| rt.block_on(limiter.check(black_box(client), &scope)));
    });

    let untracked: Option<IpAddr> = Some("203.0.113.8".parse().unwrap());
    c.bench_function("check_untracked_key", |b| {
        b.iter(|| rt.block_on(limiter.check(black_box(untracked), &scope)));
    });
}

fn bench_record_and_reset(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let limiter =
        InMemoryRateLimiter::new(1_000_000, Duration::from_secs(60), Duration::from_secs(300));
    let scope = RateLimitScope::SHARED_SECRET;
    let mut octet = 0u8;

    c.bench_function("record_failure_then_reset", |b| {
        b.iter(|| {
            octet = octet.wrapping_add(1);
            let client = Some(IpAddr::from([198, 51, 100, octet]));
            rt.block_on(async {
                limiter.record_failure(client, &scope).await;
                limiter.reset(client, &scope).await;
            });
        });
    });
}

criterion_group!(benches, bench_check, bench_record_and_reset);
criterion_main!(benches);
