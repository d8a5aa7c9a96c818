use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use portal_guard::{
    sanitize_for_storage, sanitize_html, timing_safe_eq, AuditEvent, AuditEventType, Clock,
    CounterStore, MemoryCounterStore, Outcome, RateLimiter, SystemClock, WindowPolicy,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn limiter(limit: u32) -> RateLimiter {
    let store: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    RateLimiter::new(
        "bench",
        WindowPolicy::new(limit, Duration::from_secs(3600)).unwrap(),
        store,
        clock,
    )
}

/// Benchmark single-threaded rate limit decisions
fn bench_single_threaded_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_threaded");
    group.throughput(Throughput::Elements(1000));

    // Mostly allowed vs. mostly rejected after the first few
    for limit in [5u32, 1_000_000] {
        group.bench_with_input(BenchmarkId::new("check", limit), &limit, |b, &limit| {
            let limiter = limiter(limit);
            b.iter(|| {
                for _ in 0..1000 {
                    black_box(limiter.check(black_box("user@example.com:203.0.113.5")));
                }
            })
        });
    }

    group.finish();
}

/// Benchmark multi-threaded concurrent throughput
fn bench_concurrent_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");

    for num_threads in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements((*num_threads as u64) * 1000));

        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let limiter = Arc::new(limiter(1_000_000));

                    let handles: Vec<_> = (0..num_threads)
                        .map(|i| {
                            let limiter = Arc::clone(&limiter);
                            std::thread::spawn(move || {
                                let key = format!("user-{}", i);
                                for _ in 0..1000 {
                                    black_box(limiter.check(black_box(&key)));
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

/// Benchmark store growth up to the entry cap
fn bench_store_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_scaling");

    for num_keys in [100, 1000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("insert", num_keys), num_keys, |b, &num_keys| {
            let keys: Vec<String> = (0..num_keys).map(|i| format!("user-{}", i)).collect();
            b.iter(|| {
                let limiter = limiter(100);
                for key in &keys {
                    limiter.check(key);
                }
            })
        });
    }

    group.finish();
}

/// Benchmark sanitizers and secret comparison
fn bench_sanitize(c: &mut Criterion) {
    let mut group = c.benchmark_group("sanitize");
    let bio = "Hi! I'm <b>Hanako</b> from room 204 & I like <script>tea</script>   onclick=x ".repeat(6);

    group.bench_function("sanitize_html", |b| b.iter(|| sanitize_html(black_box(&bio))));
    group.bench_function("sanitize_for_storage", |b| {
        b.iter(|| sanitize_for_storage(black_box(&bio)))
    });
    group.bench_function("timing_safe_eq", |b| {
        b.iter(|| timing_safe_eq(black_box("nightly-job-secret"), black_box("nightly-job-secreT")))
    });

    group.finish();
}

/// Benchmark building a redacted audit event
fn bench_audit_event(c: &mut Criterion) {
    c.bench_function("audit_event_build", |b| {
        b.iter(|| {
            AuditEvent::builder(AuditEventType::ProfileUpdate, "Profile updated", Outcome::Success)
                .user_id(black_box("user-123"))
                .ip_address(Some("203.0.113.5"))
                .meta("password", "hunter2")
                .meta("profile", json!({ "room": "204", "email": "a@b.co" }))
                .error_message("failed for a@b.co")
                .build()
        })
    });
}

criterion_group!(
    benches,
    bench_single_threaded_throughput,
    bench_concurrent_throughput,
    bench_store_scaling,
    bench_sanitize,
    bench_audit_event,
);
criterion_main!(benches);
