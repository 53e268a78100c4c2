use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cloudsdk_runtime::prelude::*;
use cloudsdk_runtime::{
    CapacityKey, CapacityLane, FixedJitter, HttpTransport, RetryPolicy, RetryPolicyConfig,
    SeededJitter,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use futures_util::future::{BoxFuture, join_all};
use http::{HeaderMap, Request, StatusCode};
use tokio::runtime::Runtime;

struct OkTransport;

impl HttpTransport for OkTransport {
    fn send<'a>(&'a self, _request: Request<Bytes>) -> BoxFuture<'a, SdkResult<HttpResponse>> {
        Box::pin(async {
            Ok(HttpResponse::new(
                StatusCode::OK,
                HeaderMap::new(),
                Bytes::from_static(b"{}"),
            ))
        })
    }
}

struct Ping;

impl Operation for Ping {
    type Output = ();

    fn name(&self) -> &'static str {
        "Ping"
    }

    fn marshal(&self, request: &mut RequestMessage) -> SdkResult<()> {
        request.body = Bytes::from_static(br#"{"ping":true}"#).into();
        Ok(())
    }

    fn unmarshal(&self, _response: &HttpResponse) -> SdkResult<Self::Output> {
        Ok(())
    }
}

fn benchmark_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("build benchmark runtime")
}

fn bench_capacity_acquire_release(c: &mut Criterion) {
    let registry = CapacityRegistry::new(CapacityConfig::standard());
    let keys: Vec<CapacityKey> = (0..16)
        .map(|index| CapacityKey::new(format!("https://svc-{index}.example.com")))
        .collect();

    let mut group = c.benchmark_group("capacity");
    group.bench_function("acquire_release_single_key", |b| {
        b.iter(|| {
            let acquired = registry.try_acquire(&keys[0], CapacityLane::Generic);
            if acquired {
                registry.release(&keys[0], CapacityLane::Generic);
            }
            black_box(acquired)
        });
    });
    group.bench_function("acquire_release_16_keys", |b| {
        b.iter(|| {
            for key in &keys {
                if registry.try_acquire(key, CapacityLane::Timeout) {
                    registry.release(key, CapacityLane::Timeout);
                }
            }
        });
    });
    group.finish();
}

fn bench_backoff(c: &mut Criterion) {
    let policy = RetryPolicy::new(
        RetryPolicyConfig::standard(4),
        Arc::new(CapacityRegistry::new(CapacityConfig::standard())),
        CapacityKey::new("https://svc.example.com"),
        Arc::new(ClockSkewCache::new()),
        Arc::new(SeededJitter::new(7)),
    );

    c.bench_function("backoff_for_retry", |b| {
        b.iter(|| {
            for retry_index in 1..=4 {
                black_box(policy.backoff_for_retry(black_box(retry_index)));
            }
        });
    });
}

fn bench_invoke(c: &mut Criterion) {
    let runtime = benchmark_runtime();
    let client = ServiceClient::builder(ClientConfig::new("bench").with_region("us-east-1"))
        .transport(Arc::new(OkTransport))
        .jitter(Arc::new(FixedJitter(0.0)))
        .try_build()
        .expect("benchmark client should build");

    let mut group = c.benchmark_group("invoke_in_memory");
    for concurrency in [1_usize, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &concurrency,
            |b, &concurrency| {
                let client = client.clone();
                b.to_async(&runtime).iter(|| {
                    let client = client.clone();
                    async move {
                        let calls = (0..concurrency).map(|_| client.invoke(Ping));
                        for result in join_all(calls).await {
                            result.expect("in-memory invoke should succeed");
                        }
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(4));
    targets = bench_capacity_acquire_release, bench_backoff, bench_invoke
);
criterion_main!(benches);
