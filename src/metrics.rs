use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::SdkError;
use crate::retry::RetryClass;
use crate::util::lock_unpoisoned;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionMetricsSnapshot {
    pub requests_started: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub in_flight: u64,
    pub attempts: u64,
    pub retries: u64,
    pub throttling_retries: u64,
    pub clock_skew_corrections: u64,
    pub endpoint_discovery_retries: u64,
    pub capacity_denials: u64,
    pub backoff_waits: u64,
    pub backoff_total_ms: u64,
    pub latency_samples: u64,
    pub latency_total_ms: u64,
    pub latency_avg_ms: f64,
    pub status_counts: BTreeMap<u16, u64>,
    pub error_counts: BTreeMap<String, u64>,
}

/// Shared counters for every call made through one client.
#[derive(Clone, Debug, Default)]
pub struct ExecutionMetrics {
    inner: Arc<ExecutionMetricsInner>,
}

#[derive(Debug, Default)]
struct ExecutionMetricsInner {
    requests_started: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    in_flight: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    throttling_retries: AtomicU64,
    clock_skew_corrections: AtomicU64,
    endpoint_discovery_retries: AtomicU64,
    capacity_denials: AtomicU64,
    backoff_waits: AtomicU64,
    backoff_total_ms: AtomicU64,
    latency_samples: AtomicU64,
    latency_total_ms: AtomicU64,
    status_counts: Mutex<BTreeMap<u16, u64>>,
    error_counts: Mutex<BTreeMap<String, u64>>,
}

pub(crate) struct InFlightGuard {
    metrics: ExecutionMetrics,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_request_started(&self) {
        self.inner.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enter_in_flight(&self) -> InFlightGuard {
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            metrics: self.clone(),
        }
    }

    pub(crate) fn record_attempt(&self) {
        self.inner.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self, class: RetryClass) {
        self.inner.retries.fetch_add(1, Ordering::Relaxed);
        match class {
            RetryClass::Throttling => {
                self.inner
                    .throttling_retries
                    .fetch_add(1, Ordering::Relaxed);
            }
            RetryClass::ClockSkew => {
                self.inner
                    .clock_skew_corrections
                    .fetch_add(1, Ordering::Relaxed);
            }
            RetryClass::Transient | RetryClass::Timeout | RetryClass::ServiceTimeout => {}
        }
    }

    pub(crate) fn record_endpoint_discovery_retry(&self) {
        self.inner
            .endpoint_discovery_retries
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_capacity_denial(&self) {
        self.inner.capacity_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_backoff(&self, delay: Duration) {
        self.inner.backoff_waits.fetch_add(1, Ordering::Relaxed);
        self.inner
            .backoff_total_ms
            .fetch_add(duration_ms(delay), Ordering::Relaxed);
    }

    pub(crate) fn record_request_completed<T>(
        &self,
        result: &Result<T, SdkError>,
        latency: Duration,
    ) {
        self.record_latency(latency);
        match result {
            Ok(_) => {
                self.inner
                    .requests_succeeded
                    .fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                self.inner.requests_failed.fetch_add(1, Ordering::Relaxed);
                self.add_error_count(error_key(error));
            }
        }
    }

    pub(crate) fn record_response_status(&self, status: u16) {
        self.add_status_count(status);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let latency_samples = self.inner.latency_samples.load(Ordering::Relaxed);
        let latency_total_ms = self.inner.latency_total_ms.load(Ordering::Relaxed);
        let latency_avg_ms = if latency_samples == 0 {
            0.0
        } else {
            latency_total_ms as f64 / latency_samples as f64
        };

        ExecutionMetricsSnapshot {
            requests_started: self.inner.requests_started.load(Ordering::Relaxed),
            requests_succeeded: self.inner.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.inner.requests_failed.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            attempts: self.inner.attempts.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
            throttling_retries: self.inner.throttling_retries.load(Ordering::Relaxed),
            clock_skew_corrections: self.inner.clock_skew_corrections.load(Ordering::Relaxed),
            endpoint_discovery_retries: self
                .inner
                .endpoint_discovery_retries
                .load(Ordering::Relaxed),
            capacity_denials: self.inner.capacity_denials.load(Ordering::Relaxed),
            backoff_waits: self.inner.backoff_waits.load(Ordering::Relaxed),
            backoff_total_ms: self.inner.backoff_total_ms.load(Ordering::Relaxed),
            latency_samples,
            latency_total_ms,
            latency_avg_ms,
            status_counts: lock_unpoisoned(&self.inner.status_counts).clone(),
            error_counts: lock_unpoisoned(&self.inner.error_counts).clone(),
        }
    }

    fn record_latency(&self, latency: Duration) {
        self.inner.latency_samples.fetch_add(1, Ordering::Relaxed);
        self.inner
            .latency_total_ms
            .fetch_add(duration_ms(latency), Ordering::Relaxed);
    }

    fn add_status_count(&self, status: u16) {
        let mut status_counts = lock_unpoisoned(&self.inner.status_counts);
        *status_counts.entry(status).or_insert(0) += 1;
    }

    fn add_error_count(&self, error_key: String) {
        let mut error_counts = lock_unpoisoned(&self.inner.error_counts);
        *error_counts.entry(error_key).or_insert(0) += 1;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.inner.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

fn error_key(error: &SdkError) -> String {
    match error {
        SdkError::Service(service) => match service.code() {
            Some(code) => format!("service:{code}"),
            None => format!("service:{}", service.status().as_u16()),
        },
        SdkError::Transport { kind, .. } => format!("transport:{kind}"),
        SdkError::Timeout { phase, .. } => format!("timeout:{phase}"),
        SdkError::Cancelled { origin } => format!("cancelled:{origin}"),
        other => other.code().as_str().to_owned(),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
