pub mod codes;
mod orchestrator;

pub use orchestrator::{INVOCATION_ID_HEADER, RetryHandler, SDK_REQUEST_HEADER};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use http::{Method, StatusCode};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use tracing::{debug, warn};

use crate::capacity::{CapacityKey, CapacityRegistry};
use crate::config::RetryPolicyConfig;
use crate::context::{CapacityLane, ExecutionContext};
use crate::error::{CancelOrigin, SdkError, ServiceError};
use crate::skew::ClockSkewCache;
use crate::util::{endpoint_key, lock_unpoisoned};

const CLOCK_SKEW_THRESHOLD: TimeDelta = TimeDelta::minutes(5);
const BASE_BACKOFF_MS: u64 = 1_000;
const MAX_ENDPOINT_DISCOVERY_RETRIES: usize = 1;

/// Source of the `[0, 1)` factor applied to exponential backoff.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Draws from the thread-local generator.
#[derive(Debug, Default)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn sample(&self) -> f64 {
        rand::rng().random_range(0.0..1.0)
    }
}

/// A seeded generator shared by every call of a client.
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl JitterSource for SeededJitter {
    fn sample(&self) -> f64 {
        lock_unpoisoned(&self.rng).random_range(0.0..1.0)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryClass {
    ClockSkew,
    Throttling,
    Transient,
    Timeout,
    ServiceTimeout,
}

impl RetryClass {
    /// Clock-skew retries are free; every other class draws from a lane.
    pub const fn lane(self) -> Option<CapacityLane> {
        match self {
            Self::ClockSkew => None,
            Self::Throttling => Some(CapacityLane::Throttling),
            Self::Transient => Some(CapacityLane::Generic),
            Self::Timeout | Self::ServiceTimeout => Some(CapacityLane::Timeout),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoRetryReason {
    BodyNotRepositionable,
    RetryLimitReached,
    EndpointDiscoveryExhausted,
    NotRetryable,
    CapacityExhausted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryVerdict {
    DoNotRetry(NoRetryReason),
    Retry { class: RetryClass, delay: Duration },
    /// Re-run the attempt against a freshly resolved endpoint.
    Rediscover,
}

pub struct RetryPolicy {
    config: RetryPolicyConfig,
    capacity: Arc<CapacityRegistry>,
    capacity_key: CapacityKey,
    skew: Arc<ClockSkewCache>,
    jitter: Arc<dyn JitterSource>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("capacity_key", &self.capacity_key)
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(
        config: RetryPolicyConfig,
        capacity: Arc<CapacityRegistry>,
        capacity_key: CapacityKey,
        skew: Arc<ClockSkewCache>,
        jitter: Arc<dyn JitterSource>,
    ) -> Self {
        Self {
            config,
            capacity,
            capacity_key,
            skew,
            jitter,
        }
    }

    pub fn config(&self) -> &RetryPolicyConfig {
        &self.config
    }

    pub fn capacity_key(&self) -> &CapacityKey {
        &self.capacity_key
    }

    pub fn max_retries(&self) -> usize {
        self.config.max_retries
    }

    pub fn should_retry(&self, ctx: &mut ExecutionContext, error: &SdkError) -> RetryVerdict {
        if !self.can_retry(ctx) {
            return RetryVerdict::DoNotRetry(NoRetryReason::BodyNotRepositionable);
        }

        if self.is_invalid_endpoint(error) {
            if ctx.endpoint_discovery_retries < MAX_ENDPOINT_DISCOVERY_RETRIES {
                ctx.endpoint_discovery_retries += 1;
                ctx.endpoint_stale = true;
                return RetryVerdict::Rediscover;
            }
            return RetryVerdict::DoNotRetry(NoRetryReason::EndpointDiscoveryExhausted);
        }

        if self.retry_limit_reached(ctx) {
            return RetryVerdict::DoNotRetry(NoRetryReason::RetryLimitReached);
        }

        if self.is_clock_skew(ctx, error) {
            return RetryVerdict::Retry {
                class: RetryClass::ClockSkew,
                delay: self.backoff_for_retry(ctx.retries + 1),
            };
        }

        let Some(class) = self.classify(ctx, error) else {
            return RetryVerdict::DoNotRetry(NoRetryReason::NotRetryable);
        };

        if self.config.throttle_retries
            && let Some(lane) = class.lane()
        {
            if !self.capacity.try_acquire(&self.capacity_key, lane) {
                warn!(
                    capacity_key = %self.capacity_key,
                    lane = %lane,
                    available = self.capacity.available(&self.capacity_key),
                    "retry capacity exhausted"
                );
                return RetryVerdict::DoNotRetry(NoRetryReason::CapacityExhausted);
            }
            ctx.last_capacity_lane = Some(lane);
        }

        RetryVerdict::Retry {
            class,
            delay: self.backoff_for_retry(ctx.retries + 1),
        }
    }

    pub fn retry_limit_reached(&self, ctx: &ExecutionContext) -> bool {
        ctx.retries >= self.config.max_retries
    }

    /// A request is only resent when its payload can be replayed from the start.
    pub fn can_retry(&self, ctx: &ExecutionContext) -> bool {
        !ctx.request.may_contain_body() || ctx.request.is_body_repositionable()
    }

    pub fn classify(&self, ctx: &ExecutionContext, error: &SdkError) -> Option<RetryClass> {
        if self.is_throttling(error) {
            return Some(RetryClass::Throttling);
        }
        if matches!(error, SdkError::Timeout { .. }) {
            return Some(RetryClass::Timeout);
        }
        if self.is_service_timeout(error) {
            return Some(RetryClass::ServiceTimeout);
        }
        if self.is_transient(error) {
            return Some(RetryClass::Transient);
        }
        debug!(
            operation = ctx.operation_name(),
            error_code = error.code().as_str(),
            "error is not retryable"
        );
        None
    }

    pub fn is_throttling(&self, error: &SdkError) -> bool {
        let Some(service) = error.as_service() else {
            return false;
        };
        if service.retryable().is_some_and(|details| details.throttling) {
            return true;
        }
        match service.code() {
            Some(code) => self.config.throttling_error_codes.contains(code),
            None => service.status() == StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn is_transient(&self, error: &SdkError) -> bool {
        match error {
            SdkError::Transport { kind, .. } => {
                self.config.retryable_transport_error_kinds.contains(kind)
            }
            SdkError::Cancelled { origin } => *origin == CancelOrigin::Transport,
            SdkError::Service(service) => {
                self.config
                    .retryable_status_codes
                    .contains(&service.status().as_u16())
                    || error.find_io_error().is_some()
            }
            // A 200 whose body could not be read in full.
            SdkError::Unmarshal { status, .. } => {
                *status == StatusCode::OK || error.find_io_error().is_some()
            }
            _ => error.find_io_error().is_some(),
        }
    }

    pub fn is_service_timeout(&self, error: &SdkError) -> bool {
        error
            .as_service()
            .and_then(ServiceError::code)
            .is_some_and(|code| self.config.timeout_error_codes.contains(code))
    }

    pub fn is_invalid_endpoint(&self, error: &SdkError) -> bool {
        error
            .as_service()
            .is_some_and(|service| service.status() == StatusCode::MISDIRECTED_REQUEST)
    }

    /// Detects a skewed local clock and stores a fresh correction for the
    /// endpoint. Returns true only when a correction was written.
    pub fn is_clock_skew(&self, ctx: &mut ExecutionContext, error: &SdkError) -> bool {
        let Some(service) = error.as_service() else {
            return false;
        };
        let triggered = ctx.request.method == Method::HEAD
            || service
                .code()
                .is_none_or(|code| self.config.clock_skew_error_codes.contains(code));
        if !triggered {
            return false;
        }
        let Some(endpoint) = ctx.request.endpoint.as_ref().map(endpoint_key) else {
            return false;
        };
        let Some(server_time) = server_time(service) else {
            return false;
        };

        let drift = server_time - self.skew.corrected_now(&endpoint);
        if drift.abs() <= CLOCK_SKEW_THRESHOLD {
            return false;
        }

        let correction = server_time - self.skew.real_now();
        self.skew.set_correction(&endpoint, correction);
        ctx.is_signed = false;
        warn!(
            endpoint = %endpoint,
            correction_secs = correction.num_seconds(),
            "clock skew detected, correcting local time"
        );
        true
    }

    /// `min(jitter * 2^(retry_index - 1) * 1s, max_backoff)`.
    pub fn backoff_for_retry(&self, retry_index: usize) -> Duration {
        let exponent = retry_index.saturating_sub(1).min(31) as u32;
        let ceiling_ms = BASE_BACKOFF_MS.saturating_mul(1_u64 << exponent);
        let jitter = self.jitter.sample().clamp(0.0, 1.0);
        let delay_ms = (ceiling_ms as f64 * jitter).round() as u64;
        Duration::from_millis(delay_ms).min(self.config.max_backoff)
    }

    /// Returns tokens once a call succeeds.
    pub fn notify_success(&self, ctx: &ExecutionContext) {
        if !self.config.throttle_retries {
            return;
        }
        match ctx.last_capacity_lane {
            Some(lane) if ctx.retries > 0 => self.capacity.release(&self.capacity_key, lane),
            _ => self.capacity.release_first_try(&self.capacity_key),
        }
    }
}

fn server_time(error: &ServiceError) -> Option<DateTime<Utc>> {
    if let Some(date) = error
        .headers()
        .get(http::header::DATE)
        .and_then(|value| value.to_str().ok())
        && let Ok(time) = httpdate::parse_http_date(date)
    {
        return Some(DateTime::<Utc>::from(time));
    }
    error.message().and_then(parse_embedded_server_time)
}

/// Reads the server time out of messages such as
/// `Signature expired: ... (20230101T000000Z - 15 min.)`.
fn parse_embedded_server_time(message: &str) -> Option<DateTime<Utc>> {
    let start = message.find('(')? + 1;
    let rest = &message[start..];
    let end = [rest.find(" + "), rest.find(" - ")]
        .into_iter()
        .flatten()
        .min()?;
    let text = rest[..end].trim();

    if let Ok(time) = NaiveDateTime::parse_from_str(text, "%Y%m%dT%H%M%SZ") {
        return Some(time.and_utc());
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeDelta, TimeZone, Utc};
    use http::{HeaderMap, HeaderValue, Method, StatusCode};
    use tokio_util::sync::CancellationToken;

    use super::{
        FixedJitter, JitterSource, NoRetryReason, RetryClass, RetryPolicy, RetryVerdict,
        SeededJitter, parse_embedded_server_time,
    };
    use crate::body::{ForwardOnlyStream, StreamBody};
    use crate::capacity::{CapacityKey, CapacityRegistry};
    use crate::config::{CapacityConfig, RetryPolicyConfig};
    use crate::context::{CapacityLane, ExecutionContext, RequestMessage};
    use crate::error::{
        CancelOrigin, RetryableDetails, SdkError, ServiceError, TimeoutPhase, TransportErrorKind,
    };
    use crate::operation::Operation;
    use crate::response::HttpResponse;
    use crate::skew::{ClockSkewCache, FixedClock};

    const ENDPOINT: &str = "https://kv.us-east-1.amazonaws.com";

    struct Ping;

    impl Operation for Ping {
        type Output = ();

        fn name(&self) -> &'static str {
            "Ping"
        }

        fn marshal(&self, _request: &mut RequestMessage) -> Result<(), SdkError> {
            Ok(())
        }

        fn unmarshal(&self, _response: &HttpResponse) -> Result<Self::Output, SdkError> {
            Ok(())
        }
    }

    struct Fixture {
        policy: RetryPolicy,
        capacity: Arc<CapacityRegistry>,
        skew: Arc<ClockSkewCache>,
        clock: Arc<FixedClock>,
    }

    fn fixture(config: RetryPolicyConfig, capacity: CapacityConfig) -> Fixture {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().expect("valid time"),
        ));
        let skew = Arc::new(ClockSkewCache::with_clock(clock.clone()));
        let capacity = Arc::new(CapacityRegistry::new(capacity));
        let policy = RetryPolicy::new(
            config,
            capacity.clone(),
            CapacityKey::new(ENDPOINT),
            skew.clone(),
            Arc::new(FixedJitter(1.0)),
        );
        Fixture {
            policy,
            capacity,
            skew,
            clock,
        }
    }

    fn context(method: Method) -> ExecutionContext {
        let mut request = RequestMessage::new(method);
        request.endpoint = Some(format!("{ENDPOINT}/").parse().expect("endpoint uri"));
        ExecutionContext::for_operation(request, Ping, CancellationToken::new())
    }

    fn service(status: StatusCode, code: Option<&str>) -> SdkError {
        let mut error = ServiceError::new(status);
        if let Some(code) = code {
            error = error.with_code(code);
        }
        SdkError::service(error)
    }

    #[test]
    fn throttling_codes_and_bare_429_draw_from_throttling_lane() {
        let fx = fixture(RetryPolicyConfig::standard(3), CapacityConfig::standard());
        let mut ctx = context(Method::POST);

        let verdict = fx.policy.should_retry(
            &mut ctx,
            &service(StatusCode::BAD_REQUEST, Some("ThrottlingException")),
        );
        assert_eq!(
            verdict,
            RetryVerdict::Retry {
                class: RetryClass::Throttling,
                delay: Duration::from_secs(1),
            }
        );
        assert_eq!(ctx.last_capacity_lane, Some(CapacityLane::Throttling));
        assert_eq!(fx.capacity.available(fx.policy.capacity_key()), 495);

        assert!(
            fx.policy
                .is_throttling(&service(StatusCode::TOO_MANY_REQUESTS, None))
        );
        assert!(
            !fx.policy
                .is_throttling(&service(StatusCode::TOO_MANY_REQUESTS, Some("Custom")))
        );
        let hinted = SdkError::service(
            ServiceError::new(StatusCode::BAD_REQUEST)
                .with_code("Custom")
                .with_retryable(RetryableDetails { throttling: true }),
        );
        assert!(fx.policy.is_throttling(&hinted));
    }

    #[test]
    fn validation_errors_are_not_retried() {
        let fx = fixture(RetryPolicyConfig::standard(3), CapacityConfig::standard());
        let mut ctx = context(Method::POST);
        let verdict = fx.policy.should_retry(
            &mut ctx,
            &service(StatusCode::BAD_REQUEST, Some("ValidationException")),
        );
        assert_eq!(verdict, RetryVerdict::DoNotRetry(NoRetryReason::NotRetryable));
        assert_eq!(fx.capacity.available(fx.policy.capacity_key()), 500);
    }

    #[test]
    fn transient_classification_covers_status_transport_and_cancellation() {
        let fx = fixture(RetryPolicyConfig::standard(3), CapacityConfig::standard());
        let ctx = context(Method::GET);

        for status in [500_u16, 502, 503, 504] {
            let status = StatusCode::from_u16(status).expect("status");
            assert_eq!(
                fx.policy.classify(&ctx, &service(status, Some("InternalFailure"))),
                Some(RetryClass::Transient)
            );
        }

        let reset = SdkError::Transport {
            kind: TransportErrorKind::ConnectionReset,
            method: Method::GET,
            uri: ENDPOINT.to_owned(),
            source: "reset by peer".into(),
        };
        assert!(fx.policy.is_transient(&reset));

        let tls = SdkError::Transport {
            kind: TransportErrorKind::Tls,
            method: Method::GET,
            uri: ENDPOINT.to_owned(),
            source: Box::new(std::io::Error::other("bad certificate")),
        };
        assert!(!fx.policy.is_transient(&tls));

        assert!(fx.policy.is_transient(&SdkError::Cancelled {
            origin: CancelOrigin::Transport
        }));
        assert!(!fx.policy.is_transient(&SdkError::Cancelled {
            origin: CancelOrigin::Caller
        }));

        let truncated = SdkError::Unmarshal {
            status: StatusCode::OK,
            source: "unexpected end of body".into(),
        };
        assert!(fx.policy.is_transient(&truncated));

        let io = SdkError::from(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "eof",
        ));
        assert!(fx.policy.is_transient(&io));
    }

    #[test]
    fn timeouts_draw_from_timeout_lane() {
        let fx = fixture(RetryPolicyConfig::standard(3), CapacityConfig::standard());
        let mut ctx = context(Method::GET);

        let timeout = SdkError::Timeout {
            phase: TimeoutPhase::Transport,
            timeout_ms: 10,
            method: Method::GET,
            uri: ENDPOINT.to_owned(),
        };
        assert!(matches!(
            fx.policy.should_retry(&mut ctx, &timeout),
            RetryVerdict::Retry {
                class: RetryClass::Timeout,
                ..
            }
        ));
        assert_eq!(fx.capacity.available(fx.policy.capacity_key()), 490);

        assert_eq!(
            fx.policy.classify(
                &ctx,
                &service(StatusCode::BAD_REQUEST, Some("RequestTimeoutException"))
            ),
            Some(RetryClass::ServiceTimeout)
        );
    }

    #[test]
    fn retry_limit_stops_retries() {
        let fx = fixture(RetryPolicyConfig::standard(2), CapacityConfig::standard());
        let mut ctx = context(Method::GET);
        ctx.retries = 2;
        assert_eq!(
            fx.policy
                .should_retry(&mut ctx, &service(StatusCode::SERVICE_UNAVAILABLE, None)),
            RetryVerdict::DoNotRetry(NoRetryReason::RetryLimitReached)
        );
    }

    #[test]
    fn exhausted_capacity_refuses_retry_unless_throttling_disabled() {
        let fx = fixture(
            RetryPolicyConfig::standard(3),
            CapacityConfig::standard().max_capacity(4),
        );
        let mut ctx = context(Method::GET);
        let error = service(StatusCode::SERVICE_UNAVAILABLE, Some("ServiceUnavailable"));
        assert_eq!(
            fx.policy.should_retry(&mut ctx, &error),
            RetryVerdict::DoNotRetry(NoRetryReason::CapacityExhausted)
        );
        assert_eq!(ctx.last_capacity_lane, None);

        let mut config = RetryPolicyConfig::standard(3);
        config.throttle_retries = false;
        let fx = fixture(config, CapacityConfig::standard().max_capacity(4));
        assert!(matches!(
            fx.policy.should_retry(&mut ctx, &error),
            RetryVerdict::Retry { .. }
        ));
        assert_eq!(fx.capacity.available(fx.policy.capacity_key()), 4);
    }

    #[test]
    fn non_repositionable_body_is_never_retried() {
        let fx = fixture(RetryPolicyConfig::standard(3), CapacityConfig::standard());
        let mut ctx = context(Method::PUT);
        ctx.request.body = StreamBody::new(ForwardOnlyStream::new(&b"payload"[..]))
            .expect("stream body")
            .into();

        for error in [
            service(StatusCode::SERVICE_UNAVAILABLE, None),
            service(StatusCode::MISDIRECTED_REQUEST, None),
            service(StatusCode::BAD_REQUEST, Some("ThrottlingException")),
        ] {
            assert_eq!(
                fx.policy.should_retry(&mut ctx, &error),
                RetryVerdict::DoNotRetry(NoRetryReason::BodyNotRepositionable)
            );
        }
    }

    #[test]
    fn misdirected_request_is_rediscovered_once() {
        let fx = fixture(RetryPolicyConfig::standard(0), CapacityConfig::standard());
        let mut ctx = context(Method::GET);
        let error = service(StatusCode::MISDIRECTED_REQUEST, None);

        assert_eq!(fx.policy.should_retry(&mut ctx, &error), RetryVerdict::Rediscover);
        assert!(ctx.endpoint_stale);
        assert_eq!(ctx.retries, 0);
        assert_eq!(
            fx.policy.should_retry(&mut ctx, &error),
            RetryVerdict::DoNotRetry(NoRetryReason::EndpointDiscoveryExhausted)
        );
    }

    #[test]
    fn date_header_skew_beyond_threshold_is_corrected_without_capacity() {
        let fx = fixture(
            RetryPolicyConfig::standard(3),
            CapacityConfig::standard().max_capacity(1),
        );
        let mut ctx = context(Method::POST);
        ctx.is_signed = true;

        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::DATE,
            HeaderValue::from_static("Mon, 01 Jan 2024 12:10:00 GMT"),
        );
        let error = SdkError::service(
            ServiceError::new(StatusCode::FORBIDDEN)
                .with_code("RequestTimeTooSkewed")
                .with_headers(headers),
        );

        assert!(matches!(
            fx.policy.should_retry(&mut ctx, &error),
            RetryVerdict::Retry {
                class: RetryClass::ClockSkew,
                ..
            }
        ));
        assert!(!ctx.is_signed);
        assert_eq!(fx.skew.correction_for(ENDPOINT), TimeDelta::minutes(10));
        assert_eq!(fx.capacity.available(fx.policy.capacity_key()), 1);

        // The corrected clock now agrees with the server.
        assert!(!fx.policy.is_clock_skew(&mut ctx, &error));
    }

    #[test]
    fn small_drift_leaves_correction_untouched() {
        let fx = fixture(RetryPolicyConfig::standard(3), CapacityConfig::standard());
        let mut ctx = context(Method::POST);
        fx.clock.advance(TimeDelta::minutes(-4));

        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::DATE,
            HeaderValue::from_static("Mon, 01 Jan 2024 12:00:00 GMT"),
        );
        let error = SdkError::service(
            ServiceError::new(StatusCode::FORBIDDEN)
                .with_code("SignatureDoesNotMatch")
                .with_headers(headers),
        );
        assert!(!fx.policy.is_clock_skew(&mut ctx, &error));
        assert!(fx.skew.is_empty());
    }

    fn not_found_with_date(date: &'static str, code: Option<&str>) -> SdkError {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::DATE, HeaderValue::from_static(date));
        let mut error = ServiceError::new(StatusCode::NOT_FOUND).with_headers(headers);
        if let Some(code) = code {
            error = error.with_code(code);
        }
        SdkError::service(error)
    }

    #[test]
    fn head_request_drift_beyond_threshold_is_corrected() {
        let fx = fixture(RetryPolicyConfig::standard(3), CapacityConfig::standard());
        let mut ctx = context(Method::HEAD);
        ctx.is_signed = true;

        let error = not_found_with_date("Mon, 01 Jan 2024 12:10:00 GMT", None);
        assert!(fx.policy.is_clock_skew(&mut ctx, &error));
        assert_eq!(fx.skew.correction_for(ENDPOINT), TimeDelta::minutes(10));
        assert!(!ctx.is_signed);
    }

    #[test]
    fn head_request_small_drift_is_ignored() {
        let fx = fixture(RetryPolicyConfig::standard(3), CapacityConfig::standard());
        let mut ctx = context(Method::HEAD);
        ctx.is_signed = true;

        let error = not_found_with_date("Mon, 01 Jan 2024 12:03:00 GMT", None);
        assert!(!fx.policy.is_clock_skew(&mut ctx, &error));
        assert!(fx.skew.is_empty());
        assert!(ctx.is_signed);
    }

    #[test]
    fn head_checks_skew_even_for_codes_outside_the_skew_set() {
        let fx = fixture(RetryPolicyConfig::standard(3), CapacityConfig::standard());
        let error = not_found_with_date("Mon, 01 Jan 2024 12:10:00 GMT", Some("NotFound"));

        let mut post = context(Method::POST);
        assert!(!fx.policy.is_clock_skew(&mut post, &error));
        assert!(fx.skew.is_empty());

        let mut head = context(Method::HEAD);
        assert!(fx.policy.is_clock_skew(&mut head, &error));
        assert_eq!(fx.skew.correction_for(ENDPOINT), TimeDelta::minutes(10));
    }

    #[test]
    fn requests_without_a_payload_are_always_retryable() {
        let fx = fixture(RetryPolicyConfig::standard(3), CapacityConfig::standard());
        assert!(fx.policy.can_retry(&context(Method::GET)));
        assert!(fx.policy.can_retry(&context(Method::POST)));

        let mut get = context(Method::GET);
        get.request.body = StreamBody::new(ForwardOnlyStream::new(&b"payload"[..]))
            .expect("stream body")
            .into();
        assert!(get.request.may_contain_body());
        assert!(!fx.policy.can_retry(&get));
    }

    #[test]
    fn skew_is_read_from_error_message_when_date_header_is_missing() {
        let fx = fixture(RetryPolicyConfig::standard(3), CapacityConfig::standard());
        let mut ctx = context(Method::POST);
        let error = SdkError::service(
            ServiceError::new(StatusCode::BAD_REQUEST)
                .with_code("RequestExpired")
                .with_message(
                    "Signature expired: 20240101T120000Z is now earlier than \
                     20240101T112500Z (20240101T114000Z - 15 min.)",
                ),
        );
        assert!(fx.policy.is_clock_skew(&mut ctx, &error));
        assert_eq!(fx.skew.correction_for(ENDPOINT), TimeDelta::minutes(-20));
    }

    #[test]
    fn embedded_server_time_accepts_basic_and_rfc3339_forms() {
        assert_eq!(
            parse_embedded_server_time("expired (20240101T000000Z + 15 min.)"),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single()
        );
        assert_eq!(
            parse_embedded_server_time("expired (2024-01-01T00:00:00Z - 5 min.)"),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single()
        );
        assert_eq!(parse_embedded_server_time("no timestamp here"), None);
        assert_eq!(parse_embedded_server_time("(garbage - 5 min.)"), None);
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let mut config = RetryPolicyConfig::standard(10);
        config.max_backoff = Duration::from_secs(20);
        let fx = fixture(config, CapacityConfig::standard());

        assert_eq!(fx.policy.backoff_for_retry(1), Duration::from_secs(1));
        assert_eq!(fx.policy.backoff_for_retry(2), Duration::from_secs(2));
        assert_eq!(fx.policy.backoff_for_retry(4), Duration::from_secs(8));
        assert_eq!(fx.policy.backoff_for_retry(6), Duration::from_secs(20));
        assert_eq!(fx.policy.backoff_for_retry(64), Duration::from_secs(20));
    }

    #[test]
    fn seeded_jitter_stays_in_unit_interval() {
        let jitter = SeededJitter::new(7);
        for _ in 0..256 {
            let sample = jitter.sample();
            assert!((0.0..1.0).contains(&sample));
        }
    }

    #[test]
    fn success_refunds_first_try_or_releases_last_lane() {
        let fx = fixture(RetryPolicyConfig::standard(3), CapacityConfig::standard());
        let key = fx.policy.capacity_key().clone();
        let mut ctx = context(Method::GET);

        assert!(fx.capacity.try_acquire(&key, CapacityLane::Timeout));
        fx.policy.notify_success(&ctx);
        assert_eq!(fx.capacity.available(&key), 491);

        ctx.retries = 1;
        ctx.last_capacity_lane = Some(CapacityLane::Timeout);
        fx.policy.notify_success(&ctx);
        assert_eq!(fx.capacity.available(&key), 500);
    }
}
