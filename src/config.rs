use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{SdkError, TransportErrorKind};
use crate::retry::codes;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(20);
const DEFAULT_DNS_SUFFIX: &str = "amazonaws.com";

/// Selects the default retry count when none is set explicitly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetryMode {
    Legacy,
    #[default]
    Standard,
}

impl RetryMode {
    pub const fn default_max_retries(self) -> usize {
        match self {
            Self::Legacy => 4,
            Self::Standard => 2,
        }
    }
}

/// Costs and bounds of the retry capacity token pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityConfig {
    max_capacity: usize,
    retry_cost: usize,
    throttling_cost: usize,
    timeout_cost: usize,
    first_try_refund: usize,
}

impl CapacityConfig {
    pub const fn standard() -> Self {
        Self {
            max_capacity: 500,
            retry_cost: 5,
            throttling_cost: 5,
            timeout_cost: 10,
            first_try_refund: 1,
        }
    }

    pub const fn max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    pub const fn retry_cost(mut self, retry_cost: usize) -> Self {
        self.retry_cost = retry_cost;
        self
    }

    pub const fn throttling_cost(mut self, throttling_cost: usize) -> Self {
        self.throttling_cost = throttling_cost;
        self
    }

    pub const fn timeout_cost(mut self, timeout_cost: usize) -> Self {
        self.timeout_cost = timeout_cost;
        self
    }

    pub const fn first_try_refund(mut self, first_try_refund: usize) -> Self {
        self.first_try_refund = first_try_refund;
        self
    }

    pub const fn configured_max_capacity(self) -> usize {
        self.max_capacity
    }

    pub const fn configured_retry_cost(self) -> usize {
        self.retry_cost
    }

    pub const fn configured_throttling_cost(self) -> usize {
        self.throttling_cost
    }

    pub const fn configured_timeout_cost(self) -> usize {
        self.timeout_cost
    }

    pub const fn configured_first_try_refund(self) -> usize {
        self.first_try_refund
    }
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Immutable per-client inputs of the retry decision engine.
#[derive(Clone, Debug)]
pub struct RetryPolicyConfig {
    pub max_retries: usize,
    pub max_backoff: Duration,
    pub throttling_error_codes: BTreeSet<String>,
    pub clock_skew_error_codes: BTreeSet<String>,
    pub timeout_error_codes: BTreeSet<String>,
    pub retryable_status_codes: BTreeSet<u16>,
    pub retryable_transport_error_kinds: BTreeSet<TransportErrorKind>,
    pub throttle_retries: bool,
}

impl RetryPolicyConfig {
    pub fn standard(max_retries: usize) -> Self {
        Self {
            max_retries,
            max_backoff: DEFAULT_MAX_BACKOFF,
            throttling_error_codes: codes::throttling_error_codes(),
            clock_skew_error_codes: codes::clock_skew_error_codes(),
            timeout_error_codes: codes::timeout_error_codes(),
            retryable_status_codes: codes::retryable_status_codes(),
            retryable_transport_error_kinds: codes::retryable_transport_error_kinds(),
            throttle_retries: true,
        }
    }
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self::standard(RetryMode::Standard.default_max_retries())
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    service_name: String,
    authentication_service_name: Option<String>,
    region: Option<String>,
    service_url: Option<String>,
    use_https: bool,
    use_fips: bool,
    use_dual_stack: bool,
    dns_suffix: String,
    retry_mode: RetryMode,
    max_error_retry: Option<usize>,
    max_backoff: Duration,
    throttle_retries: bool,
    capacity: CapacityConfig,
    request_timeout: Duration,
    connect_timeout: Duration,
    user_agent: Option<String>,
}

impl ClientConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            authentication_service_name: None,
            region: None,
            service_url: None,
            use_https: true,
            use_fips: false,
            use_dual_stack: false,
            dns_suffix: DEFAULT_DNS_SUFFIX.to_owned(),
            retry_mode: RetryMode::Standard,
            max_error_retry: None,
            max_backoff: DEFAULT_MAX_BACKOFF,
            throttle_retries: true,
            capacity: CapacityConfig::standard(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_service_url(mut self, service_url: impl Into<String>) -> Self {
        self.service_url = Some(service_url.into());
        self
    }

    pub fn with_authentication_service_name(mut self, name: impl Into<String>) -> Self {
        self.authentication_service_name = Some(name.into());
        self
    }

    pub fn with_https(mut self, use_https: bool) -> Self {
        self.use_https = use_https;
        self
    }

    pub fn with_fips(mut self, use_fips: bool) -> Self {
        self.use_fips = use_fips;
        self
    }

    pub fn with_dual_stack(mut self, use_dual_stack: bool) -> Self {
        self.use_dual_stack = use_dual_stack;
        self
    }

    pub fn with_dns_suffix(mut self, dns_suffix: impl Into<String>) -> Self {
        self.dns_suffix = dns_suffix.into();
        self
    }

    pub fn with_retry_mode(mut self, retry_mode: RetryMode) -> Self {
        self.retry_mode = retry_mode;
        self
    }

    pub fn with_max_error_retry(mut self, max_error_retry: usize) -> Self {
        self.max_error_retry = Some(max_error_retry);
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff.max(Duration::from_millis(1));
        self
    }

    pub fn with_throttle_retries(mut self, throttle_retries: bool) -> Self {
        self.throttle_retries = throttle_retries;
        self
    }

    pub fn with_capacity(mut self, capacity: CapacityConfig) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Name used in signing scopes; falls back to the service name.
    pub fn authentication_service_name(&self) -> &str {
        self.authentication_service_name
            .as_deref()
            .unwrap_or(&self.service_name)
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn service_url(&self) -> Option<&str> {
        self.service_url.as_deref()
    }

    pub fn scheme(&self) -> &'static str {
        if self.use_https { "https" } else { "http" }
    }

    pub fn use_fips(&self) -> bool {
        self.use_fips
    }

    pub fn use_dual_stack(&self) -> bool {
        self.use_dual_stack
    }

    pub fn dns_suffix(&self) -> &str {
        &self.dns_suffix
    }

    pub fn retry_mode(&self) -> RetryMode {
        self.retry_mode
    }

    /// Explicit `max_error_retry` wins over the retry mode default.
    pub fn max_error_retry(&self) -> usize {
        self.max_error_retry
            .unwrap_or_else(|| self.retry_mode.default_max_retries())
    }

    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    pub fn throttle_retries(&self) -> bool {
        self.throttle_retries
    }

    pub fn capacity(&self) -> CapacityConfig {
        self.capacity
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn retry_policy_config(&self) -> RetryPolicyConfig {
        let mut config = RetryPolicyConfig::standard(self.max_error_retry());
        config.max_backoff = self.max_backoff;
        config.throttle_retries = self.throttle_retries;
        config
    }

    pub fn validate(&self) -> Result<(), SdkError> {
        if self.service_name.trim().is_empty() {
            return Err(SdkError::InvalidConfig {
                message: "service name must not be empty".to_owned(),
            });
        }
        match (&self.service_url, &self.region) {
            (Some(service_url), _) => {
                let parsed = url::Url::parse(service_url).map_err(|_| SdkError::InvalidConfig {
                    message: format!("service url is not a valid url: {service_url}"),
                })?;
                if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
                    return Err(SdkError::InvalidConfig {
                        message: format!("service url must be an http(s) url: {service_url}"),
                    });
                }
            }
            (None, Some(region)) if !region.trim().is_empty() => {}
            (None, _) => {
                return Err(SdkError::InvalidConfig {
                    message: "either a region or a service url is required".to_owned(),
                });
            }
        }
        if self.capacity.configured_max_capacity() == 0 {
            return Err(SdkError::InvalidConfig {
                message: "retry capacity must be >= 1".to_owned(),
            });
        }
        Ok(())
    }
}
