use std::collections::BTreeSet;

use crate::error::TransportErrorKind;

const THROTTLING_ERROR_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottledException",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "TransactionInProgressException",
    "RequestLimitExceeded",
    "BandwidthLimitExceeded",
    "LimitExceededException",
    "RequestThrottled",
    "SlowDown",
    "PriorRequestNotComplete",
    "EC2ThrottledException",
];

const CLOCK_SKEW_ERROR_CODES: &[&str] = &[
    "RequestTimeTooSkewed",
    "RequestExpired",
    "InvalidSignatureException",
    "SignatureDoesNotMatch",
    "AuthFailure",
    "RequestInTheFuture",
];

const TIMEOUT_ERROR_CODES: &[&str] = &["RequestTimeout", "RequestTimeoutException"];

pub fn throttling_error_codes() -> BTreeSet<String> {
    to_set(THROTTLING_ERROR_CODES)
}

pub fn clock_skew_error_codes() -> BTreeSet<String> {
    to_set(CLOCK_SKEW_ERROR_CODES)
}

pub fn timeout_error_codes() -> BTreeSet<String> {
    to_set(TIMEOUT_ERROR_CODES)
}

pub fn retryable_status_codes() -> BTreeSet<u16> {
    [500_u16, 502, 503, 504].into_iter().collect()
}

/// Certificate and handshake failures (`Tls`) are left out.
pub fn retryable_transport_error_kinds() -> BTreeSet<TransportErrorKind> {
    [
        TransportErrorKind::Dns,
        TransportErrorKind::Connect,
        TransportErrorKind::ConnectionReset,
        TransportErrorKind::ConnectionClosed,
        TransportErrorKind::ChannelClosed,
        TransportErrorKind::TlsZeroReturn,
        TransportErrorKind::Other,
    ]
    .into_iter()
    .collect()
}

fn to_set(codes: &[&str]) -> BTreeSet<String> {
    codes.iter().map(|code| (*code).to_owned()).collect()
}
