use std::error::Error as StdError;

use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    ConnectionReset,
    ConnectionClosed,
    /// The pooled connection or its dispatch channel went away mid-request.
    ChannelClosed,
    /// Peer closed the TLS session without `close_notify`.
    TlsZeroReturn,
    Tls,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::ConnectionReset => "connection_reset",
            Self::ConnectionClosed => "connection_closed",
            Self::ChannelClosed => "channel_closed",
            Self::TlsZeroReturn => "tls_zero_return",
            Self::Tls => "tls",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimeoutPhase {
    Transport,
    ResponseBody,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Transport => "transport",
            Self::ResponseBody => "response_body",
        };
        formatter.write_str(text)
    }
}

/// Where a cancellation came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOrigin {
    Caller,
    Transport,
}

impl std::fmt::Display for CancelOrigin {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Caller => "caller",
            Self::Transport => "transport",
        };
        formatter.write_str(text)
    }
}

/// Which side of the exchange a service blames for an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorType {
    Sender,
    Receiver,
    #[default]
    Unknown,
}

/// Retry hint attached to a service error by its unmarshaller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryableDetails {
    pub throttling: bool,
}

/// Structured error returned by a service.
#[derive(Clone, Debug)]
pub struct ServiceError {
    status: StatusCode,
    code: Option<String>,
    message: Option<String>,
    error_type: ErrorType,
    request_id: Option<String>,
    retryable: Option<RetryableDetails>,
    headers: HeaderMap,
}

impl ServiceError {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            code: None,
            message: None,
            error_type: ErrorType::Unknown,
            request_id: None,
            retryable: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = error_type;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_retryable(mut self, details: RetryableDetails) -> Self {
        self.retryable = Some(details);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn retryable(&self) -> Option<RetryableDetails> {
        self.retryable
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "service error {} ({})",
            self.status.as_u16(),
            self.code.as_deref().unwrap_or("unknown")
        )?;
        if let Some(message) = &self.message {
            write!(formatter, ": {message}")?;
        }
        if let Some(request_id) = &self.request_id {
            write!(formatter, " [request id {request_id}]")?;
        }
        Ok(())
    }
}

impl StdError for ServiceError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    Service,
    Transport,
    Timeout,
    Cancelled,
    Io,
    Marshal,
    Unmarshal,
    EndpointResolution,
    Signing,
    InvalidUri,
    InvalidHeaderValue,
    RequestBuild,
    InvalidConfig,
    Internal,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Io => "io",
            Self::Marshal => "marshal",
            Self::Unmarshal => "unmarshal",
            Self::EndpointResolution => "endpoint_resolution",
            Self::Signing => "signing",
            Self::InvalidUri => "invalid_uri",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::RequestBuild => "request_build",
            Self::InvalidConfig => "invalid_config",
            Self::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SdkError {
    #[error(transparent)]
    Service(Box<ServiceError>),
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("http request timed out in {phase} after {timeout_ms}ms for {method} {uri}")]
    Timeout {
        phase: TimeoutPhase,
        timeout_ms: u128,
        method: Method,
        uri: String,
    },
    #[error("request cancelled by {origin}")]
    Cancelled { origin: CancelOrigin },
    #[error("i/o error: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
    #[error("failed to marshal request: {message}")]
    Marshal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("failed to unmarshal response with status {status}: {source}")]
    Unmarshal {
        status: StatusCode,
        #[source]
        source: BoxError,
    },
    #[error("failed to resolve endpoint: {message}")]
    EndpointResolution { message: String },
    #[error("failed to sign request: {message}")]
    Signing { message: String },
    #[error("invalid request uri: {uri}")]
    InvalidUri { uri: String },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("invalid client configuration: {message}")]
    InvalidConfig { message: String },
    #[error("internal invariant violated: {message}")]
    Internal { message: String },
}

impl SdkError {
    pub fn service(error: ServiceError) -> Self {
        Self::Service(Box::new(error))
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Service(_) => ErrorCode::Service,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::Io { .. } => ErrorCode::Io,
            Self::Marshal { .. } => ErrorCode::Marshal,
            Self::Unmarshal { .. } => ErrorCode::Unmarshal,
            Self::EndpointResolution { .. } => ErrorCode::EndpointResolution,
            Self::Signing { .. } => ErrorCode::Signing,
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }

    pub fn as_service(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(error) => Some(error),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Service(error) => Some(error.status()),
            Self::Unmarshal { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Finds an `io::Error` on this error or anywhere in its source chain.
    pub fn find_io_error(&self) -> Option<&std::io::Error> {
        if let Self::Io { source } = self {
            return Some(source);
        }
        let mut current: Option<&(dyn StdError + 'static)> = self.source();
        while let Some(error) = current {
            if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
                return Some(io_error);
            }
            current = error.source();
        }
        None
    }
}

impl From<std::io::Error> for SdkError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}
