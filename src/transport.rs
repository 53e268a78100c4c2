use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{Method, Request};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{BoxError, CancelOrigin, SdkError, TimeoutPhase, TransportErrorKind};
use crate::response::HttpResponse;
use crate::util::redact_uri_for_logs;

const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 16;

/// Sends one fully buffered request and returns the fully read response.
pub trait HttpTransport: Send + Sync {
    fn send<'a>(&'a self, request: Request<Bytes>) -> BoxFuture<'a, Result<HttpResponse, SdkError>>;
}

type RustlsHttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// hyper-util pooled client behind a rustls connector.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<RustlsHttpsConnector, Full<Bytes>>,
    request_timeout: Duration,
}

impl HyperTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_timeouts(config.connect_timeout(), config.request_timeout())
    }

    pub fn with_timeouts(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);
        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(connector);
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(DEFAULT_POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(DEFAULT_POOL_MAX_IDLE_PER_HOST)
            .build(https);
        Self {
            client,
            request_timeout: request_timeout.max(Duration::from_millis(1)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn execute(&self, request: Request<Bytes>) -> Result<HttpResponse, SdkError> {
        let method = request.method().clone();
        let uri = redact_uri_for_logs(&request.uri().to_string());
        let request = request.map(Full::new);

        let response = match timeout(self.request_timeout, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => return Err(map_client_error(source, &method, &uri)),
            Err(_) => {
                return Err(self.timeout_error(TimeoutPhase::Transport, &method, &uri));
            }
        };

        let (parts, body) = response.into_parts();
        let body = match timeout(self.request_timeout, body.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(source)) => {
                let kind = classify_hyper_error(&source);
                return Err(SdkError::Transport {
                    kind,
                    method,
                    uri,
                    source: Box::new(source) as BoxError,
                });
            }
            Err(_) => {
                return Err(self.timeout_error(TimeoutPhase::ResponseBody, &method, &uri));
            }
        };
        debug!(
            method = %method,
            uri = %uri,
            status = parts.status.as_u16(),
            body_len = body.len(),
            "response received"
        );
        Ok(HttpResponse::new(parts.status, parts.headers, body))
    }

    fn timeout_error(&self, phase: TimeoutPhase, method: &Method, uri: &str) -> SdkError {
        SdkError::Timeout {
            phase,
            timeout_ms: self.request_timeout.as_millis(),
            method: method.clone(),
            uri: uri.to_owned(),
        }
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HyperTransport")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl HttpTransport for HyperTransport {
    fn send<'a>(&'a self, request: Request<Bytes>) -> BoxFuture<'a, Result<HttpResponse, SdkError>> {
        Box::pin(self.execute(request))
    }
}

fn map_client_error(
    source: hyper_util::client::legacy::Error,
    method: &Method,
    uri: &str,
) -> SdkError {
    if find_source::<hyper::Error>(&source).is_some_and(hyper::Error::is_canceled) {
        return SdkError::Cancelled {
            origin: CancelOrigin::Transport,
        };
    }
    let kind = classify_transport_error(&source);
    SdkError::Transport {
        kind,
        method: method.clone(),
        uri: uri.to_owned(),
        source: Box::new(source) as BoxError,
    }
}

pub(crate) fn classify_transport_error(
    error: &hyper_util::client::legacy::Error,
) -> TransportErrorKind {
    classify_error_text(
        error.is_connect(),
        &error_chain_text(error),
        find_source::<io::Error>(error).map(io::Error::kind),
    )
}

fn classify_hyper_error(error: &hyper::Error) -> TransportErrorKind {
    if error.is_incomplete_message() || error.is_closed() {
        return TransportErrorKind::ConnectionClosed;
    }
    classify_error_text(
        false,
        &error_chain_text(error),
        find_source::<io::Error>(error).map(io::Error::kind),
    )
}

fn classify_error_text(
    is_connect: bool,
    text: &str,
    io_kind: Option<io::ErrorKind>,
) -> TransportErrorKind {
    let text = text.to_ascii_lowercase();
    if text.contains("close_notify") {
        return TransportErrorKind::TlsZeroReturn;
    }
    if is_connect {
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }
    if matches!(io_kind, Some(io::ErrorKind::ConnectionReset))
        || text.contains("connection reset")
        || text.contains("broken pipe")
    {
        return TransportErrorKind::ConnectionReset;
    }
    if matches!(
        io_kind,
        Some(io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionAborted)
    ) || text.contains("connection closed")
        || text.contains("incomplete message")
        || text.contains("unexpected eof")
    {
        return TransportErrorKind::ConnectionClosed;
    }
    if text.contains("channel closed") || text.contains("dispatch") {
        return TransportErrorKind::ChannelClosed;
    }
    if text.contains("certificate") || text.contains("handshake") {
        return TransportErrorKind::Tls;
    }
    TransportErrorKind::Other
}

fn error_chain_text(error: &(dyn StdError + 'static)) -> String {
    let mut text = error.to_string();
    let mut current = error.source();
    while let Some(source) = current {
        text.push_str(": ");
        text.push_str(&source.to_string());
        current = source.source();
    }
    text
}

fn find_source<'e, E>(error: &'e (dyn StdError + 'static)) -> Option<&'e E>
where
    E: StdError + 'static,
{
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(candidate) = current {
        if let Some(found) = candidate.downcast_ref::<E>() {
            return Some(found);
        }
        current = candidate.source();
    }
    None
}
