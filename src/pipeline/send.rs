use std::sync::Arc;

use futures_util::future::BoxFuture;
use http::header::USER_AGENT;
use tracing::debug;

use super::{Handler, Next, TRANSPORT_STAGE};
use crate::SdkResult;
use crate::body::RequestBody;
use crate::context::ExecutionContext;
use crate::error::{CancelOrigin, SdkError};
use crate::metrics::ExecutionMetrics;
use crate::response::OperationResponse;
use crate::transport::HttpTransport;
use crate::util::insert_header;

/// Innermost stage: puts the request on the wire.
pub struct TransportHandler {
    transport: Arc<dyn HttpTransport>,
    user_agent: Option<String>,
    metrics: ExecutionMetrics,
}

impl TransportHandler {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        user_agent: Option<String>,
        metrics: ExecutionMetrics,
    ) -> Self {
        Self {
            transport,
            user_agent,
            metrics,
        }
    }

    fn build_request(&self, ctx: &mut ExecutionContext) -> SdkResult<http::Request<bytes::Bytes>> {
        let uri = ctx
            .request
            .endpoint
            .clone()
            .ok_or_else(|| SdkError::internal("request reached transport without an endpoint"))?;
        if let Some(user_agent) = &self.user_agent
            && !ctx.request.headers.contains_key(USER_AGENT)
        {
            insert_header(&mut ctx.request.headers, "user-agent", user_agent)?;
        }
        let body = ctx.request.body.collect_bytes()?;
        if let RequestBody::Stream(stream) = &ctx.request.body
            && let Some(digest) = stream.payload_digest()
        {
            debug!(
                payload_sha256 = %digest,
                payload_len = body.len(),
                "streamed payload hashed"
            );
        }

        let mut request = http::Request::builder()
            .method(ctx.request.method.clone())
            .uri(uri)
            .body(body)
            .map_err(|source| SdkError::RequestBuild { source })?;
        *request.headers_mut() = ctx.request.headers.clone();
        Ok(request)
    }
}

impl std::fmt::Debug for TransportHandler {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TransportHandler")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Handler for TransportHandler {
    fn name(&self) -> &'static str {
        TRANSPORT_STAGE
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        _next: Next<'a>,
    ) -> BoxFuture<'a, SdkResult<OperationResponse>> {
        Box::pin(async move {
            let request = self.build_request(ctx)?;
            let cancellation = ctx.cancellation().clone();
            let response = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    return Err(SdkError::Cancelled {
                        origin: CancelOrigin::Caller,
                    });
                }
                response = self.transport.send(request) => response?,
            };
            self.metrics
                .record_response_status(response.status().as_u16());
            Ok(OperationResponse::new(response))
        })
    }
}
