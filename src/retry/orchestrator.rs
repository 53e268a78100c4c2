use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::time::sleep;
use tracing::{Instrument, debug, info_span, warn};

use super::{NoRetryReason, RetryPolicy, RetryVerdict};
use crate::SdkResult;
use crate::context::ExecutionContext;
use crate::error::{CancelOrigin, SdkError};
use crate::metrics::ExecutionMetrics;
use crate::pipeline::{Handler, Next, RETRY_STAGE, ResolveEndpointHandler};
use crate::response::OperationResponse;
use crate::util::insert_header;

pub const INVOCATION_ID_HEADER: &str = "amz-sdk-invocation-id";
pub const SDK_REQUEST_HEADER: &str = "amz-sdk-request";

/// Re-runs the rest of the pipeline until the policy stops it.
pub struct RetryHandler {
    policy: RetryPolicy,
    metrics: ExecutionMetrics,
    endpoint_refresh: Option<Arc<ResolveEndpointHandler>>,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy, metrics: ExecutionMetrics) -> Self {
        Self {
            policy,
            metrics,
            endpoint_refresh: None,
        }
    }

    /// Resolver re-run when a service answers 421.
    pub fn with_endpoint_refresh(mut self, endpoint: Arc<ResolveEndpointHandler>) -> Self {
        self.endpoint_refresh = Some(endpoint);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        next: Next<'_>,
    ) -> SdkResult<OperationResponse> {
        let max_attempts = self.policy.max_retries().saturating_add(1);
        // One extra pass is reserved for endpoint rediscovery.
        let attempt_limit = max_attempts.saturating_add(1);
        let mut passes = 0_usize;

        while passes < attempt_limit {
            passes += 1;
            let invocation_id = ctx.invocation_id().to_string();
            insert_header(&mut ctx.request.headers, INVOCATION_ID_HEADER, &invocation_id)?;
            let attempt_header = format!("attempt={}; max={max_attempts}", ctx.attempt());
            insert_header(&mut ctx.request.headers, SDK_REQUEST_HEADER, &attempt_header)?;
            // Every attempt is checksummed and signed afresh.
            ctx.is_signed = false;

            let span = info_span!(
                "sdk.attempt",
                operation = ctx.operation_name(),
                invocation_id = %invocation_id,
                attempt = ctx.attempt(),
                max_attempts = max_attempts
            );
            self.metrics.record_attempt();
            let result = async {
                debug!("sending attempt");
                next.run(ctx).await
            }
            .instrument(span.clone())
            .await;

            let error = match result {
                Ok(response) => {
                    self.policy.notify_success(ctx);
                    let _enter = span.enter();
                    debug!(
                        status = response.http().status().as_u16(),
                        retries = ctx.retries,
                        "attempt succeeded"
                    );
                    return Ok(response);
                }
                Err(error) => error,
            };

            match self.policy.should_retry(ctx, &error) {
                RetryVerdict::DoNotRetry(reason) => {
                    if reason == NoRetryReason::CapacityExhausted {
                        self.metrics.record_capacity_denial();
                    }
                    let _enter = span.enter();
                    debug!(reason = ?reason, error = %error, "not retrying");
                    return Err(error);
                }
                RetryVerdict::Rediscover => {
                    self.metrics.record_endpoint_discovery_retry();
                    {
                        let _enter = span.enter();
                        warn!(error = %error, "endpoint rejected request, rediscovering");
                    }
                    if ctx.request.body.rewind().is_err() {
                        return Err(error);
                    }
                    if let Some(endpoint) = &self.endpoint_refresh {
                        endpoint.apply(ctx)?;
                    }
                }
                RetryVerdict::Retry { class, delay } => {
                    ctx.retries += 1;
                    self.metrics.record_retry(class);
                    {
                        let _enter = span.enter();
                        warn!(
                            class = ?class,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "retrying request"
                        );
                    }
                    if let Err(rewind_error) = ctx.request.body.rewind() {
                        let _enter = span.enter();
                        warn!(error = %rewind_error, "request body could not be rewound");
                        return Err(error);
                    }
                    if !delay.is_zero() {
                        self.metrics.record_backoff(delay);
                        tokio::select! {
                            biased;
                            _ = ctx.cancellation().cancelled() => {
                                return Err(SdkError::Cancelled {
                                    origin: CancelOrigin::Caller,
                                });
                            }
                            _ = sleep(delay) => {}
                        }
                    }
                }
            }
        }

        Err(SdkError::internal(format!(
            "retry loop exited after {passes} passes without a result"
        )))
    }
}

impl std::fmt::Debug for RetryHandler {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryHandler")
            .field("policy", &self.policy)
            .field("endpoint_refresh", &self.endpoint_refresh.is_some())
            .finish()
    }
}

impl Handler for RetryHandler {
    fn name(&self) -> &'static str {
        RETRY_STAGE
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, SdkResult<OperationResponse>> {
        Box::pin(self.execute(ctx, next))
    }
}
