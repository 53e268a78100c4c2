use std::sync::Arc;
use std::time::Instant;

use http::Method;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span};

use crate::SdkResult;
use crate::capacity::{CapacityKey, CapacityRegistry};
use crate::config::ClientConfig;
use crate::context::{ExecutionContext, RequestMessage};
use crate::endpoint::{EndpointResolver, RegionalEndpointResolver};
use crate::error::SdkError;
use crate::metrics::{ExecutionMetrics, ExecutionMetricsSnapshot};
use crate::operation::Operation;
use crate::pipeline::{
    Handler, Pipeline, PipelineBuilder, ResolveEndpointHandler, SignHandler, TransportHandler,
};
use crate::retry::{JitterSource, RandomJitter, RetryHandler, RetryPolicy};
use crate::signer::{AnonymousSigner, RequestSigner};
use crate::skew::{Clock, ClockSkewCache, SystemClock};
use crate::transport::{HttpTransport, HyperTransport};

enum Placement {
    Before,
    After,
}

pub struct ServiceClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    endpoint_resolver: Arc<dyn EndpointResolver>,
    signer: Arc<dyn RequestSigner>,
    capacity_registry: Option<Arc<CapacityRegistry>>,
    clock_skew_cache: Option<Arc<ClockSkewCache>>,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn JitterSource>,
    custom_handlers: Vec<(Placement, String, Arc<dyn Handler>)>,
}

impl ServiceClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            endpoint_resolver: Arc::new(RegionalEndpointResolver),
            signer: Arc::new(AnonymousSigner),
            capacity_registry: None,
            clock_skew_cache: None,
            clock: Arc::new(SystemClock),
            jitter: Arc::new(RandomJitter),
            custom_handlers: Vec::new(),
        }
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn endpoint_resolver(mut self, endpoint_resolver: Arc<dyn EndpointResolver>) -> Self {
        self.endpoint_resolver = endpoint_resolver;
        self
    }

    pub fn signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = signer;
        self
    }

    /// Shares one retry budget between several clients.
    pub fn capacity_registry(mut self, capacity_registry: Arc<CapacityRegistry>) -> Self {
        self.capacity_registry = Some(capacity_registry);
        self
    }

    /// Shares clock corrections between several clients. Takes precedence
    /// over [`Self::clock`].
    pub fn clock_skew_cache(mut self, clock_skew_cache: Arc<ClockSkewCache>) -> Self {
        self.clock_skew_cache = Some(clock_skew_cache);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn handler_before(mut self, anchor: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.custom_handlers
            .push((Placement::Before, anchor.into(), handler));
        self
    }

    pub fn handler_after(mut self, anchor: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.custom_handlers
            .push((Placement::After, anchor.into(), handler));
        self
    }

    pub fn try_build(self) -> SdkResult<ServiceClient> {
        self.config.validate()?;
        let config = Arc::new(self.config);
        let metrics = ExecutionMetrics::new();

        let clock_skew_cache = self
            .clock_skew_cache
            .unwrap_or_else(|| Arc::new(ClockSkewCache::with_clock(self.clock)));
        let capacity_registry = self
            .capacity_registry
            .unwrap_or_else(|| Arc::new(CapacityRegistry::new(config.capacity())));
        let capacity_key = CapacityKey::for_config(&config);
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new(&config)),
        };

        let policy = RetryPolicy::new(
            config.retry_policy_config(),
            capacity_registry.clone(),
            capacity_key.clone(),
            clock_skew_cache.clone(),
            self.jitter,
        );
        let endpoint = Arc::new(ResolveEndpointHandler::new(
            config.clone(),
            self.endpoint_resolver,
        ));
        let retry = RetryHandler::new(policy, metrics.clone()).with_endpoint_refresh(endpoint.clone());
        let sign = SignHandler::new(config.clone(), self.signer, clock_skew_cache.clone());
        let send = TransportHandler::new(
            transport,
            config.user_agent().map(ToOwned::to_owned),
            metrics.clone(),
        );

        let mut builder =
            PipelineBuilder::standard(endpoint, Arc::new(retry), Arc::new(sign), Arc::new(send));
        for (placement, anchor, handler) in self.custom_handlers {
            builder = match placement {
                Placement::Before => builder.insert_before(&anchor, handler)?,
                Placement::After => builder.insert_after(&anchor, handler)?,
            };
        }

        Ok(ServiceClient {
            config,
            pipeline: builder.build(),
            metrics,
            capacity_registry,
            capacity_key,
            clock_skew_cache,
        })
    }

    pub fn build(self) -> ServiceClient {
        self.try_build().unwrap_or_else(|error| {
            panic!("failed to build service client: {error}; use try_build() to handle configuration errors")
        })
    }
}

/// Entry point for generated operations.
#[derive(Clone)]
pub struct ServiceClient {
    config: Arc<ClientConfig>,
    pipeline: Pipeline,
    metrics: ExecutionMetrics,
    capacity_registry: Arc<CapacityRegistry>,
    capacity_key: CapacityKey,
    clock_skew_cache: Arc<ClockSkewCache>,
}

impl ServiceClient {
    pub fn builder(config: ClientConfig) -> ServiceClientBuilder {
        ServiceClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn metrics_snapshot(&self) -> ExecutionMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn capacity_registry(&self) -> &Arc<CapacityRegistry> {
        &self.capacity_registry
    }

    pub fn capacity_key(&self) -> &CapacityKey {
        &self.capacity_key
    }

    /// Tokens left in this client's retry budget.
    pub fn available_capacity(&self) -> usize {
        self.capacity_registry.available(&self.capacity_key)
    }

    pub fn clock_skew_cache(&self) -> &Arc<ClockSkewCache> {
        &self.clock_skew_cache
    }

    pub async fn invoke<O>(&self, operation: O) -> SdkResult<O::Output>
    where
        O: Operation,
    {
        self.invoke_with_cancellation(operation, CancellationToken::new())
            .await
    }

    pub async fn invoke_with_cancellation<O>(
        &self,
        operation: O,
        cancellation: CancellationToken,
    ) -> SdkResult<O::Output>
    where
        O: Operation,
    {
        self.metrics.record_request_started();
        let _in_flight = self.metrics.enter_in_flight();
        let started = Instant::now();

        let mut ctx = ExecutionContext::for_operation(
            RequestMessage::new(Method::POST),
            operation,
            cancellation,
        );
        let span = info_span!(
            "sdk.invoke",
            service = %self.config.service_name(),
            operation = ctx.operation_name(),
            invocation_id = %ctx.invocation_id()
        );
        let result = self
            .pipeline
            .execute(&mut ctx)
            .instrument(span)
            .await
            .and_then(|mut response| {
                let output = response.take_output().ok_or_else(|| {
                    SdkError::internal("pipeline returned a response without an output")
                })?;
                output
                    .downcast::<O::Output>()
                    .map(|output| *output)
                    .map_err(|_| SdkError::internal("operation output has an unexpected type"))
            });

        self.metrics
            .record_request_completed(&result, started.elapsed());
        result
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServiceClient")
            .field("service", &self.config.service_name())
            .field("pipeline", &self.pipeline)
            .field("capacity_key", &self.capacity_key)
            .finish()
    }
}
