use std::collections::BTreeMap;
use std::sync::Arc;

use http::{HeaderMap, Method, Uri};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::body::RequestBody;
use crate::endpoint::ResolvedEndpoint;
use crate::operation::{ErasedOperation, Operation};

/// Which part of the retry budget an attempt drew from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CapacityLane {
    Throttling,
    Timeout,
    Generic,
}

impl std::fmt::Display for CapacityLane {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Throttling => "throttling",
            Self::Timeout => "timeout",
            Self::Generic => "generic",
        };
        formatter.write_str(text)
    }
}

/// The wire-level request as it moves through the pipeline.
#[derive(Debug)]
pub struct RequestMessage {
    pub method: Method,
    pub headers: HeaderMap,
    pub endpoint: Option<Uri>,
    pub resource_path: String,
    pub path_resources: BTreeMap<String, String>,
    pub parameters: Vec<(String, String)>,
    pub use_query_string: bool,
    pub body: RequestBody,
}

impl RequestMessage {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            endpoint: None,
            resource_path: "/".to_owned(),
            path_resources: BTreeMap::new(),
            parameters: Vec::new(),
            use_query_string: false,
            body: RequestBody::Empty,
        }
    }

    pub fn may_contain_body(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH) || !self.body.is_empty()
    }

    pub fn is_body_repositionable(&self) -> bool {
        self.body.is_repositionable()
    }

    pub fn add_path_resource(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.path_resources.insert(name.into(), value.into());
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters.push((name.into(), value.into()));
    }
}

/// Per-call state threaded through every pipeline stage and attempt.
pub struct ExecutionContext {
    pub request: RequestMessage,
    pub retries: usize,
    pub endpoint_discovery_retries: usize,
    pub is_signed: bool,
    pub endpoint_stale: bool,
    pub last_capacity_lane: Option<CapacityLane>,
    pub resolved_endpoint: Option<ResolvedEndpoint>,
    invocation_id: Uuid,
    cancellation: CancellationToken,
    operation: Arc<dyn ErasedOperation>,
}

impl ExecutionContext {
    pub fn for_operation<O>(
        request: RequestMessage,
        operation: O,
        cancellation: CancellationToken,
    ) -> Self
    where
        O: Operation,
    {
        Self::new(request, Arc::new(operation), cancellation)
    }

    pub(crate) fn new(
        request: RequestMessage,
        operation: Arc<dyn ErasedOperation>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            request,
            retries: 0,
            endpoint_discovery_retries: 0,
            is_signed: false,
            endpoint_stale: false,
            last_capacity_lane: None,
            resolved_endpoint: None,
            invocation_id: Uuid::new_v4(),
            cancellation,
            operation,
        }
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn operation_name(&self) -> &'static str {
        self.operation.name()
    }

    pub(crate) fn operation(&self) -> Arc<dyn ErasedOperation> {
        Arc::clone(&self.operation)
    }

    /// The first attempt is 1; each retry adds one.
    pub fn attempt(&self) -> usize {
        self.retries.saturating_add(1)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ExecutionContext")
            .field("operation", &self.operation.name())
            .field("invocation_id", &self.invocation_id)
            .field("method", &self.request.method)
            .field("endpoint", &self.request.endpoint)
            .field("retries", &self.retries)
            .field("endpoint_discovery_retries", &self.endpoint_discovery_retries)
            .field("is_signed", &self.is_signed)
            .field("last_capacity_lane", &self.last_capacity_lane)
            .finish()
    }
}
