//! `cloudsdk_runtime` is the request-execution core shared by generated cloud service SDKs.
//!
//! A call travels through an ordered [`pipeline`](crate::pipeline) of handlers:
//! marshal, resolve the endpoint, then (once per attempt) checksum, sign, send,
//! interpret errors and unmarshal. The retry stage decides between attempts using
//! a per-endpoint retry capacity and corrects the local clock when a service
//! reports skew.
//!
//! # Quick Start
//!
//! ```no_run
//! use cloudsdk_runtime::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct GetItemOutput {
//!     value: String,
//! }
//!
//! struct GetItem {
//!     key: String,
//! }
//!
//! impl Operation for GetItem {
//!     type Output = GetItemOutput;
//!
//!     fn name(&self) -> &'static str {
//!         "GetItem"
//!     }
//!
//!     fn marshal(&self, request: &mut RequestMessage) -> SdkResult<()> {
//!         let body = serde_json::to_vec(&serde_json::json!({ "Key": self.key }))
//!             .map_err(|source| SdkError::Marshal {
//!                 message: "GetItem body".to_owned(),
//!                 source: Some(Box::new(source)),
//!             })?;
//!         request.body = body.into();
//!         Ok(())
//!     }
//!
//!     fn unmarshal(&self, response: &HttpResponse) -> SdkResult<Self::Output> {
//!         response.json()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ServiceClient::builder(
//!         ClientConfig::new("kv")
//!             .with_region("eu-west-1")
//!             .with_retry_mode(RetryMode::Standard),
//!     )
//!     .try_build()?;
//!
//!     let item = client.invoke(GetItem { key: "a".to_owned() }).await?;
//!     println!("value={}", item.value);
//!     Ok(())
//! }
//! ```
//!
//! # Recommended Defaults
//!
//! - Share one [`CapacityRegistry`] and one [`ClockSkewCache`] between clients that
//!   talk to the same endpoints.
//! - Streaming bodies are only retried when they can be repositioned; prefer
//!   [`SeekableStream`] over [`ForwardOnlyStream`] where possible.

mod body;
mod capacity;
mod client;
mod config;
mod context;
mod endpoint;
mod error;
mod metrics;
mod operation;
pub mod pipeline;
mod response;
pub mod retry;
mod signer;
mod skew;
mod transport;
mod util;

pub use crate::body::{
    ForwardOnlyStream, HashingStream, PayloadStream, RequestBody, SeekableStream, StreamBody,
};
pub use crate::capacity::{CapacityKey, CapacityRegistry, RetryCapacity};
pub use crate::client::{ServiceClient, ServiceClientBuilder};
pub use crate::config::{CapacityConfig, ClientConfig, RetryMode, RetryPolicyConfig};
pub use crate::context::{CapacityLane, ExecutionContext, RequestMessage};
pub use crate::endpoint::{
    AuthSchemeHint, EndpointResolver, RegionalEndpointResolver, ResolvedEndpoint,
};
pub use crate::error::{
    CancelOrigin, ErrorCode, ErrorType, RetryableDetails, SdkError, ServiceError, TimeoutPhase,
    TransportErrorKind,
};
pub use crate::metrics::{ExecutionMetrics, ExecutionMetricsSnapshot};
pub use crate::operation::{Operation, REQUEST_ID_HEADER, unmarshal_json_error};
pub use crate::response::{HttpResponse, OperationResponse};
pub use crate::retry::{
    FixedJitter, INVOCATION_ID_HEADER, JitterSource, NoRetryReason, RandomJitter, RetryClass,
    RetryHandler, RetryPolicy, RetryVerdict, SDK_REQUEST_HEADER, SeededJitter,
};
pub use crate::signer::{AnonymousSigner, RequestSigner, SigningContext};
pub use crate::skew::{Clock, ClockSkewCache, FixedClock, SystemClock};
pub use crate::transport::{HttpTransport, HyperTransport};

pub type SdkResult<T> = std::result::Result<T, SdkError>;

pub mod prelude {
    pub use crate::{
        CapacityConfig, CapacityRegistry, ClientConfig, ClockSkewCache, ErrorCode,
        ExecutionMetricsSnapshot, HttpResponse, Operation, RequestBody, RequestMessage,
        RetryMode, SdkError, SdkResult, ServiceClient, ServiceError,
    };
}
