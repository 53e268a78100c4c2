//! Ordered request handlers.
//!
//! Each [`Handler`] receives the call context plus a [`Next`] cursor over
//! the handlers after it. A handler may run `next` zero, one or several
//! times; the retry stage runs it once per attempt.

mod checksum;
mod endpoint;
mod marshal;
mod send;
mod sign;
mod unmarshal;

pub use checksum::{ChecksumHandler, CONTENT_SHA256_HEADER, UNSIGNED_PAYLOAD};
pub use endpoint::ResolveEndpointHandler;
pub use marshal::MarshalHandler;
pub use send::TransportHandler;
pub use sign::{AMZ_DATE_HEADER, SignHandler};
pub use unmarshal::{ErrorInterpretHandler, UnmarshalHandler};

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::SdkResult;
use crate::context::ExecutionContext;
use crate::error::SdkError;
use crate::response::OperationResponse;
use crate::retry::RetryHandler;

pub const MARSHAL_STAGE: &str = "marshal";
pub const RESOLVE_ENDPOINT_STAGE: &str = "resolve-endpoint";
pub const RETRY_STAGE: &str = "retry";
pub const CHECKSUM_STAGE: &str = "checksum";
pub const SIGN_STAGE: &str = "sign";
pub const UNMARSHAL_STAGE: &str = "unmarshal";
pub const ERROR_INTERPRET_STAGE: &str = "error-interpret";
pub const TRANSPORT_STAGE: &str = "transport";

pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, SdkResult<OperationResponse>>;
}

/// The handlers that have not run yet.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    handlers: &'a [Arc<dyn Handler>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(handlers: &'a [Arc<dyn Handler>]) -> Self {
        Self { handlers }
    }

    pub fn remaining(&self) -> usize {
        self.handlers.len()
    }

    pub fn run<'b>(&self, ctx: &'b mut ExecutionContext) -> BoxFuture<'b, SdkResult<OperationResponse>>
    where
        'a: 'b,
    {
        match self.handlers.split_first() {
            Some((handler, rest)) => handler.invoke(ctx, Next::new(rest)),
            None => Box::pin(async {
                Err(SdkError::internal(
                    "pipeline ended without a handler producing a response",
                ))
            }),
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    handlers: Arc<[Arc<dyn Handler>]>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }

    pub async fn execute(&self, ctx: &mut ExecutionContext) -> SdkResult<OperationResponse> {
        Next::new(&self.handlers).run(ctx).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Pipeline")
            .field("handlers", &self.handler_names())
            .finish()
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    handlers: Vec<Arc<dyn Handler>>,
}

impl PipelineBuilder {
    /// `marshal → resolve-endpoint → retry → checksum → sign → unmarshal →
    /// error-interpret → transport`. Everything after `retry` runs once per
    /// attempt.
    pub fn standard(
        endpoint: Arc<ResolveEndpointHandler>,
        retry: Arc<RetryHandler>,
        sign: Arc<SignHandler>,
        transport: Arc<TransportHandler>,
    ) -> Self {
        Self::default()
            .handler(Arc::new(MarshalHandler))
            .handler(endpoint)
            .handler(retry)
            .handler(Arc::new(ChecksumHandler))
            .handler(sign)
            .handler(Arc::new(UnmarshalHandler))
            .handler(Arc::new(ErrorInterpretHandler))
            .handler(transport)
    }

    pub fn handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Inserts before the first handler called `anchor`.
    pub fn insert_before(self, anchor: &str, handler: Arc<dyn Handler>) -> SdkResult<Self> {
        self.insert_at(anchor, handler, 0)
    }

    /// Inserts after the first handler called `anchor`.
    pub fn insert_after(self, anchor: &str, handler: Arc<dyn Handler>) -> SdkResult<Self> {
        self.insert_at(anchor, handler, 1)
    }

    fn insert_at(
        mut self,
        anchor: &str,
        handler: Arc<dyn Handler>,
        offset: usize,
    ) -> SdkResult<Self> {
        let index = self
            .handlers
            .iter()
            .position(|existing| existing.name() == anchor)
            .ok_or_else(|| SdkError::InvalidConfig {
                message: format!("pipeline has no handler named {anchor}"),
            })?;
        self.handlers.insert(index + offset, handler);
        Ok(self)
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            handlers: self.handlers.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use futures_util::future::BoxFuture;
    use http::{HeaderMap, Method, StatusCode};
    use tokio_util::sync::CancellationToken;

    use super::{Handler, Next, Pipeline};
    use crate::SdkResult;
    use crate::context::{ExecutionContext, RequestMessage};
    use crate::error::{ErrorCode, SdkError};
    use crate::operation::Operation;
    use crate::response::{HttpResponse, OperationResponse};

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

    struct Recorder {
        name: &'static str,
        trace: Arc<Mutex<Vec<String>>>,
    }

    impl Handler for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn invoke<'a>(
            &'a self,
            ctx: &'a mut ExecutionContext,
            next: Next<'a>,
        ) -> BoxFuture<'a, SdkResult<OperationResponse>> {
            Box::pin(async move {
                self.trace
                    .lock()
                    .expect("trace lock")
                    .push(format!("enter {}", self.name));
                let result = next.run(ctx).await;
                self.trace
                    .lock()
                    .expect("trace lock")
                    .push(format!("exit {}", self.name));
                result
            })
        }
    }

    struct Terminal;

    impl Handler for Terminal {
        fn name(&self) -> &'static str {
            "terminal"
        }

        fn invoke<'a>(
            &'a self,
            _ctx: &'a mut ExecutionContext,
            _next: Next<'a>,
        ) -> BoxFuture<'a, SdkResult<OperationResponse>> {
            Box::pin(async {
                Ok(OperationResponse::new(HttpResponse::new(
                    StatusCode::OK,
                    HeaderMap::new(),
                    Bytes::new(),
                )))
            })
        }
    }

    fn context() -> ExecutionContext {
        ExecutionContext::for_operation(
            RequestMessage::new(Method::POST),
            Ping,
            CancellationToken::new(),
        )
    }

    fn recorder(name: &'static str, trace: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Handler> {
        Arc::new(Recorder {
            name,
            trace: trace.clone(),
        })
    }

    #[tokio::test]
    async fn handlers_nest_in_insertion_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .handler(recorder("outer", &trace))
            .handler(recorder("inner", &trace))
            .handler(Arc::new(Terminal))
            .insert_after("outer", recorder("middle", &trace))
            .expect("anchor exists")
            .build();

        assert_eq!(pipeline.handler_names(), vec!["outer", "middle", "inner", "terminal"]);
        pipeline.execute(&mut context()).await.expect("pipeline succeeds");
        assert_eq!(
            *trace.lock().expect("trace lock"),
            vec![
                "enter outer",
                "enter middle",
                "enter inner",
                "exit inner",
                "exit middle",
                "exit outer",
            ]
        );
    }

    #[tokio::test]
    async fn running_past_the_last_handler_is_an_internal_error() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder().handler(recorder("only", &trace)).build();
        let error = pipeline
            .execute(&mut context())
            .await
            .expect_err("no terminal handler");
        assert_eq!(error.code(), ErrorCode::Internal);
    }

    #[test]
    fn inserting_relative_to_unknown_handler_fails() {
        let result = Pipeline::builder()
            .handler(Arc::new(Terminal))
            .insert_before("missing", Arc::new(Terminal));
        assert!(result.is_err());
    }
}
