use futures_util::future::BoxFuture;
use tracing::debug;

use super::{Handler, MARSHAL_STAGE, Next};
use crate::SdkResult;
use crate::context::ExecutionContext;
use crate::response::OperationResponse;

/// Turns the typed request into its wire form once per call.
#[derive(Debug, Default)]
pub struct MarshalHandler;

impl Handler for MarshalHandler {
    fn name(&self) -> &'static str {
        MARSHAL_STAGE
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, SdkResult<OperationResponse>> {
        Box::pin(async move {
            let operation = ctx.operation();
            operation.marshal(&mut ctx.request)?;
            debug!(
                operation = ctx.operation_name(),
                method = %ctx.request.method,
                resource_path = %ctx.request.resource_path,
                "request marshalled"
            );
            next.run(ctx).await
        })
    }
}
