use futures_util::future::BoxFuture;
use tracing::debug;

use super::{ERROR_INTERPRET_STAGE, Handler, Next, UNMARSHAL_STAGE};
use crate::SdkResult;
use crate::context::ExecutionContext;
use crate::error::{BoxError, SdkError};
use crate::response::OperationResponse;

/// Attaches the typed output to successful responses.
#[derive(Debug, Default)]
pub struct UnmarshalHandler;

impl Handler for UnmarshalHandler {
    fn name(&self) -> &'static str {
        UNMARSHAL_STAGE
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, SdkResult<OperationResponse>> {
        Box::pin(async move {
            let mut response = next.run(ctx).await?;
            if !response.http().status().is_success() {
                return Ok(response);
            }
            let status = response.http().status();
            let output = ctx
                .operation()
                .unmarshal(response.http())
                .map_err(|error| match error {
                    SdkError::Unmarshal { .. } => error,
                    other => SdkError::Unmarshal {
                        status,
                        source: Box::new(other) as BoxError,
                    },
                })?;
            response.set_output(output);
            Ok(response)
        })
    }
}

/// Turns every non-2xx response into a service error.
#[derive(Debug, Default)]
pub struct ErrorInterpretHandler;

impl Handler for ErrorInterpretHandler {
    fn name(&self) -> &'static str {
        ERROR_INTERPRET_STAGE
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, SdkResult<OperationResponse>> {
        Box::pin(async move {
            let response = next.run(ctx).await?;
            if response.http().status().is_success() {
                return Ok(response);
            }
            let error = ctx.operation().unmarshal_error(response.http());
            debug!(
                operation = ctx.operation_name(),
                status = error.status().as_u16(),
                code = error.code().unwrap_or("unknown"),
                request_id = error.request_id().unwrap_or("-"),
                "service returned an error"
            );
            Err(SdkError::service(error))
        })
    }
}
