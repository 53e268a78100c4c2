use std::sync::Arc;

use futures_util::future::BoxFuture;
use http::Uri;
use tracing::debug;

use super::{Handler, Next, RESOLVE_ENDPOINT_STAGE};
use crate::SdkResult;
use crate::config::ClientConfig;
use crate::context::ExecutionContext;
use crate::endpoint::{EndpointResolver, substitute_path_resources};
use crate::error::SdkError;
use crate::response::OperationResponse;
use crate::util::{append_query_pairs, join_base_path, redact_uri_for_logs};

pub struct ResolveEndpointHandler {
    config: Arc<ClientConfig>,
    resolver: Arc<dyn EndpointResolver>,
}

impl ResolveEndpointHandler {
    pub fn new(config: Arc<ClientConfig>, resolver: Arc<dyn EndpointResolver>) -> Self {
        Self { config, resolver }
    }

    /// Computes the request uri from scratch, so it is safe to run again
    /// after the endpoint went stale.
    pub(crate) fn apply(&self, ctx: &mut ExecutionContext) -> SdkResult<()> {
        let resolved = self.resolver.resolve(&self.config, &ctx.request)?;
        let path = substitute_path_resources(&ctx.request.resource_path, &ctx.request)?;
        let mut uri_text = join_base_path(&resolved.url.to_string(), &path);
        if ctx.request.use_query_string || ctx.request.body.is_empty() {
            uri_text = append_query_pairs(&uri_text, &ctx.request.parameters);
        }
        let uri = uri_text
            .parse::<Uri>()
            .map_err(|_| SdkError::InvalidUri {
                uri: uri_text.clone(),
            })?;

        debug!(
            operation = ctx.operation_name(),
            uri = %redact_uri_for_logs(&uri_text),
            stale = ctx.endpoint_stale,
            "endpoint resolved"
        );
        ctx.request.endpoint = Some(uri);
        ctx.resolved_endpoint = Some(resolved);
        ctx.endpoint_stale = false;
        // A new URI invalidates any signature already on the request.
        ctx.is_signed = false;
        Ok(())
    }
}

impl std::fmt::Debug for ResolveEndpointHandler {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ResolveEndpointHandler")
            .field("service", &self.config.service_name())
            .finish()
    }
}

impl Handler for ResolveEndpointHandler {
    fn name(&self) -> &'static str {
        RESOLVE_ENDPOINT_STAGE
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, SdkResult<OperationResponse>> {
        Box::pin(async move {
            self.apply(ctx)?;
            next.run(ctx).await
        })
    }
}
