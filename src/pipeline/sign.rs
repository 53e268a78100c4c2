use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::debug;

use super::{CONTENT_SHA256_HEADER, Handler, Next, SIGN_STAGE};
use crate::SdkResult;
use crate::config::ClientConfig;
use crate::context::ExecutionContext;
use crate::response::OperationResponse;
use crate::signer::{RequestSigner, SigningContext};
use crate::skew::ClockSkewCache;
use crate::util::{endpoint_key, insert_header};

pub const AMZ_DATE_HEADER: &str = "x-amz-date";
const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Signs with the skew-corrected clock. Skipped while the context still
/// carries a valid signature.
pub struct SignHandler {
    config: Arc<ClientConfig>,
    signer: Arc<dyn RequestSigner>,
    skew: Arc<ClockSkewCache>,
}

impl SignHandler {
    pub fn new(
        config: Arc<ClientConfig>,
        signer: Arc<dyn RequestSigner>,
        skew: Arc<ClockSkewCache>,
    ) -> Self {
        Self {
            config,
            signer,
            skew,
        }
    }

    fn apply(&self, ctx: &mut ExecutionContext) -> SdkResult<()> {
        let endpoint = ctx
            .request
            .endpoint
            .as_ref()
            .map(endpoint_key)
            .unwrap_or_default();
        let now = self.skew.corrected_now(&endpoint);
        insert_header(
            &mut ctx.request.headers,
            AMZ_DATE_HEADER,
            &now.format(AMZ_DATE_FORMAT).to_string(),
        )?;

        let payload_sha256 = ctx
            .request
            .headers
            .get(CONTENT_SHA256_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);
        let auth_schemes = ctx
            .resolved_endpoint
            .as_ref()
            .map(|endpoint| endpoint.auth_schemes.as_slice())
            .unwrap_or_default();
        let signing = SigningContext {
            now,
            service_name: self.config.authentication_service_name(),
            region: self.config.region(),
            auth_schemes,
            payload_sha256: payload_sha256.as_deref(),
        };
        self.signer.sign(&mut ctx.request, &signing)?;
        ctx.is_signed = true;
        debug!(
            operation = ctx.operation_name(),
            endpoint = %endpoint,
            signed_at = %now,
            "request signed"
        );
        Ok(())
    }
}

impl std::fmt::Debug for SignHandler {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SignHandler")
            .field("service", &self.config.authentication_service_name())
            .field("skew", &self.skew)
            .finish()
    }
}

impl Handler for SignHandler {
    fn name(&self) -> &'static str {
        SIGN_STAGE
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, SdkResult<OperationResponse>> {
        Box::pin(async move {
            if !ctx.is_signed {
                self.apply(ctx)?;
            }
            next.run(ctx).await
        })
    }
}
