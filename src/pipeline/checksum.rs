use futures_util::future::BoxFuture;
use sha2::{Digest, Sha256};

use super::{CHECKSUM_STAGE, Handler, Next};
use crate::SdkResult;
use crate::body::RequestBody;
use crate::context::ExecutionContext;
use crate::response::OperationResponse;
use crate::util::{encode_hex_lower, insert_header};

pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Declares the payload digest on every attempt. Streams are hashed while
/// they are sent.
#[derive(Debug, Default)]
pub struct ChecksumHandler;

impl ChecksumHandler {
    fn apply(ctx: &mut ExecutionContext) -> SdkResult<()> {
        let value = match &mut ctx.request.body {
            RequestBody::Empty => encode_hex_lower(&Sha256::digest(b"")),
            RequestBody::Bytes(bytes) => encode_hex_lower(&Sha256::digest(bytes)),
            RequestBody::Stream(stream) => {
                stream.enable_hashing();
                UNSIGNED_PAYLOAD.to_owned()
            }
        };
        insert_header(&mut ctx.request.headers, CONTENT_SHA256_HEADER, &value)
    }
}

impl Handler for ChecksumHandler {
    fn name(&self) -> &'static str {
        CHECKSUM_STAGE
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, SdkResult<OperationResponse>> {
        Box::pin(async move {
            Self::apply(ctx)?;
            next.run(ctx).await
        })
    }
}
