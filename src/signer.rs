use chrono::{DateTime, Utc};

use crate::context::RequestMessage;
use crate::endpoint::AuthSchemeHint;
use crate::error::SdkError;

/// Inputs a signer needs beyond the request itself.
#[derive(Clone, Debug)]
pub struct SigningContext<'a> {
    /// Skew-corrected time for the target endpoint.
    pub now: DateTime<Utc>,
    pub service_name: &'a str,
    pub region: Option<&'a str>,
    pub auth_schemes: &'a [AuthSchemeHint],
    pub payload_sha256: Option<&'a str>,
}

pub trait RequestSigner: Send + Sync {
    fn sign(
        &self,
        request: &mut RequestMessage,
        signing: &SigningContext<'_>,
    ) -> Result<(), SdkError>;
}

/// Leaves requests unsigned.
#[derive(Debug, Default)]
pub struct AnonymousSigner;

impl RequestSigner for AnonymousSigner {
    fn sign(
        &self,
        _request: &mut RequestMessage,
        _signing: &SigningContext<'_>,
    ) -> Result<(), SdkError> {
        Ok(())
    }
}
