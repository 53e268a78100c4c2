use std::any::Any;

use serde::Deserialize;

use crate::context::RequestMessage;
use crate::error::{ErrorType, SdkError, ServiceError};
use crate::response::HttpResponse;

pub const REQUEST_ID_HEADER: &str = "x-amzn-requestid";
const ALT_REQUEST_ID_HEADER: &str = "x-amz-request-id";
const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

/// The generated half of a call: turns a typed request into wire form and
/// the wire response back into a typed output.
pub trait Operation: Send + Sync + 'static {
    type Output: Send + 'static;

    fn name(&self) -> &'static str;

    fn marshal(&self, request: &mut RequestMessage) -> Result<(), SdkError>;

    fn unmarshal(&self, response: &HttpResponse) -> Result<Self::Output, SdkError>;

    fn unmarshal_error(&self, response: &HttpResponse) -> ServiceError {
        unmarshal_json_error(response)
    }
}

/// Object-safe view of an [`Operation`] used inside the pipeline.
pub(crate) trait ErasedOperation: Send + Sync {
    fn name(&self) -> &'static str;

    fn marshal(&self, request: &mut RequestMessage) -> Result<(), SdkError>;

    fn unmarshal(&self, response: &HttpResponse) -> Result<Box<dyn Any + Send>, SdkError>;

    fn unmarshal_error(&self, response: &HttpResponse) -> ServiceError;
}

impl<O> ErasedOperation for O
where
    O: Operation,
{
    fn name(&self) -> &'static str {
        Operation::name(self)
    }

    fn marshal(&self, request: &mut RequestMessage) -> Result<(), SdkError> {
        Operation::marshal(self, request)
    }

    fn unmarshal(&self, response: &HttpResponse) -> Result<Box<dyn Any + Send>, SdkError> {
        Operation::unmarshal(self, response).map(|output| Box::new(output) as Box<dyn Any + Send>)
    }

    fn unmarshal_error(&self, response: &HttpResponse) -> ServiceError {
        Operation::unmarshal_error(self, response)
    }
}

#[derive(Debug, Default, Deserialize)]
struct JsonErrorBody {
    #[serde(rename = "__type", alias = "code", alias = "Code")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// Reads `{"__type": "...#Code", "message": "..."}` style error bodies.
///
/// Falls back to the error-type header, then to a bare status error.
pub fn unmarshal_json_error(response: &HttpResponse) -> ServiceError {
    let body: JsonErrorBody = serde_json::from_slice(response.body()).unwrap_or_default();
    let code = body
        .error_type
        .or_else(|| response.header_str(ERROR_TYPE_HEADER).map(ToOwned::to_owned))
        .map(|raw| normalize_error_code(&raw))
        .filter(|code| !code.is_empty());

    let status = response.status();
    let error_type = if status.is_server_error() {
        ErrorType::Receiver
    } else if status.is_client_error() {
        ErrorType::Sender
    } else {
        ErrorType::Unknown
    };

    let mut error = ServiceError::new(status)
        .with_error_type(error_type)
        .with_headers(response.headers().clone());
    if let Some(code) = code {
        error = error.with_code(code);
    }
    if let Some(message) = body.message {
        error = error.with_message(message);
    }
    if let Some(request_id) = response
        .header_str(REQUEST_ID_HEADER)
        .or_else(|| response.header_str(ALT_REQUEST_ID_HEADER))
    {
        error = error.with_request_id(request_id);
    }
    error
}

/// `com.example#ThrottlingException:extra` becomes `ThrottlingException`.
fn normalize_error_code(raw: &str) -> String {
    let without_namespace = raw.rsplit('#').next().unwrap_or(raw);
    without_namespace
        .split(':')
        .next()
        .unwrap_or(without_namespace)
        .trim()
        .to_owned()
}
