use std::any::Any;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{BoxError, SdkError};

#[derive(Clone, Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON, reporting failures as unmarshal errors.
    pub fn json<T>(&self) -> Result<T, SdkError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body).map_err(|source| SdkError::Unmarshal {
            status: self.status,
            source: Box::new(source) as BoxError,
        })
    }
}

/// What the pipeline hands back: the raw exchange plus the unmarshalled output.
pub struct OperationResponse {
    http: HttpResponse,
    output: Option<Box<dyn Any + Send>>,
}

impl OperationResponse {
    pub fn new(http: HttpResponse) -> Self {
        Self { http, output: None }
    }

    pub fn http(&self) -> &HttpResponse {
        &self.http
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    pub(crate) fn set_output(&mut self, output: Box<dyn Any + Send>) {
        self.output = Some(output);
    }

    pub(crate) fn take_output(&mut self) -> Option<Box<dyn Any + Send>> {
        self.output.take()
    }
}

impl std::fmt::Debug for OperationResponse {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("OperationResponse")
            .field("http", &self.http)
            .field("has_output", &self.output.is_some())
            .finish()
    }
}
