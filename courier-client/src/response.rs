//! Terminal response values and the pre-parse exchange.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::descriptor::RequestDescriptor;
use crate::error::{BoxError, ClientError};

/// Everything observed about an exchange after transport completion and
/// before parsing. This is the value response middleware transform.
#[derive(Debug)]
pub struct Exchange {
    /// The descriptor that produced this exchange.
    pub descriptor: RequestDescriptor,
    /// Observed status, when headers arrived.
    pub status: Option<StatusCode>,
    /// Observed response headers.
    pub headers: HeaderMap,
    /// Accumulated response body, when any bytes arrived.
    pub body: Option<Bytes>,
    /// Failure-shaped when set. Middleware may convert a success-shaped
    /// exchange by rejecting it; later middleware still observe the result.
    pub error: Option<ClientError>,
}

impl Exchange {
    /// Check if the exchange is success-shaped.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert the exchange to failure-shaped with a middleware rejection.
    pub fn reject(&mut self, reason: impl Into<BoxError>) {
        self.error = Some(ClientError::Middleware(reason.into()));
    }
}

/// Terminal result of one request: a tagged success or failure, with the
/// original descriptor, observed status and headers, and the raw bytes
/// attached when available.
#[derive(Debug)]
pub struct Response<T> {
    /// The parsed value or the specific failure.
    pub result: Result<T, ClientError>,
    /// Descriptor the call was issued with, when one could be built.
    pub descriptor: Option<RequestDescriptor>,
    /// Observed HTTP status.
    pub status: Option<StatusCode>,
    /// Observed response headers.
    pub headers: HeaderMap,
    /// Raw response bytes, attached even on failure to aid diagnostics.
    pub body: Option<Bytes>,
    /// Whether the value was served by the cache provider rather than the
    /// transport.
    pub from_cache: bool,
}

impl<T> Response<T> {
    pub(crate) fn failed(descriptor: Option<RequestDescriptor>, error: ClientError) -> Self {
        Self {
            result: Err(error),
            descriptor,
            status: None,
            headers: HeaderMap::new(),
            body: None,
            from_cache: false,
        }
    }

    /// Check if the request succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Get the observed status code as a number.
    pub fn status_code(&self) -> Option<u16> {
        self.status.map(|status| status.as_u16())
    }

    /// Get the parsed value, if the request succeeded.
    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    /// Get the failure, if the request failed.
    pub fn error(&self) -> Option<&ClientError> {
        self.result.as_ref().err()
    }

    /// Unwrap into the inner result, discarding response metadata.
    pub fn into_result(self) -> Result<T, ClientError> {
        self.result
    }
}
