//! Two-sided middleware pipeline: request-stage transforms applied before
//! dispatch and response-stage transforms applied before parsing.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tracing::debug;

use crate::descriptor::RequestDescriptor;
use crate::error::BoxError;
use crate::response::Exchange;

/// A response synthesized by a short-circuiting request middleware.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Synthesized status.
    pub status: StatusCode,
    /// Synthesized headers.
    pub headers: HeaderMap,
    /// Synthesized body.
    pub body: Bytes,
}

impl RawResponse {
    /// Create a synthesized response.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Outcome of one request-stage middleware.
pub enum RequestStage {
    /// Pass the (possibly rewritten) descriptor to the next middleware.
    Continue(RequestDescriptor),
    /// Stop the chain and complete without contacting the transport. The
    /// remaining request middleware do not run; an `Err` terminates the
    /// request as a middleware failure, an `Ok` feeds validation and parsing.
    ShortCircuit(RequestDescriptor, Result<RawResponse, BoxError>),
}

/// Transforms the outgoing descriptor before every dispatch. Applied in
/// registration order; cache hits bypass the chain entirely since no network
/// trip occurs.
#[async_trait]
pub trait RequestMiddleware: Send + Sync {
    /// Process the descriptor.
    async fn process(&self, descriptor: RequestDescriptor) -> RequestStage;
}

/// Transforms the exchange after transport completion and before parsing.
/// Every registered response middleware runs on every transport outcome,
/// success- or failure-shaped, so observability middleware reliably sees
/// each one.
#[async_trait]
pub trait ResponseMiddleware: Send + Sync {
    /// Process the exchange.
    async fn process(&self, exchange: Exchange) -> Exchange;
}

/// Logs each outgoing descriptor at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingRequestMiddleware;

#[async_trait]
impl RequestMiddleware for LoggingRequestMiddleware {
    async fn process(&self, descriptor: RequestDescriptor) -> RequestStage {
        debug!(
            method = %descriptor.method(),
            url = %descriptor.url(),
            "outgoing request"
        );
        RequestStage::Continue(descriptor)
    }
}

/// Logs each exchange outcome at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingResponseMiddleware;

#[async_trait]
impl ResponseMiddleware for LoggingResponseMiddleware {
    async fn process(&self, exchange: Exchange) -> Exchange {
        match &exchange.error {
            None => debug!(
                url = %exchange.descriptor.url(),
                status = exchange.status.map(|s| s.as_u16()),
                "exchange completed"
            ),
            Some(error) => debug!(
                url = %exchange.descriptor.url(),
                error = %error,
                "exchange failed"
            ),
        }
        exchange
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor::builder(Method::GET, "https://example.com/")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn logging_middleware_passes_through() {
        let stage = LoggingRequestMiddleware.process(descriptor()).await;
        assert!(matches!(stage, RequestStage::Continue(_)));

        let exchange = Exchange {
            descriptor: descriptor(),
            status: Some(StatusCode::OK),
            headers: HeaderMap::new(),
            body: None,
            error: None,
        };
        let exchange = LoggingResponseMiddleware.process(exchange).await;
        assert!(exchange.is_success());
    }
}
