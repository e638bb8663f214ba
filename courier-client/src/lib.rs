//! # Courier
//!
//! A declarative async HTTP client runtime: requests are described as
//! immutable descriptors or typed targets, executed over a pluggable
//! transport, routed back through a concurrent task registry, transformed by
//! a two-sided middleware pipeline, and parsed into typed values with
//! cache-aware, exactly-once completion semantics.
//!
//! ## Features
//!
//! - **Declarative requests**: descriptors built from URLs or `Target`
//!   implementations, with JSON and form bodies
//! - **Two-sided middleware**: request-stage rewriting with short-circuiting,
//!   response-stage transforms that observe every outcome
//! - **Cache-aware parsing**: per-descriptor cache with merge semantics and
//!   decoded-object round trips
//! - **Typed results**: bytes, text, JSON trees, or serde-decoded values,
//!   each delivered exactly once per request
//! - **Cooperative cancellation**: cancel by handle or task id at any point
//!   and still receive a single terminal result
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use courier::{Client, ClientConfig};
//!
//! #[derive(Clone, serde::Deserialize)]
//! struct User {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new(ClientConfig::default());
//!
//!     let response = client
//!         .get("https://api.example.com/users/1")
//!         .validate()
//!         .decoded::<User>()
//!         .await;
//!
//!     match response.result {
//!         Ok(user) => println!("hello, {}", user.name),
//!         Err(error) => eprintln!("request failed: {error}"),
//!     }
//! }
//! ```
//!
//! ## Middleware and Caching
//!
//! ```rust,no_run
//! use courier::{
//!     CachePolicy, Client, LoggingRequestMiddleware, LoggingResponseMiddleware, Method,
//!     RequestDescriptor,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::builder()
//!         .request_middleware(LoggingRequestMiddleware)
//!         .response_middleware(LoggingResponseMiddleware)
//!         .build();
//!
//!     let descriptor = RequestDescriptor::builder(Method::GET, "https://api.example.com/feed")
//!         .query("page", "1")
//!         .cache_policy(CachePolicy::PreferCache)
//!         .build()
//!         .expect("valid descriptor");
//!
//!     // the second call is served from the cache without a network trip
//!     let first = client.request(descriptor.clone()).bytes().await;
//!     let second = client.request(descriptor).bytes().await;
//!     assert!(first.is_success());
//!     assert!(second.from_cache);
//! }
//! ```

mod adapter;
mod cache;
mod client;
mod config;
mod descriptor;
mod error;
mod middleware;
mod parser;
mod registry;
mod request;
mod response;
mod target;
pub mod testing;
mod transport;
mod validate;

pub use adapter::{
    ApiKeyAdapter, BasicAuthAdapter, BearerAuthAdapter, HeaderAdapter, RequestAdapter,
};
pub use cache::{CacheItem, CacheProvider, CachedObject, MemoryCacheProvider};
pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use descriptor::{Body, CacheKey, CachePolicy, DescriptorBuilder, RequestDescriptor};
pub use error::{
    BoxError, ClientError, ParseError, Result, TransportError, ValidationFailure,
};
pub use middleware::{
    LoggingRequestMiddleware, LoggingResponseMiddleware, RawResponse, RequestMiddleware,
    RequestStage, ResponseMiddleware,
};
pub use parser::{BytesParser, JsonParser, JsonTreeParser, ResponseParser, TextParser};
pub use registry::{TaskId, TaskRegistry};
pub use request::{Request, RequestHandle};
pub use response::{Exchange, Response};
pub use target::Target;
pub use transport::{HttpTransport, PreparedRequest, Transport, TransportDelegate};
pub use validate::{ResponseValidator, StatusValidator};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use courier::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cache::{CacheItem, CacheProvider, MemoryCacheProvider};
    pub use crate::client::{Client, ClientBuilder};
    pub use crate::config::{ClientConfig, ClientConfigBuilder};
    pub use crate::descriptor::{Body, CachePolicy, RequestDescriptor};
    pub use crate::error::{ClientError, ParseError, Result, TransportError};
    pub use crate::middleware::{RawResponse, RequestMiddleware, RequestStage, ResponseMiddleware};
    pub use crate::parser::ResponseParser;
    pub use crate::registry::TaskId;
    pub use crate::request::{Request, RequestHandle};
    pub use crate::response::{Exchange, Response};
    pub use crate::target::Target;
    pub use crate::validate::{ResponseValidator, StatusValidator};
    pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
}
