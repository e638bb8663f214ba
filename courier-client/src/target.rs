//! Declarative endpoint descriptions.

use http::Method;

use crate::descriptor::{Body, CachePolicy, RequestDescriptor};
use crate::error::Result;

/// A declarative description of an API endpoint, typically implemented on an
/// enum with one variant per route.
///
/// ```
/// use courier::Target;
///
/// enum StatusService {
///     Ok,
///     Broken,
/// }
///
/// impl Target for StatusService {
///     fn base_url(&self) -> String {
///         "https://httpstat.us/".to_string()
///     }
///
///     fn path(&self) -> String {
///         match self {
///             StatusService::Ok => "200".to_string(),
///             StatusService::Broken => "500".to_string(),
///         }
///     }
/// }
/// ```
pub trait Target {
    /// Base URL the path is appended to.
    fn base_url(&self) -> String;

    /// Path of this endpoint.
    fn path(&self) -> String;

    /// HTTP method, `GET` by default.
    fn method(&self) -> Method {
        Method::GET
    }

    /// Headers for this endpoint.
    fn headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Query parameters for this endpoint.
    fn query(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Request body for this endpoint.
    fn body(&self) -> Body {
        Body::Empty
    }

    /// Cache policy for this endpoint.
    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::NetworkOnly
    }

    /// Assemble the descriptor for this endpoint.
    fn descriptor(&self) -> Result<RequestDescriptor> {
        let mut builder =
            RequestDescriptor::builder(self.method(), format!("{}{}", self.base_url(), self.path()));
        for (name, value) in self.headers() {
            builder = builder.header(name, value);
        }
        for (key, value) in self.query() {
            builder = builder.query(key, value);
        }
        builder
            .body(self.body())
            .cache_policy(self.cache_policy())
            .build()
    }
}
