//! Request descriptors: the immutable value describing one logical call.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use url::Url;

use crate::error::{ClientError, Result};
use crate::transport::PreparedRequest;

/// How a request interacts with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Always go to the network; never read the cache.
    #[default]
    NetworkOnly,
    /// Return a cached item when one exists, otherwise load from the network.
    PreferCache,
}

/// Request body encoding.
#[derive(Debug, Clone, Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// JSON-encoded body (`application/json`).
    Json(serde_json::Value),
    /// Form-encoded body (`application/x-www-form-urlencoded`).
    Form(Vec<(String, String)>),
    /// Pre-encoded raw bytes.
    Bytes(Bytes),
}

impl Body {
    /// Check if there is no body.
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }
}

/// Stable, hashable projection of a descriptor used as the cache key:
/// method, full URL, and sorted headers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
}

/// Immutable description of one logical HTTP call.
///
/// Used both to dispatch the call and, through [`RequestDescriptor::cache_key`],
/// as the cache key. Query parameters are folded into the URL at build time.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    url: Url,
    method: Method,
    headers: HeaderMap,
    body: Body,
    cache_policy: CachePolicy,
}

impl RequestDescriptor {
    /// Create a builder for the given method and URL.
    pub fn builder(method: Method, url: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(method, url.into())
    }

    /// Get the target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get the request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the request body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Get the cache policy.
    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    /// Return a copy with the header set, replacing any existing value.
    /// Invalid header names or values leave the descriptor unchanged.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        } else {
            tracing::warn!(header = name.as_ref(), "dropping invalid header");
        }
        self
    }

    /// Return a copy with a different URL.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    /// Return a copy with a different body.
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Return a copy with a different cache policy.
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Project the stable subset of this descriptor used as the cache key.
    pub fn cache_key(&self) -> CacheKey {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        headers.sort();

        CacheKey {
            method: self.method.to_string(),
            url: self.url.to_string(),
            headers,
        }
    }

    /// Finalize the descriptor for the wire: encode the body and set the
    /// content type it implies.
    pub fn prepare(&self) -> Result<PreparedRequest> {
        let mut headers = self.headers.clone();

        let body = match &self.body {
            Body::Empty => None,
            Body::Json(value) => {
                let encoded = serde_json::to_vec(value).map_err(|e| {
                    ClientError::InvalidDescriptor(format!("unencodable JSON body: {e}"))
                })?;
                headers
                    .entry(CONTENT_TYPE)
                    .or_insert(HeaderValue::from_static("application/json"));
                Some(Bytes::from(encoded))
            }
            Body::Form(fields) => {
                let encoded = serde_urlencoded::to_string(fields).map_err(|e| {
                    ClientError::InvalidDescriptor(format!("unencodable form body: {e}"))
                })?;
                headers
                    .entry(CONTENT_TYPE)
                    .or_insert(HeaderValue::from_static("application/x-www-form-urlencoded"));
                Some(Bytes::from(encoded))
            }
            Body::Bytes(bytes) => Some(bytes.clone()),
        };

        Ok(PreparedRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers,
            body,
        })
    }
}

/// Builder for [`RequestDescriptor`].
#[derive(Debug)]
pub struct DescriptorBuilder {
    url: String,
    method: Method,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Body,
    cache_policy: CachePolicy,
}

impl DescriptorBuilder {
    fn new(method: Method, url: String) -> Self {
        Self {
            url,
            method,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: Body::Empty,
            cache_policy: CachePolicy::default(),
        }
    }

    /// Add a header. Invalid names or values are dropped.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a JSON body. Serialization failures surface from
    /// [`DescriptorBuilder::build`].
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => self.body = Body::Json(value),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize JSON body");
            }
        }
        self
    }

    /// Set a form-encoded body.
    pub fn form<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.body = Body::Form(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Set a raw byte body.
    pub fn body_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Body::Bytes(bytes.into());
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Set the cache policy.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Build the descriptor, parsing the URL and folding in query parameters.
    pub fn build(self) -> Result<RequestDescriptor> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| ClientError::InvalidDescriptor(format!("{}: {e}", self.url)))?;

        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }

        Ok(RequestDescriptor {
            url,
            method: self.method,
            headers: self.headers,
            body: self.body,
            cache_policy: self.cache_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_folds_query_into_url() {
        let descriptor = RequestDescriptor::builder(Method::GET, "https://example.com/items")
            .query("page", "2")
            .query("sleep", "0")
            .build()
            .unwrap();

        assert_eq!(
            descriptor.url().as_str(),
            "https://example.com/items?page=2&sleep=0"
        );
    }

    #[test]
    fn invalid_url_is_rejected() {
        let result = RequestDescriptor::builder(Method::GET, "lolwat").build();
        assert!(matches!(result, Err(ClientError::InvalidDescriptor(_))));
    }

    #[test]
    fn cache_key_is_header_order_independent() {
        let a = RequestDescriptor::builder(Method::GET, "https://example.com/")
            .header("accept", "application/json")
            .header("x-token", "abc")
            .build()
            .unwrap();
        let b = RequestDescriptor::builder(Method::GET, "https://example.com/")
            .header("x-token", "abc")
            .header("accept", "application/json")
            .build()
            .unwrap();

        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_distinguishes_method_and_url() {
        let get = RequestDescriptor::builder(Method::GET, "https://example.com/a")
            .build()
            .unwrap();
        let post = RequestDescriptor::builder(Method::POST, "https://example.com/a")
            .build()
            .unwrap();
        let other = RequestDescriptor::builder(Method::GET, "https://example.com/b")
            .build()
            .unwrap();

        assert_ne!(get.cache_key(), post.cache_key());
        assert_ne!(get.cache_key(), other.cache_key());
    }

    #[test]
    fn prepare_encodes_json_body() {
        let descriptor = RequestDescriptor::builder(Method::POST, "https://example.com/")
            .json(&serde_json::json!({"item": "widget"}))
            .build()
            .unwrap();

        let prepared = descriptor.prepare().unwrap();
        assert_eq!(
            prepared.headers.get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(prepared.body.unwrap(), Bytes::from(r#"{"item":"widget"}"#));
    }

    #[test]
    fn prepare_encodes_form_body() {
        let descriptor = RequestDescriptor::builder(Method::POST, "https://example.com/")
            .form([("name", "jo ann"), ("tier", "gold")])
            .build()
            .unwrap();

        let prepared = descriptor.prepare().unwrap();
        assert_eq!(
            prepared.headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(prepared.body.unwrap(), Bytes::from("name=jo+ann&tier=gold"));
    }

    #[test]
    fn prepare_keeps_explicit_content_type() {
        let descriptor = RequestDescriptor::builder(Method::POST, "https://example.com/")
            .header("content-type", "application/vnd.api+json")
            .json(&serde_json::json!({}))
            .build()
            .unwrap();

        let prepared = descriptor.prepare().unwrap();
        assert_eq!(
            prepared.headers.get(CONTENT_TYPE).unwrap(),
            "application/vnd.api+json"
        );
    }
}
