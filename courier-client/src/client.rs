//! Client: builds requests from descriptors and targets, owns the middleware
//! lists, cache provider, and task registry, and demultiplexes transport
//! callbacks.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tracing::debug;

use crate::cache::{CacheProvider, MemoryCacheProvider};
use crate::config::ClientConfig;
use crate::descriptor::RequestDescriptor;
use crate::error::TransportError;
use crate::middleware::{RequestMiddleware, ResponseMiddleware};
use crate::registry::{TaskId, TaskRegistry};
use crate::request::Request;
use crate::target::Target;
use crate::transport::{HttpTransport, Transport, TransportDelegate};

/// Routes transport callbacks to the owning request through the registry.
/// Completion removes the registry entry under all circumstances.
struct Dispatcher {
    registry: Arc<TaskRegistry>,
}

impl TransportDelegate for Dispatcher {
    fn on_headers(&self, id: TaskId, status: StatusCode, headers: HeaderMap) {
        if let Some(request) = self.registry.lookup(id) {
            request.on_headers(status, headers);
        }
    }

    fn on_data(&self, id: TaskId, chunk: Bytes) {
        if let Some(request) = self.registry.lookup(id) {
            request.on_data(chunk);
        }
    }

    fn on_complete(&self, id: TaskId, error: Option<TransportError>) {
        match self.registry.unregister(id) {
            Some(request) => request.on_complete(error),
            None => debug!(task_id = id, "dropped completion for unknown task id"),
        }
    }
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn CacheProvider>,
    registry: Arc<TaskRegistry>,
    delegate: Arc<Dispatcher>,
    request_middleware: Vec<Arc<dyn RequestMiddleware>>,
    response_middleware: Vec<Arc<dyn ResponseMiddleware>>,
}

/// HTTP client: the entry point that turns descriptors and targets into
/// executed requests.
///
/// Each client owns its own task registry, cache provider, and middleware
/// lists; independent clients share nothing. Cloning is cheap and shares the
/// underlying state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client with the given configuration, a reqwest-backed
    /// transport, and an in-memory cache.
    pub fn new(config: ClientConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Create a client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Build a request from a descriptor.
    pub fn request(&self, descriptor: RequestDescriptor) -> Request {
        Request::new(self.clone(), descriptor)
    }

    /// Build a request from a declarative target. A malformed target yields
    /// a request that delivers `InvalidDescriptor` as its single completion.
    pub fn request_target<T: Target>(&self, target: &T) -> Request {
        match target.descriptor() {
            Ok(descriptor) => self.request(descriptor),
            Err(error) => Request::invalid(self.clone(), error),
        }
    }

    /// Build a request for `method` and `url`.
    pub fn request_url(&self, method: Method, url: impl AsRef<str>) -> Request {
        match RequestDescriptor::builder(method, url.as_ref()).build() {
            Ok(descriptor) => self.request(descriptor),
            Err(error) => Request::invalid(self.clone(), error),
        }
    }

    /// Build a GET request.
    pub fn get(&self, url: impl AsRef<str>) -> Request {
        self.request_url(Method::GET, url)
    }

    /// Build a POST request.
    pub fn post(&self, url: impl AsRef<str>) -> Request {
        self.request_url(Method::POST, url)
    }

    /// Build a PUT request.
    pub fn put(&self, url: impl AsRef<str>) -> Request {
        self.request_url(Method::PUT, url)
    }

    /// Build a PATCH request.
    pub fn patch(&self, url: impl AsRef<str>) -> Request {
        self.request_url(Method::PATCH, url)
    }

    /// Build a DELETE request.
    pub fn delete(&self, url: impl AsRef<str>) -> Request {
        self.request_url(Method::DELETE, url)
    }

    /// Build a HEAD request.
    pub fn head(&self, url: impl AsRef<str>) -> Request {
        self.request_url(Method::HEAD, url)
    }

    /// Cancel the request owning `id`. Sets its cancellation flag and asks
    /// the transport to cancel; the request still delivers its single
    /// terminal completion.
    pub fn cancel(&self, id: TaskId) {
        if let Some(request) = self.inner.registry.lookup(id) {
            request.cancel();
        }
        self.inner.transport.cancel(id);
    }

    /// Cancel every in-flight request.
    pub fn cancel_all(&self) {
        for request in self.inner.registry.snapshot() {
            request.cancel();
        }
        self.inner.transport.cancel_all();
    }

    /// Number of requests currently registered with the transport.
    pub fn in_flight(&self) -> usize {
        self.inner.registry.len()
    }

    /// Check if the task id is still registered.
    pub fn is_in_flight(&self, id: TaskId) -> bool {
        self.inner.registry.contains(id)
    }

    /// Get the cache provider.
    pub fn cache_provider(&self) -> &Arc<dyn CacheProvider> {
        &self.inner.cache
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub(crate) fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    pub(crate) fn delegate(&self) -> Arc<dyn TransportDelegate> {
        Arc::clone(&self.inner.delegate) as Arc<dyn TransportDelegate>
    }

    pub(crate) fn request_middleware(&self) -> &[Arc<dyn RequestMiddleware>] {
        &self.inner.request_middleware
    }

    pub(crate) fn response_middleware(&self) -> &[Arc<dyn ResponseMiddleware>] {
        &self.inner.response_middleware
    }

    /// Merge the configured default headers into the descriptor; headers
    /// already present on the descriptor win.
    pub(crate) fn apply_default_headers(&self, descriptor: RequestDescriptor) -> RequestDescriptor {
        let mut descriptor = descriptor;
        for (name, value) in &self.inner.config.default_headers {
            if !descriptor.headers().contains_key(name.as_str()) {
                descriptor = descriptor.with_header(name, value);
            }
        }
        descriptor
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

/// Builder for [`Client`]. Middleware lists are configuration: register them
/// here, before any request is issued.
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<dyn CacheProvider>>,
    request_middleware: Vec<Arc<dyn RequestMiddleware>>,
    response_middleware: Vec<Arc<dyn ResponseMiddleware>>,
}

impl ClientBuilder {
    /// Set the client configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom transport instead of the reqwest-backed default.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom cache provider instead of the in-memory default.
    pub fn cache(mut self, cache: Arc<dyn CacheProvider>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Append a request-stage middleware. Applied in registration order.
    pub fn request_middleware(mut self, middleware: impl RequestMiddleware + 'static) -> Self {
        self.request_middleware.push(Arc::new(middleware));
        self
    }

    /// Append a response-stage middleware. Applied in registration order.
    pub fn response_middleware(mut self, middleware: impl ResponseMiddleware + 'static) -> Self {
        self.response_middleware.push(Arc::new(middleware));
        self
    }

    /// Build the client.
    pub fn build(self) -> Client {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new(&self.config)));
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCacheProvider::new()));
        let registry = Arc::new(TaskRegistry::new());
        let delegate = Arc::new(Dispatcher {
            registry: Arc::clone(&registry),
        });

        Client {
            inner: Arc::new(ClientInner {
                config: self.config,
                transport,
                cache,
                registry,
                delegate,
                request_middleware: self.request_middleware,
                response_middleware: self.response_middleware,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clients_are_independent() {
        let a = Client::default();
        let b = Client::default();
        assert_eq!(a.in_flight(), 0);
        assert_eq!(b.in_flight(), 0);
        assert!(!Arc::ptr_eq(&a.inner, &b.inner));
    }

    #[test]
    fn default_headers_do_not_override_descriptor_headers() {
        let client = Client::new(
            ClientConfig::builder()
                .default_header("accept", "application/json")
                .default_header("x-app", "courier")
                .build(),
        );
        let descriptor = RequestDescriptor::builder(Method::GET, "https://example.com/")
            .header("accept", "text/plain")
            .build()
            .unwrap();

        let merged = client.apply_default_headers(descriptor);
        assert_eq!(merged.headers().get("accept").unwrap(), "text/plain");
        assert_eq!(merged.headers().get("x-app").unwrap(), "courier");
    }
}
