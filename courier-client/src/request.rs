//! Per-call request state machine: cache lookup, middleware application,
//! transport dispatch, gated parsing, and exactly-once completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::adapter::RequestAdapter;
use crate::client::Client;
use crate::descriptor::{CachePolicy, RequestDescriptor};
use crate::error::{ClientError, TransportError, ValidationFailure};
use crate::middleware::RequestStage;
use crate::parser::{BytesParser, JsonParser, JsonTreeParser, ResponseParser, TextParser};
use crate::registry::TaskId;
use crate::response::{Exchange, Response};
use crate::validate::{ResponseValidator, StatusValidator};

/// Shared per-request state, mutated by transport callbacks and read by the
/// parse pipeline. Callbacks for one request arrive serialized; different
/// requests proceed fully in parallel.
pub(crate) struct RequestState {
    descriptor: Mutex<RequestDescriptor>,
    task_id: std::sync::OnceLock<TaskId>,
    status: Mutex<Option<StatusCode>>,
    headers: Mutex<HeaderMap>,
    buffer: Mutex<BytesMut>,
    body: Mutex<Option<Bytes>>,
    transport_error: Mutex<Option<TransportError>>,
    cancelled: AtomicBool,
    delivered: AtomicBool,
    finished_tx: watch::Sender<bool>,
    finished_rx: watch::Receiver<bool>,
}

impl RequestState {
    pub(crate) fn new(descriptor: RequestDescriptor) -> Self {
        let (finished_tx, finished_rx) = watch::channel(false);
        Self {
            descriptor: Mutex::new(descriptor),
            task_id: std::sync::OnceLock::new(),
            status: Mutex::new(None),
            headers: Mutex::new(HeaderMap::new()),
            buffer: Mutex::new(BytesMut::new()),
            body: Mutex::new(None),
            transport_error: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            delivered: AtomicBool::new(false),
            finished_tx,
            finished_rx,
        }
    }

    /// Response metadata became known.
    pub(crate) fn on_headers(&self, status: StatusCode, headers: HeaderMap) {
        *self.status.lock() = Some(status);
        *self.headers.lock() = headers;
    }

    /// A body chunk arrived; chunks append in delivery order.
    pub(crate) fn on_data(&self, chunk: Bytes) {
        self.buffer.lock().extend_from_slice(&chunk);
    }

    /// The transport finished. Freezes the accumulated body, records the
    /// terminal error candidate, and releases the suspended parse pipeline.
    pub(crate) fn on_complete(&self, error: Option<TransportError>) {
        if let Some(error) = error {
            *self.transport_error.lock() = Some(error);
        }
        let buffer = std::mem::take(&mut *self.buffer.lock());
        if !buffer.is_empty() {
            *self.body.lock() = Some(buffer.freeze());
        }
        let _ = self.finished_tx.send(true);
    }

    /// Set the cooperative cancellation flag.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn task_id(&self) -> Option<TaskId> {
        self.task_id.get().copied()
    }
}

enum RequestInner {
    Ready(Arc<RequestState>),
    /// Descriptor construction failed; the error is delivered as the single
    /// completion.
    Invalid(ClientError),
}

/// One logical HTTP call.
///
/// Configure it with adapters and validators, then consume it with one of
/// the response methods. Each request delivers exactly one terminal
/// [`Response`], under every interleaving of cancellation and completion.
pub struct Request {
    client: Client,
    inner: RequestInner,
    adapters: Vec<Arc<dyn RequestAdapter>>,
    validators: Vec<Arc<dyn ResponseValidator>>,
}

impl Request {
    pub(crate) fn new(client: Client, descriptor: RequestDescriptor) -> Self {
        Self {
            client,
            inner: RequestInner::Ready(Arc::new(RequestState::new(descriptor))),
            adapters: Vec::new(),
            validators: Vec::new(),
        }
    }

    pub(crate) fn invalid(client: Client, error: ClientError) -> Self {
        Self {
            client,
            inner: RequestInner::Invalid(error),
            adapters: Vec::new(),
            validators: Vec::new(),
        }
    }

    /// Append an adapter, applied to the descriptor in registration order
    /// before dispatch.
    pub fn with_adapter(mut self, adapter: impl RequestAdapter + 'static) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    /// Append the default status validator (2xx passes).
    pub fn validate(self) -> Self {
        self.validate_with(StatusValidator::default())
    }

    /// Append a validation predicate, evaluated once status and headers are
    /// known and before parsing begins.
    pub fn validate_with(mut self, validator: impl ResponseValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// A cloneable handle for cancelling this request from elsewhere.
    pub fn handle(&self) -> RequestHandle {
        RequestHandle {
            client: self.client.clone(),
            state: match &self.inner {
                RequestInner::Ready(state) => Some(Arc::clone(state)),
                RequestInner::Invalid(_) => None,
            },
        }
    }

    /// Cancel this request. Sets the cancellation flag and asks the
    /// transport to cancel the outstanding task; the single terminal
    /// completion still arrives.
    pub fn cancel(&self) {
        self.handle().cancel();
    }

    /// Resolve with the raw response bytes.
    pub async fn bytes(self) -> Response<Bytes> {
        self.parsed(BytesParser).await
    }

    /// Resolve with the response body as UTF-8 text.
    pub async fn text(self) -> Response<String> {
        self.parsed(TextParser).await
    }

    /// Resolve with the response body as a dynamic JSON tree.
    pub async fn json_value(self) -> Response<serde_json::Value> {
        self.parsed(JsonTreeParser).await
    }

    /// Resolve with the response body decoded into `T`.
    pub async fn decoded<T>(self) -> Response<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.parsed(JsonParser::new()).await
    }

    /// Like [`Request::decoded`], but on validation failure the error-shaped
    /// body is also decoded and surfaced inside the validation error, where
    /// [`ValidationFailure::error_body_as`] projects it onto a concrete type.
    pub async fn decoded_with_error_body<T>(self) -> Response<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.run(JsonParser::new(), true).await
    }

    /// Resolve through an arbitrary parser.
    pub async fn parsed<P: ResponseParser>(self, parser: P) -> Response<P::Output> {
        self.run(parser, false).await
    }

    async fn run<P: ResponseParser>(
        self,
        parser: P,
        decode_error_body: bool,
    ) -> Response<P::Output> {
        let Request {
            client,
            inner,
            adapters,
            validators,
        } = self;

        let state = match inner {
            RequestInner::Invalid(error) => return Response::failed(None, error),
            RequestInner::Ready(state) => state,
        };

        // default headers merge first (descriptor wins), then adapters
        // rewrite the descriptor once, in registration order
        let descriptor = {
            let mut descriptor = client.apply_default_headers(state.descriptor.lock().clone());
            for adapter in &adapters {
                descriptor = adapter.adapt(descriptor);
            }
            *state.descriptor.lock() = descriptor.clone();
            descriptor
        };

        // cache lookup; hits skip the transport and both middleware stages
        if descriptor.cache_policy() == CachePolicy::PreferCache
            && let Some(item) = client.cache_provider().get(&descriptor.cache_key()).await
            && !item.is_empty()
        {
            debug!(url = %descriptor.url(), "serving request from cache");
            let exchange = Exchange {
                descriptor,
                status: None,
                headers: HeaderMap::new(),
                body: item.bytes.clone(),
                error: None,
            };
            return conclude(
                &client,
                &state,
                &parser,
                &validators,
                decode_error_body,
                exchange,
                Some(item),
            )
            .await;
        }

        // request middleware, FIFO; the first short-circuit stops the chain
        let mut current = descriptor;
        let mut short_circuit = None;
        for middleware in client.request_middleware() {
            match middleware.process(current).await {
                RequestStage::Continue(next) => current = next,
                RequestStage::ShortCircuit(next, outcome) => {
                    current = next;
                    short_circuit = Some(outcome);
                    break;
                }
            }
        }
        *state.descriptor.lock() = current.clone();

        let mut ran_transport = false;
        match short_circuit {
            Some(Err(error)) => {
                let exchange = Exchange {
                    descriptor: current,
                    status: None,
                    headers: HeaderMap::new(),
                    body: None,
                    error: Some(ClientError::Middleware(error)),
                };
                return conclude(
                    &client,
                    &state,
                    &parser,
                    &validators,
                    decode_error_body,
                    exchange,
                    None,
                )
                .await;
            }
            Some(Ok(raw)) => {
                debug!(url = %current.url(), status = %raw.status, "request short-circuited by middleware");
                state.on_headers(raw.status, raw.headers);
                if !raw.body.is_empty() {
                    state.on_data(raw.body);
                }
                state.on_complete(None);
            }
            None => {
                let prepared = match current.prepare() {
                    Ok(prepared) => prepared,
                    Err(error) => {
                        let exchange = Exchange {
                            descriptor: current,
                            status: None,
                            headers: HeaderMap::new(),
                            body: None,
                            error: Some(error),
                        };
                        return conclude(
                            &client,
                            &state,
                            &parser,
                            &validators,
                            decode_error_body,
                            exchange,
                            None,
                        )
                        .await;
                    }
                };

                let id = client.transport().start(prepared, client.delegate());
                let _ = state.task_id.set(id);
                if !client.registry().register(id, Arc::clone(&state)) {
                    client.transport().cancel(id);
                    let exchange = Exchange {
                        descriptor: current,
                        status: None,
                        headers: HeaderMap::new(),
                        body: None,
                        error: Some(ClientError::Transport(TransportError::Protocol(
                            "duplicate task id".to_string(),
                        ))),
                    };
                    return conclude(
                        &client,
                        &state,
                        &parser,
                        &validators,
                        decode_error_body,
                        exchange,
                        None,
                    )
                    .await;
                }

                debug!(task_id = id, method = %current.method(), url = %current.url(), "dispatching request");

                // cancel() may have landed before the task id existed
                if state.is_cancelled() {
                    client.transport().cancel(id);
                }
                client.transport().resume(id);
                ran_transport = true;
            }
        }

        // the parse pipeline is gated until the transport reports completion
        let mut finished = state.finished_rx.clone();
        let _ = finished.wait_for(|done| *done).await;

        let mut exchange = Exchange {
            descriptor: state.descriptor.lock().clone(),
            status: *state.status.lock(),
            headers: state.headers.lock().clone(),
            body: state.body.lock().clone(),
            error: state.transport_error.lock().take().map(ClientError::Transport),
        };

        // response middleware runs on every transport outcome; synthesized
        // short-circuit responses skip it
        if ran_transport {
            for middleware in client.response_middleware() {
                exchange = middleware.process(exchange).await;
            }
        }

        conclude(
            &client,
            &state,
            &parser,
            &validators,
            decode_error_body,
            exchange,
            None,
        )
        .await
    }
}

/// The parse pipeline: cancellation, then the terminal error candidate, then
/// validation, then the parser, with a write-through to the cache on
/// success. Delivers the single terminal response.
async fn conclude<P: ResponseParser>(
    client: &Client,
    state: &RequestState,
    parser: &P,
    validators: &[Arc<dyn ResponseValidator>],
    decode_error_body: bool,
    mut exchange: Exchange,
    cached: Option<crate::cache::CacheItem>,
) -> Response<P::Output> {
    let from_cache = cached.is_some();

    let failure = if state.is_cancelled() {
        Some(ClientError::Cancelled)
    } else if let Some(error) = exchange.error.take() {
        Some(error)
    } else if !validators
        .iter()
        .all(|v| v.validate(exchange.status, &exchange.headers, exchange.body.as_ref()))
    {
        let error_body = if decode_error_body {
            exchange
                .body
                .as_ref()
                .and_then(|bytes| serde_json::from_slice(bytes).ok())
        } else {
            None
        };
        Some(ClientError::Validation(ValidationFailure {
            status: exchange.status.map(|s| s.as_u16()),
            error_body,
        }))
    } else {
        None
    };

    let result = match failure {
        Some(error) => Err(error),
        None => {
            let parsed = match &cached {
                Some(item) => parser.from_cached(item),
                None => parser.parse(exchange.body.as_ref()),
            };
            match parsed {
                Ok(value) => {
                    if !from_cache {
                        // write-through with merge semantics
                        client
                            .cache_provider()
                            .set(
                                &exchange.descriptor.cache_key(),
                                exchange.body.clone(),
                                parser.to_cached(&value),
                            )
                            .await;
                    }
                    Ok(value)
                }
                Err(error) => Err(ClientError::from(error)),
            }
        }
    };

    if state.delivered.swap(true, Ordering::SeqCst) {
        warn!("request completion delivered more than once");
    }

    Response {
        result,
        descriptor: Some(exchange.descriptor),
        status: exchange.status,
        headers: exchange.headers,
        body: exchange.body,
        from_cache,
    }
}

/// Cloneable handle for cancelling an in-flight request.
#[derive(Clone)]
pub struct RequestHandle {
    client: Client,
    state: Option<Arc<RequestState>>,
}

impl RequestHandle {
    /// Cancel the request. Safe to call at any point; a no-op once the
    /// request is terminal.
    pub fn cancel(&self) {
        if let Some(state) = &self.state {
            state.cancel();
            if let Some(id) = state.task_id() {
                self.client.transport().cancel(id);
            }
        }
    }

    /// The transport task id, once the request has dispatched.
    pub fn task_id(&self) -> Option<TaskId> {
        self.state.as_ref().and_then(|state| state.task_id())
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn state() -> RequestState {
        RequestState::new(
            RequestDescriptor::builder(Method::GET, "https://example.com/")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn data_chunks_append_in_order() {
        let state = state();
        state.on_data(Bytes::from_static(b"hello "));
        state.on_data(Bytes::from_static(b"world"));
        state.on_complete(None);

        assert_eq!(
            state.body.lock().clone().unwrap(),
            Bytes::from_static(b"hello world")
        );
    }

    #[test]
    fn completion_releases_the_gate() {
        let state = state();
        assert!(!*state.finished_rx.borrow());
        state.on_complete(None);
        assert!(*state.finished_rx.borrow());
    }

    #[test]
    fn completion_records_the_error_candidate() {
        let state = state();
        state.on_complete(Some(TransportError::Timeout));
        assert!(matches!(
            *state.transport_error.lock(),
            Some(TransportError::Timeout)
        ));
        assert!(state.body.lock().is_none());
    }

    #[test]
    fn cancellation_flag_is_sticky() {
        let state = state();
        assert!(!state.is_cancelled());
        state.cancel();
        state.cancel();
        assert!(state.is_cancelled());
    }
}
