//! In-memory transport for exercising the client without a network.
//!
//! Responses are scripted per dispatch and delivered through the same
//! delegate path as the real transport, so the registry, gating, and
//! cancellation machinery is exercised end to end.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::TransportError;
use crate::registry::TaskId;
use crate::transport::{PreparedRequest, Transport, TransportDelegate};

/// One scripted exchange.
pub struct MockExchange {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    delay: Option<Duration>,
    error: Option<TransportError>,
}

impl MockExchange {
    /// Script a response with the given status.
    pub fn status(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).expect("valid status code"),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            delay: None,
            error: None,
        }
    }

    /// Script a `200 OK` response.
    pub fn ok() -> Self {
        Self::status(200)
    }

    /// Script a transport-level failure.
    pub fn failure(error: TransportError) -> Self {
        let mut exchange = Self::status(200);
        exchange.error = Some(error);
        exchange
    }

    /// Set the response body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON response body.
    pub fn json(self, value: &serde_json::Value) -> Self {
        self.header("content-type", "application/json")
            .body(value.to_string())
    }

    /// Add a response header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Delay delivery, leaving a window for cancellation.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

struct MockHandle {
    pending: Option<(MockExchange, Arc<dyn TransportDelegate>)>,
    cancelled: Arc<AtomicBool>,
    cancel: Arc<Notify>,
}

/// Scripted transport. Exchanges are consumed in FIFO order, one per
/// dispatch; unscripted dispatches get an empty `200 OK`.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockExchange>>,
    started: AtomicUsize,
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<TaskId, MockHandle>>>,
    requests: Mutex<Vec<PreparedRequest>>,
}

impl MockTransport {
    /// Create a transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scripted exchange.
    pub fn enqueue(&self, exchange: MockExchange) {
        self.script.lock().push_back(exchange);
    }

    /// How many tasks have been started.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// The prepared requests seen so far, in dispatch order.
    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().clone()
    }

    fn deliver(id: TaskId, exchange: MockExchange, delegate: &Arc<dyn TransportDelegate>) {
        if let Some(error) = exchange.error {
            delegate.on_complete(id, Some(error));
            return;
        }

        delegate.on_headers(id, exchange.status, exchange.headers);
        if !exchange.body.is_empty() {
            // split the body so accumulation across chunks is exercised
            let mid = exchange.body.len() / 2;
            if mid > 0 {
                delegate.on_data(id, exchange.body.slice(..mid));
            }
            delegate.on_data(id, exchange.body.slice(mid..));
        }
        delegate.on_complete(id, None);
    }
}

impl Transport for MockTransport {
    fn start(&self, request: PreparedRequest, delegate: Arc<dyn TransportDelegate>) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.started.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);

        let exchange = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(MockExchange::ok);

        self.tasks.lock().insert(
            id,
            MockHandle {
                pending: Some((exchange, delegate)),
                cancelled: Arc::new(AtomicBool::new(false)),
                cancel: Arc::new(Notify::new()),
            },
        );
        id
    }

    fn resume(&self, id: TaskId) {
        let taken = {
            let mut tasks = self.tasks.lock();
            let Some(handle) = tasks.get_mut(&id) else {
                return;
            };
            handle.pending.take().map(|(exchange, delegate)| {
                (
                    exchange,
                    delegate,
                    Arc::clone(&handle.cancelled),
                    Arc::clone(&handle.cancel),
                )
            })
        };
        let Some((exchange, delegate, cancelled, cancel)) = taken else {
            return;
        };

        if cancelled.load(Ordering::SeqCst) {
            self.tasks.lock().remove(&id);
            delegate.on_complete(id, Some(TransportError::Cancelled));
            return;
        }

        let tasks = Arc::clone(&self.tasks);
        tokio::spawn(async move {
            if let Some(delay) = exchange.delay {
                tokio::select! {
                    _ = cancel.notified() => {
                        tasks.lock().remove(&id);
                        delegate.on_complete(id, Some(TransportError::Cancelled));
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if cancelled.load(Ordering::SeqCst) {
                tasks.lock().remove(&id);
                delegate.on_complete(id, Some(TransportError::Cancelled));
                return;
            }

            tasks.lock().remove(&id);
            Self::deliver(id, exchange, &delegate);
        });
    }

    fn cancel(&self, id: TaskId) {
        let signals = {
            let tasks = self.tasks.lock();
            tasks
                .get(&id)
                .map(|handle| (Arc::clone(&handle.cancelled), Arc::clone(&handle.cancel)))
        };
        if let Some((cancelled, cancel)) = signals {
            cancelled.store(true, Ordering::SeqCst);
            cancel.notify_one();
        }
    }

    fn cancel_all(&self) {
        let signals: Vec<_> = {
            let tasks = self.tasks.lock();
            tasks
                .values()
                .map(|handle| (Arc::clone(&handle.cancelled), Arc::clone(&handle.cancel)))
                .collect()
        };
        for (cancelled, cancel) in signals {
            cancelled.store(true, Ordering::SeqCst);
            cancel.notify_one();
        }
    }
}
