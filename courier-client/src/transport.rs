//! Transport abstraction and the reqwest-backed implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use futures::StreamExt;
use http::{HeaderMap, Method, StatusCode};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::registry::TaskId;

/// A descriptor finalized for the wire: body encoded, content type set.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Encoded body, if any.
    pub body: Option<Bytes>,
}

/// Receives transport callbacks, keyed by task id.
///
/// Callbacks for one task arrive in order: `on_headers` before any `on_data`,
/// chunks in arrival order, then `on_complete` exactly once. Callbacks for
/// different tasks may arrive concurrently on arbitrary execution contexts.
pub trait TransportDelegate: Send + Sync {
    /// Response status and headers became known.
    fn on_headers(&self, id: TaskId, status: StatusCode, headers: HeaderMap);

    /// A chunk of the response body arrived.
    fn on_data(&self, id: TaskId, chunk: Bytes);

    /// The task finished, successfully or not. Fires exactly once per task,
    /// including after [`Transport::cancel`].
    fn on_complete(&self, id: TaskId, error: Option<TransportError>);
}

/// Starts, resumes, and cancels transport-level tasks.
///
/// `start` allocates a task without performing I/O so the caller can record
/// the returned id before the first callback can possibly fire; `resume`
/// begins I/O. Cancellation is cooperative: the task still delivers its
/// final `on_complete`.
pub trait Transport: Send + Sync {
    /// Allocate a task for `request`, delivering callbacks to `delegate`.
    fn start(&self, request: PreparedRequest, delegate: Arc<dyn TransportDelegate>) -> TaskId;

    /// Begin I/O for a previously started task.
    fn resume(&self, id: TaskId);

    /// Request cooperative cancellation of a task.
    fn cancel(&self, id: TaskId);

    /// Request cancellation of every outstanding task.
    fn cancel_all(&self);
}

struct TaskHandle {
    pending: Option<(PreparedRequest, Arc<dyn TransportDelegate>)>,
    cancelled: Arc<AtomicBool>,
    cancel: Arc<Notify>,
}

/// HTTP transport backed by a pooled reqwest client, streaming response
/// bodies chunk by chunk. One tokio task per request serializes that
/// request's callbacks; different requests proceed fully in parallel.
pub struct HttpTransport {
    client: reqwest::Client,
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<TaskId, TaskHandle>>>,
}

impl HttpTransport {
    /// Create a transport from the client configuration.
    pub fn new(config: &ClientConfig) -> Self {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent);

        if config.gzip {
            builder = builder.gzip(true);
        }
        if config.brotli {
            builder = builder.brotli(true);
        }
        if config.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        let client = builder.build().expect("failed to build HTTP engine");

        Self {
            client,
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn run(
        client: reqwest::Client,
        id: TaskId,
        request: PreparedRequest,
        delegate: Arc<dyn TransportDelegate>,
    ) -> Result<(), TransportError> {
        let mut builder = client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = client.execute(builder.build()?).await?;
        delegate.on_headers(id, response.status(), response.headers().clone());

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            delegate.on_data(id, chunk?);
        }

        Ok(())
    }
}

impl Transport for HttpTransport {
    fn start(&self, request: PreparedRequest, delegate: Arc<dyn TransportDelegate>) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.lock().insert(
            id,
            TaskHandle {
                pending: Some((request, delegate)),
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
            handle
                .pending
                .take()
                .map(|(request, delegate)| {
                    (
                        request,
                        delegate,
                        Arc::clone(&handle.cancelled),
                        Arc::clone(&handle.cancel),
                    )
                })
        };
        let Some((request, delegate, cancelled, cancel)) = taken else {
            return;
        };

        // cancelled before I/O ever began
        if cancelled.load(Ordering::SeqCst) {
            self.tasks.lock().remove(&id);
            delegate.on_complete(id, Some(TransportError::Cancelled));
            return;
        }

        let client = self.client.clone();
        let tasks = Arc::clone(&self.tasks);
        tokio::spawn(async move {
            let error = tokio::select! {
                _ = cancel.notified() => {
                    debug!(task_id = id, "transport task cancelled");
                    Some(TransportError::Cancelled)
                }
                result = Self::run(client, id, request, Arc::clone(&delegate)) => result.err(),
            };
            tasks.lock().remove(&id);
            delegate.on_complete(id, error);
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

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDelegate;

    impl TransportDelegate for NullDelegate {
        fn on_headers(&self, _id: TaskId, _status: StatusCode, _headers: HeaderMap) {}
        fn on_data(&self, _id: TaskId, _chunk: Bytes) {}
        fn on_complete(&self, _id: TaskId, _error: Option<TransportError>) {}
    }

    #[test]
    fn start_allocates_monotonic_ids() {
        let transport = HttpTransport::new(&ClientConfig::default());
        let request = PreparedRequest {
            method: Method::GET,
            url: Url::parse("https://example.com/").unwrap(),
            headers: HeaderMap::new(),
            body: None,
        };

        let a = transport.start(request.clone(), Arc::new(NullDelegate));
        let b = transport.start(request, Arc::new(NullDelegate));
        assert_ne!(a, b);
    }
}
