//! Event-driven upload request primitive
//!
//! `UploadRequest` is the low-level, callback-based HTTP primitive both transports
//! build on. Listeners are attached before the request is sent. On a
//! current-thread runtime they receive every [`UploadEvent`] in this order:
//!
//! - one `LoadStart` once the request is dispatched,
//! - zero or more `Progress` events with non-decreasing `loaded` counts,
//! - exactly one terminal event: `Load`, `Error` or `Abort`.
//!
//! The request body is a single-part multipart form streamed out of the in-memory
//! payload in fixed-size slices. Each slice handed to the connection produces one
//! `Progress` event.
//!
//! `Progress` is emitted from the connection task and the terminal event from the
//! request task. On a multi-thread runtime an external abort may land while a
//! `Progress` emission is still running on another worker, so that event can be
//! observed after `Abort`.

use crate::error::{Result, UploadError};
use crate::payload::{Payload, PAYLOAD_FIELD_NAME};
use bytes::Bytes;
use futures_util::Stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use url::Url;

/// Default body slice size between progress events (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Notification emitted by an [`UploadRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// Request dispatched; `total` is the payload size when known
    LoadStart { total: Option<u64> },

    /// Cumulative payload bytes handed to the connection.
    ///
    /// Both counts cover the payload only. Multipart boundaries and part headers
    /// are excluded, so `total` is smaller than the request content length.
    Progress { loaded: u64, total: Option<u64> },

    /// Response fully received, whatever its status code
    Load { status: u16 },

    /// Hard network failure (DNS, TLS, refused or dropped connection)
    Error { message: String },

    /// Request cancelled through its [`AbortHandle`]
    Abort,
}

impl UploadEvent {
    /// Load, Error or Abort
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::Error { .. } | Self::Abort)
    }

    /// Event name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadStart { .. } => "loadstart",
            Self::Progress { .. } => "progress",
            Self::Load { .. } => "load",
            Self::Error { .. } => "error",
            Self::Abort => "abort",
        }
    }
}

/// Sink for upload events
///
/// Listeners run inline on the task driving the request and must not block.
pub trait UploadListener: Send + Sync {
    fn on_event(&self, event: &UploadEvent);
}

impl<F> UploadListener for F
where
    F: Fn(&UploadEvent) + Send + Sync,
{
    fn on_event(&self, event: &UploadEvent) {
        self(event)
    }
}

#[derive(Clone)]
struct Listeners(Arc<Vec<Arc<dyn UploadListener>>>);

impl Listeners {
    fn emit(&self, event: &UploadEvent) {
        for listener in self.0.iter() {
            listener.on_event(event);
        }
    }
}

/// Cancels an in-flight request from outside
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`abort`](Self::abort) has been called
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }

    /// Guard that aborts when dropped, unless disarmed first
    pub fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}

/// Handle to a request running in the background
pub struct UploadHandle {
    abort: AbortHandle,
    task: JoinHandle<()>,
}

impl UploadHandle {
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Cancel the request; it terminates with an `Abort` event
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Wait until the terminal event has been delivered
    pub async fn finished(self) -> Result<()> {
        self.task.await.map_err(UploadError::from)
    }
}

/// Callback-driven multipart upload request
pub struct UploadRequest {
    client: Client,
    chunk_size: usize,
    listeners: Vec<Arc<dyn UploadListener>>,
    abort: AbortHandle,
}

impl UploadRequest {
    /// Create a request that slices its body into `chunk_size` byte pieces
    pub fn new(client: Client, chunk_size: usize) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(1),
            listeners: Vec::new(),
            abort: AbortHandle::new(),
        }
    }

    /// Attach a listener; listeners are called in registration order
    pub fn add_listener(&mut self, listener: Arc<dyn UploadListener>) {
        self.listeners.push(listener);
    }

    /// Use an externally owned abort handle
    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// POST the payload to `endpoint` in the background.
    ///
    /// Returns immediately; the outcome is only observable through listeners.
    pub fn send(self, endpoint: Url, payload: Payload) -> UploadHandle {
        let listeners = Listeners(Arc::new(self.listeners));
        let abort = self.abort.clone();

        let task = tokio::spawn(dispatch(
            self.client,
            endpoint,
            payload,
            self.chunk_size,
            listeners,
            self.abort,
        ));

        UploadHandle { abort, task }
    }
}

async fn dispatch(
    client: Client,
    endpoint: Url,
    payload: Payload,
    chunk_size: usize,
    listeners: Listeners,
    abort: AbortHandle,
) {
    let terminal = if abort.is_aborted() {
        UploadEvent::Abort
    } else {
        listeners.emit(&UploadEvent::LoadStart {
            total: Some(payload.len() as u64),
        });

        tokio::select! {
            biased;
            _ = abort.aborted() => UploadEvent::Abort,
            result = perform(&client, endpoint, payload, chunk_size, &listeners, &abort) => {
                match result {
                    Ok(status) => UploadEvent::Load { status },
                    // The body stream fails on purpose once aborted
                    Err(_) if abort.is_aborted() => UploadEvent::Abort,
                    Err(e) => UploadEvent::Error { message: describe(&e) },
                }
            }
        }
    };

    tracing::debug!("Upload request ended with {} event", terminal.name());
    listeners.emit(&terminal);
}

async fn perform(
    client: &Client,
    endpoint: Url,
    payload: Payload,
    chunk_size: usize,
    listeners: &Listeners,
    abort: &AbortHandle,
) -> std::result::Result<u16, reqwest::Error> {
    let total = payload.len() as u64;
    let file_name = payload.file_name();
    let content_type = payload.content_type();

    let body = ProgressBody {
        data: payload.into_bytes(),
        sent: 0,
        chunk_size,
        listeners: listeners.clone(),
        abort: abort.clone(),
    };

    // Declaring the part length keeps the request content length computable
    let part = Part::stream_with_length(Body::wrap_stream(body), total)
        .file_name(file_name)
        .mime_str(content_type)?;
    let form = Form::new().part(PAYLOAD_FIELD_NAME, part);

    let response = client.post(endpoint).multipart(form).send().await?;
    let status = response.status().as_u16();

    response.bytes().await?;

    Ok(status)
}

/// Flatten an error and its sources into one line
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Request body that reports each slice as it is handed to the connection
struct ProgressBody {
    data: Bytes,
    sent: usize,
    chunk_size: usize,
    listeners: Listeners,
    abort: AbortHandle,
}

impl Stream for ProgressBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.abort.is_aborted() {
            return Poll::Ready(Some(Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "upload aborted",
            ))));
        }

        let len = self.data.len();
        if self.sent >= len {
            return Poll::Ready(None);
        }

        let end = (self.sent + self.chunk_size).min(len);
        let chunk = self.data.slice(self.sent..end);
        self.sent = end;

        self.listeners.emit(&UploadEvent::Progress {
            loaded: end as u64,
            total: Some(len as u64),
        });

        Poll::Ready(Some(Ok(chunk)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.data.len() - self.sent).div_ceil(self.chunk_size);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::Mutex;

    fn recording() -> (Arc<Mutex<Vec<UploadEvent>>>, Listeners) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let listener: Arc<dyn UploadListener> = Arc::new(move |event: &UploadEvent| {
            sink.lock().unwrap().push(event.clone());
        });
        (events, Listeners(Arc::new(vec![listener])))
    }

    #[test]
    fn test_event_names() {
        assert_eq!(UploadEvent::LoadStart { total: None }.name(), "loadstart");
        assert_eq!(UploadEvent::Progress { loaded: 0, total: None }.name(), "progress");
        assert_eq!(UploadEvent::Load { status: 200 }.name(), "load");
        assert_eq!(UploadEvent::Error { message: String::new() }.name(), "error");
        assert_eq!(UploadEvent::Abort.name(), "abort");
    }

    #[test]
    fn test_terminal_events() {
        assert!(UploadEvent::Load { status: 200 }.is_terminal());
        assert!(UploadEvent::Error { message: "x".into() }.is_terminal());
        assert!(UploadEvent::Abort.is_terminal());
        assert!(!UploadEvent::LoadStart { total: None }.is_terminal());
        assert!(!UploadEvent::Progress { loaded: 1, total: Some(2) }.is_terminal());
    }

    #[tokio::test]
    async fn test_progress_body_slices_and_reports() {
        let (events, listeners) = recording();
        let body = ProgressBody {
            data: Bytes::from(vec![7u8; 10]),
            sent: 0,
            chunk_size: 4,
            listeners,
            abort: AbortHandle::new(),
        };
        assert_eq!(body.size_hint(), (3, Some(3)));

        let chunks: Vec<_> = body.map(|c| c.unwrap().len()).collect().await;
        assert_eq!(chunks, vec![4, 4, 2]);

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                UploadEvent::Progress { loaded: 4, total: Some(10) },
                UploadEvent::Progress { loaded: 8, total: Some(10) },
                UploadEvent::Progress { loaded: 10, total: Some(10) },
            ]
        );
    }

    #[tokio::test]
    async fn test_progress_body_stops_after_abort() {
        let (events, listeners) = recording();
        let abort = AbortHandle::new();
        let mut body = ProgressBody {
            data: Bytes::from(vec![0u8; 10]),
            sent: 0,
            chunk_size: 5,
            listeners,
            abort: abort.clone(),
        };

        assert!(body.next().await.unwrap().is_ok());
        abort.abort();
        let err = body.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_aborted_before_send_emits_only_abort() {
        let mut request = UploadRequest::new(Client::new(), DEFAULT_CHUNK_SIZE);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        request.add_listener(Arc::new(move |event: &UploadEvent| {
            sink.lock().unwrap().push(event.clone());
        }));

        let abort = request.abort_handle();
        abort.abort();

        let endpoint = Url::parse("http://127.0.0.1:9/post").unwrap();
        let handle = request.send(endpoint, Payload::from_bytes(vec![1u8; 16]));
        handle.finished().await.unwrap();

        assert_eq!(*events.lock().unwrap(), vec![UploadEvent::Abort]);
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let request = UploadRequest::new(Client::new(), 0);
        assert_eq!(request.chunk_size, 1);
    }
}
