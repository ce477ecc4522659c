//! Awaitable upload transport
//!
//! Presents an upload as a single future resolving to the response status. The
//! awaitable HTTP path offers no upload-progress telemetry, so each call builds
//! a one-shot event-driven [`UploadRequest`] and uses its event stream as the
//! only progress source: progress events feed the session, and the first
//! terminal event settles the future exactly once.

use crate::config::UploadConfig;
use crate::error::{Result, UploadError};
use crate::progress::ProgressTracker;
use crate::request::{AbortHandle, UploadEvent, UploadListener, UploadRequest};
use crate::session::{TransportKind, UploadSession, UploadStatus};
use reqwest::Client;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use url::Url;
use uuid::Uuid;

/// Successful upload outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadResponse {
    /// HTTP status code, always in `[200, 300)`
    pub status: u16,
}

/// Resolves the pending future on the first terminal event
struct Settle {
    tx: Mutex<Option<oneshot::Sender<Result<UploadResponse>>>>,
    session: UploadSession,
    attempt: Uuid,
}

impl Settle {
    fn new(
        tx: oneshot::Sender<Result<UploadResponse>>,
        session: UploadSession,
        attempt: Uuid,
    ) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            session,
            attempt,
        }
    }
}

impl UploadListener for Settle {
    fn on_event(&self, event: &UploadEvent) {
        let outcome = match event {
            UploadEvent::Load { status } if (200..300).contains(status) => {
                Ok(UploadResponse { status: *status })
            }
            UploadEvent::Load { status } => Err(UploadError::HttpStatus(*status)),
            UploadEvent::Error { message } => Err(UploadError::network(message)),
            UploadEvent::Abort => Err(UploadError::Aborted),
            _ => return,
        };

        let tx = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(tx) = tx else {
            return;
        };

        // Nobody is awaiting anymore, so settle the session here
        if let Err(unsent) = tx.send(outcome) {
            let (status, message) = settlement(&unsent);
            self.session.finish(self.attempt, status, message);
        }
    }
}

/// Async/await-style upload transport
pub struct PromiseTransport {
    client: Client,
    config: UploadConfig,
    session: UploadSession,
    observers: Vec<Arc<dyn UploadListener>>,
}

impl PromiseTransport {
    /// Create a transport with its own `Ready` session
    pub fn new(client: Client, config: UploadConfig) -> Self {
        Self {
            client,
            config,
            session: UploadSession::new(TransportKind::Promise),
            observers: Vec::new(),
        }
    }

    /// Attach a listener to the event stream of every future attempt
    pub fn with_observer(mut self, observer: Arc<dyn UploadListener>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Read model for the display layer
    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    /// Upload to `endpoint` and wait for the outcome.
    ///
    /// Resolves with the status code for `2xx` responses. Rejects with
    /// `HttpStatus` for any other code, `Network` for transport failures and
    /// `Aborted` for cancelled attempts; the session ends `Failed` on every
    /// rejection.
    pub async fn upload(&self, endpoint: Url) -> Result<UploadResponse> {
        self.upload_with_abort(endpoint, AbortHandle::new()).await
    }

    /// Same as [`upload`](Self::upload), cancellable through `abort`
    pub async fn upload_with_abort(
        &self,
        endpoint: Url,
        abort: AbortHandle,
    ) -> Result<UploadResponse> {
        let attempt = self.session.begin()?;
        tracing::info!("{} upload to {} (attempt {})", TransportKind::Promise, endpoint, attempt);

        let payload = self.config.payload_generator().generate();
        let (tx, rx) = oneshot::channel();

        // Dropping this future before it settles cancels the request
        let guard = abort.drop_guard();

        let mut request = UploadRequest::new(self.client.clone(), self.config.chunk_size)
            .with_abort(abort);
        request.add_listener(Arc::new(ProgressTracker::new(self.session.clone(), attempt)));
        request.add_listener(Arc::new(Settle::new(tx, self.session.clone(), attempt)));
        for observer in &self.observers {
            request.add_listener(observer.clone());
        }

        let _handle = request.send(endpoint, payload);

        let result = match rx.await {
            Ok(result) => result,
            Err(_) => Err(UploadError::network("upload ended without a terminal event")),
        };
        guard.disarm();

        let (status, message) = settlement(&result);
        self.session.finish(attempt, status, message);

        let label = TransportKind::Promise.label();
        match &result {
            Ok(response) => {
                tracing::info!("{} upload completed with status {}", label, response.status)
            }
            Err(e @ UploadError::Network { detail }) => {
                tracing::error!("{} upload error: {} ({})", label, e, detail)
            }
            Err(e) => tracing::error!("{} upload error: {}", label, e),
        }

        result
    }
}

/// Terminal session state for a settled attempt
fn settlement(result: &Result<UploadResponse>) -> (UploadStatus, String) {
    let label = TransportKind::Promise.label();
    match result {
        Ok(response) => (
            UploadStatus::Completed,
            format!("{} completed successfully! Status: {}", label, response.status),
        ),
        Err(e) => (UploadStatus::Failed, format!("{} error: {}", label, e)),
    }
}
