//! Event-driven upload transport
//!
//! Fire-and-forget uploads: `upload` returns as soon as the request is handed to
//! the runtime, and the outcome is only observable through the transport's
//! [`UploadSession`].

use crate::config::UploadConfig;
use crate::error::Result;
use crate::progress::ProgressTracker;
use crate::request::{AbortHandle, UploadEvent, UploadHandle, UploadListener, UploadRequest};
use crate::session::{TransportKind, UploadSession, UploadStatus};
use reqwest::Client;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// Writes the terminal outcome of one attempt into the session
struct CompletionSink {
    session: UploadSession,
    attempt: Uuid,
}

impl UploadListener for CompletionSink {
    fn on_event(&self, event: &UploadEvent) {
        let label = self.session.kind().label();

        let (status, message) = match event {
            UploadEvent::Load { status: code } if (200..300).contains(code) => (
                UploadStatus::Completed,
                format!("{} completed successfully! Status: {}", label, code),
            ),
            UploadEvent::Load { status: code } => (
                UploadStatus::Failed,
                format!("{} failed with status: {}", label, code),
            ),
            UploadEvent::Error { message } => {
                tracing::error!("{} upload error: {}", label, message);
                (UploadStatus::Failed, format!("{} error occurred", label))
            }
            UploadEvent::Abort => (UploadStatus::Aborted, format!("{} aborted", label)),
            _ => return,
        };

        if self.session.finish(self.attempt, status, message) {
            tracing::info!("{} upload {}", label, status);
        }
    }
}

/// Callback-driven upload transport
pub struct EventTransport {
    client: Client,
    config: UploadConfig,
    session: UploadSession,
    observers: Vec<Arc<dyn UploadListener>>,
}

impl EventTransport {
    /// Create a transport with its own `Ready` session
    pub fn new(client: Client, config: UploadConfig) -> Self {
        Self {
            client,
            config,
            session: UploadSession::new(TransportKind::EventDriven),
            observers: Vec::new(),
        }
    }

    /// Attach a listener to every future attempt, after the session sinks
    pub fn with_observer(mut self, observer: Arc<dyn UploadListener>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Read model for the display layer
    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    /// Start an upload to `endpoint`.
    ///
    /// Only fails when an attempt is already in flight; every transport outcome
    /// ends up in the session instead.
    pub fn upload(&self, endpoint: Url) -> Result<UploadHandle> {
        self.upload_with_abort(endpoint, AbortHandle::new())
    }

    /// Start an upload that can be cancelled through `abort`
    pub fn upload_with_abort(&self, endpoint: Url, abort: AbortHandle) -> Result<UploadHandle> {
        let attempt = self.session.begin()?;
        tracing::info!("{} upload to {} (attempt {})", TransportKind::EventDriven, endpoint, attempt);

        let payload = self.config.payload_generator().generate();

        let mut request = UploadRequest::new(self.client.clone(), self.config.chunk_size)
            .with_abort(abort);
        request.add_listener(Arc::new(ProgressTracker::new(self.session.clone(), attempt)));
        request.add_listener(Arc::new(CompletionSink {
            session: self.session.clone(),
            attempt,
        }));
        for observer in &self.observers {
            request.add_listener(observer.clone());
        }

        Ok(request.send(endpoint, payload))
    }
}
