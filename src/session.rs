//! Per-transport upload session state
//!
//! Each transport owns exactly one `UploadSession`. The session is the read model
//! handed to the display layer: it can be polled with [`UploadSession::snapshot`]
//! or observed with [`UploadSession::subscribe`].

use crate::error::{Result, UploadError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Which transport a session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Callback-driven transport
    EventDriven,
    /// Awaitable adapter over the callback-driven primitive
    Promise,
}

impl TransportKind {
    /// Tag embedded in status messages and log lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::EventDriven => "Event-driven",
            Self::Promise => "Promise",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Upload status state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Ready,
    Starting,
    Uploading,
    Completed,
    Failed,
    Aborted,
}

impl UploadStatus {
    /// Completed, Failed or Aborted
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    /// Starting or Uploading
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Starting | Self::Uploading)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Starting => "starting",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Owning transport
    pub kind: TransportKind,

    /// Identifier of the current (or last) attempt
    pub attempt: Option<Uuid>,

    /// Upload progress in `[0, 100]`
    pub progress_percent: f64,

    /// Current state
    pub status: UploadStatus,

    /// Human-readable status line
    pub message: String,

    /// When the current attempt started
    pub started_at: Option<DateTime<Utc>>,

    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    fn ready(kind: TransportKind) -> Self {
        Self {
            kind,
            attempt: None,
            progress_percent: 0.0,
            status: UploadStatus::Ready,
            message: "Ready".to_string(),
            started_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Time spent on the current attempt so far
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.started_at.map(|start| self.updated_at - start)
    }

    fn accepts(&self, attempt: Uuid) -> bool {
        self.attempt == Some(attempt) && !self.status.is_terminal()
    }
}

impl fmt::Display for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:.2}% - {}",
            self.kind, self.progress_percent, self.message
        )
    }
}

/// Observable upload state owned by one transport
#[derive(Debug, Clone)]
pub struct UploadSession {
    state: Arc<watch::Sender<SessionSnapshot>>,
}

impl UploadSession {
    /// Create a session in the `Ready` state
    pub fn new(kind: TransportKind) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::ready(kind));
        Self {
            state: Arc::new(state),
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.state.borrow().kind
    }

    /// Current state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Observe every mutation
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Start a new attempt, overwriting any previous terminal state.
    ///
    /// Rejected while another attempt is still in flight.
    pub fn begin(&self) -> Result<Uuid> {
        let attempt = Uuid::new_v4();
        let mut in_flight = false;

        self.state.send_if_modified(|s| {
            if s.status.is_in_flight() {
                in_flight = true;
                return false;
            }
            let now = Utc::now();
            s.attempt = Some(attempt);
            s.progress_percent = 0.0;
            s.status = UploadStatus::Starting;
            s.message = format!("Starting {} upload...", s.kind);
            s.started_at = Some(now);
            s.updated_at = now;
            true
        });

        if in_flight {
            return Err(UploadError::AttemptInFlight(self.kind().to_string()));
        }

        tracing::debug!("{} session started attempt {}", self.kind(), attempt);
        Ok(attempt)
    }

    /// Record a progress sample. Progress never decreases within an attempt.
    ///
    /// The first sample moves the attempt from `Starting` to `Uploading`; samples
    /// only exist once data is flowing over an open connection.
    pub fn record_progress(&self, attempt: Uuid, percent: f64, message: String) {
        self.state.send_if_modified(|s| {
            if !s.accepts(attempt) {
                return false;
            }
            s.status = UploadStatus::Uploading;
            s.progress_percent = s.progress_percent.max(percent.clamp(0.0, 100.0));
            s.message = message;
            s.updated_at = Utc::now();
            true
        });
    }

    /// Move the attempt to a terminal state. Only the first terminal write counts.
    ///
    /// Progress is left untouched so an aborted or failed attempt keeps its
    /// last reported value.
    pub fn finish(&self, attempt: Uuid, status: UploadStatus, message: String) -> bool {
        debug_assert!(status.is_terminal());
        self.state.send_if_modified(|s| {
            if !s.accepts(attempt) {
                return false;
            }
            s.status = status;
            s.message = message;
            s.updated_at = Utc::now();
            true
        })
    }
}
