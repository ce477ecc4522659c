//! Progress tracking
//!
//! Maps transport byte counts to a percentage and a status line, and binds that
//! mapping to an [`UploadSession`] as an upload listener.

use crate::request::{UploadEvent, UploadListener};
use crate::session::{TransportKind, UploadSession};
use uuid::Uuid;

/// Byte counts reported by the transport for one progress tick
///
/// Only exists when the total size is known and non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub loaded: u64,
    pub total: u64,
}

impl ProgressSample {
    /// Build a sample, or `None` when the length is not computable
    pub fn new(loaded: u64, total: Option<u64>) -> Option<Self> {
        match total {
            Some(total) if total > 0 => Some(Self { loaded, total }),
            _ => None,
        }
    }

    /// Sample carried by a progress event, if any
    pub fn from_event(event: &UploadEvent) -> Option<Self> {
        match event {
            UploadEvent::Progress { loaded, total } => Self::new(*loaded, *total),
            _ => None,
        }
    }
}

/// Result of tracking one sample
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Percentage in `[0, 100]` when `loaded <= total`
    pub percent: f64,

    /// e.g. `"Promise uploading: 42.00%"`
    pub status_label: String,
}

/// Map a sample to a percentage and status line.
///
/// `loaded <= total` is assumed, not re-checked.
pub fn track(sample: ProgressSample, kind: TransportKind) -> ProgressUpdate {
    let percent = (sample.loaded as f64 / sample.total as f64) * 100.0;
    ProgressUpdate {
        percent,
        status_label: format!("{} uploading: {:.2}%", kind.label(), percent),
    }
}

/// Listener writing progress of one attempt into a session
///
/// Only `Progress` events are handled. The session stays `Starting` until the
/// first sample arrives, so a request that never connects never reports
/// `Uploading`. Terminal events are left to the owning transport.
pub struct ProgressTracker {
    session: UploadSession,
    attempt: Uuid,
}

impl ProgressTracker {
    pub fn new(session: UploadSession, attempt: Uuid) -> Self {
        Self { session, attempt }
    }
}

impl UploadListener for ProgressTracker {
    fn on_event(&self, event: &UploadEvent) {
        // Ticks without a computable length are dropped
        let Some(sample) = ProgressSample::from_event(event) else {
            return;
        };
        let kind = self.session.kind();
        let update = track(sample, kind);

        tracing::debug!(
            "{} progress: {} / {} ({:.2}%)",
            kind,
            sample.loaded,
            sample.total,
            update.percent
        );

        self.session
            .record_progress(self.attempt, update.percent, update.status_label);
    }
}
