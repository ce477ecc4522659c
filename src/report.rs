//! Progress reporting for the display layer
//!
//! Reporters render session snapshots; [`follow`] feeds them from a session's
//! watch channel until the attempt settles.

use crate::session::{SessionSnapshot, UploadSession, UploadStatus};

/// Resolution of the terminal bar, in steps per 100%
const BAR_STEPS: u64 = 10_000;

/// Trait for rendering session progress
pub trait ProgressReporter: Send + Sync {
    /// Render a non-terminal snapshot
    fn report(&self, snapshot: &SessionSnapshot);

    /// Render the terminal snapshot
    fn finish(&self, _snapshot: &SessionSnapshot) {}
}

/// Terminal progress bar using indicatif
pub struct TerminalProgress {
    bar: indicatif::ProgressBar,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::with_bar(indicatif::ProgressBar::new(BAR_STEPS))
    }

    /// Bar drawn alongside the other bars of `multi`
    pub fn attached(multi: &indicatif::MultiProgress) -> Self {
        Self::with_bar(multi.add(indicatif::ProgressBar::new(BAR_STEPS)))
    }

    fn with_bar(bar: indicatif::ProgressBar) -> Self {
        bar.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        Self { bar }
    }

    fn position(snapshot: &SessionSnapshot) -> u64 {
        (snapshot.progress_percent.clamp(0.0, 100.0) * (BAR_STEPS as f64 / 100.0)) as u64
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for TerminalProgress {
    fn report(&self, snapshot: &SessionSnapshot) {
        self.bar.set_position(Self::position(snapshot));
        self.bar.set_message(snapshot.message.clone());
    }

    fn finish(&self, snapshot: &SessionSnapshot) {
        self.bar.set_position(Self::position(snapshot));
        match snapshot.status {
            UploadStatus::Completed => self.bar.finish_with_message(snapshot.message.clone()),
            _ => self.bar.abandon_with_message(snapshot.message.clone()),
        }
    }
}

/// Reporter writing status lines through tracing
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, snapshot: &SessionSnapshot) {
        tracing::info!("{}", snapshot);
    }

    fn finish(&self, snapshot: &SessionSnapshot) {
        match snapshot.status {
            UploadStatus::Completed => tracing::info!("{}", snapshot),
            _ => tracing::warn!("{}", snapshot),
        }
    }
}

/// Drive `reporter` from `session` until a terminal snapshot is seen.
///
/// Intermediate snapshots may be skipped when the session changes faster than
/// the reporter runs. Returns the terminal snapshot, or the last one seen if the
/// session goes away first.
pub async fn follow(session: &UploadSession, reporter: &dyn ProgressReporter) -> SessionSnapshot {
    let mut rx = session.subscribe();

    loop {
        let snapshot = rx.borrow_and_update().clone();

        if snapshot.status.is_terminal() {
            reporter.finish(&snapshot);
            return snapshot;
        }
        if snapshot.status.is_in_flight() {
            reporter.report(&snapshot);
        }

        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}
