//! Scan events, observers and terminal progress.
//!
//! The engine reports through the [`ScanObserver`] trait. Three observers
//! ship with the crate:
//!
//! - `crossbeam_channel::Sender<ScanEvent>`: forwards every notification as a
//!   typed [`ScanEvent`], which is how [`crate::coordinator::ScanHandle`]
//!   hands events to the caller's thread.
//! - [`Progress`]: renders an indicatif bar, used by the binary.
//! - [`NoopObserver`]: discards everything.

use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::Sender;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::coordinator::ScanState;
use crate::duplicates::DuplicateGroup;

/// Severity of a [`ScanEvent::Log`] message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Phase summary
    Info,
    /// A file or root was skipped
    Warning,
    /// Something failed outright
    Error,
}

/// Notification produced by a running scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ScanEvent {
    /// The coordinator entered a new state.
    StateChanged(ScanState),
    /// Overall progress; `percent` never decreases within one scan.
    Progress {
        /// Completion in `0.0..=100.0`
        percent: f32,
        /// Human-readable status
        message: String,
    },
    /// A non-fatal condition worth surfacing.
    Log {
        /// Severity
        level: LogLevel,
        /// Message text
        message: String,
    },
    /// A duplicate group was finalized (streaming mode only).
    GroupFound(DuplicateGroup),
}

impl ScanEvent {
    /// Replay this event on an observer.
    pub fn deliver_to(&self, observer: &dyn ScanObserver) {
        match self {
            Self::StateChanged(state) => observer.on_state(*state),
            Self::Progress { percent, message } => observer.on_progress(*percent, message),
            Self::Log { level, message } => observer.on_log(*level, message),
            Self::GroupFound(group) => observer.on_group_found(group),
        }
    }
}

/// Receiver of scan notifications.
///
/// Implementations must be cheap: they run on the scan worker.
pub trait ScanObserver: Send + Sync {
    /// Called on every state transition.
    fn on_state(&self, _state: ScanState) {}

    /// Called with monotonic progress.
    ///
    /// # Arguments
    ///
    /// * `percent` - Completion in `0.0..=100.0`
    /// * `message` - Human-readable status
    fn on_progress(&self, percent: f32, message: &str);

    /// Called for skipped files, skipped roots and similar conditions.
    fn on_log(&self, _level: LogLevel, _message: &str) {}

    /// Called when a group is finalized, if streaming is enabled.
    fn on_group_found(&self, _group: &DuplicateGroup) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ScanObserver for NoopObserver {
    fn on_progress(&self, _percent: f32, _message: &str) {}
}

// A closed receiver means the caller stopped listening; the scan carries on.
impl ScanObserver for Sender<ScanEvent> {
    fn on_state(&self, state: ScanState) {
        let _ = self.send(ScanEvent::StateChanged(state));
    }

    fn on_progress(&self, percent: f32, message: &str) {
        let _ = self.send(ScanEvent::Progress {
            percent,
            message: message.to_string(),
        });
    }

    fn on_log(&self, level: LogLevel, message: &str) {
        let _ = self.send(ScanEvent::Log {
            level,
            message: message.to_string(),
        });
    }

    fn on_group_found(&self, group: &DuplicateGroup) {
        let _ = self.send(ScanEvent::GroupFound(group.clone()));
    }
}

/// Terminal progress reporter using indicatif.
///
/// Log messages are not drawn here; the `log` backend already prints them.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    groups_found: Mutex<usize>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, nothing is drawn.
    ///
    /// # Examples
    ///
    /// ```
    /// use imgdupe::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            groups_found: Mutex::new(0),
            quiet,
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }

    /// Number of streamed groups seen so far.
    #[must_use]
    pub fn groups_found(&self) -> usize {
        self.groups_found.lock().map_or(0, |g| *g)
    }
}

impl ScanObserver for Progress {
    fn on_state(&self, state: ScanState) {
        if self.quiet {
            return;
        }
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };

        match state {
            ScanState::Collecting => {
                let pb = ProgressBar::new(100);
                pb.set_style(Self::bar_style());
                pb.set_message("Collecting images");
                pb.enable_steady_tick(Duration::from_millis(100));
                *slot = Some(pb);
            }
            ScanState::Completed | ScanState::Cancelled | ScanState::Failed => {
                if let Some(pb) = slot.take() {
                    pb.finish_and_clear();
                }
            }
            ScanState::Idle | ScanState::Hashing | ScanState::Clustering => {}
        }
    }

    fn on_progress(&self, percent: f32, message: &str) {
        if self.quiet {
            return;
        }
        if let Ok(slot) = self.bar.lock() {
            if let Some(ref pb) = *slot {
                pb.set_position(percent.round() as u64);
                pb.set_message(truncate_message(message, 50));
            }
        }
    }

    fn on_group_found(&self, _group: &DuplicateGroup) {
        if let Ok(mut count) = self.groups_found.lock() {
            *count += 1;
        }
    }
}

/// Truncate a status message for display in the progress bar.
fn truncate_message(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        return message.to_string();
    }
    let tail: String = message
        .chars()
        .rev()
        .take(max_len.saturating_sub(3))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{tail}")
}
