//! Scan orchestration: collect, hash, cluster.
//!
//! # Overview
//!
//! [`ScanCoordinator`] drives one scan through
//! `Idle → Collecting → Hashing → Clustering → {Completed | Cancelled | Failed}`.
//!
//! - Bad roots and undecodable files are logged and skipped.
//! - Hashing fans out over a rayon pool; clustering starts only once every
//!   fingerprint is in and runs on the scan thread alone.
//! - Progress is reported through a [`ScanObserver`] with a percent that
//!   never decreases.
//! - Cancellation is cooperative through a [`CancelToken`]; a cancelled scan
//!   still returns the groups it finalized.
//! - Only a panic inside the worker or a failure to set up the hashing pool
//!   ends in `Failed`.
//!
//! # Example
//!
//! ```no_run
//! use imgdupe::coordinator::{ScanCoordinator, ScanOptions, ScanOutcome};
//! use imgdupe::progress::ScanEvent;
//! use imgdupe::signal::CancelToken;
//! use std::path::PathBuf;
//!
//! let options = ScanOptions::new(vec![PathBuf::from("Pictures")]).with_similarity(95);
//! let handle = ScanCoordinator::new(options)?.spawn(CancelToken::new())?;
//!
//! for event in handle.events() {
//!     if let ScanEvent::Progress { percent, message } = event {
//!         println!("{percent:5.1}% {message}");
//!     }
//! }
//!
//! if let ScanOutcome::Completed(result) = handle.wait() {
//!     println!("{} duplicate groups", result.group_count());
//! }
//! # Ok::<(), imgdupe::error::EngineError>(())
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::Receiver;
use rayon::prelude::*;
use serde::Serialize;

use crate::duplicates::{max_distance, DuplicateFinder, FinderConfig, HashedImage, ScanResult};
use crate::error::{ConfigError, EngineError};
use crate::progress::{LogLevel, ScanEvent, ScanObserver};
use crate::scanner::{
    Collector, CollectorConfig, HashCalculator, HashConfig, HashError, ImageFile,
    DEFAULT_EXTENSIONS,
};
use crate::signal::CancelToken;

/// Percent reached when collection finishes.
const COLLECT_DONE: f32 = 5.0;
/// Percent reached when hashing finishes.
const HASH_DONE: f32 = 90.0;

/// Default similarity percentage.
pub const DEFAULT_SIMILARITY: u32 = 90;

/// Lifecycle of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    /// Not started
    Idle,
    /// Walking roots
    Collecting,
    /// Fingerprinting files
    Hashing,
    /// Grouping fingerprints
    Clustering,
    /// Finished normally
    Completed,
    /// Stopped by the cancel token
    Cancelled,
    /// Stopped by an unrecoverable failure
    Failed,
}

impl ScanState {
    /// Whether the scan is over.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: ScanState) -> bool {
        use ScanState::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Cancelled | Failed) => true,
            (Idle, Collecting) => true,
            // Nothing collected (or collection cancelled) goes straight to the end
            (Collecting, Hashing | Completed) => true,
            (Hashing, Clustering) => true,
            (Clustering, Completed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Hashing => "hashing",
            Self::Clustering => "clustering",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything a scan needs to know before it starts.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Root directories, walked in this order.
    pub roots: Vec<PathBuf>,
    /// Descend into subdirectories.
    pub include_subdirectories: bool,
    /// User-facing similarity in `1..=100`.
    pub similarity_percent: u32,
    /// Accepted extensions, without the dot.
    pub valid_extensions: Vec<String>,
    /// Follow symbolic links while walking.
    pub follow_symlinks: bool,
    /// Skip hidden files and directories.
    pub skip_hidden: bool,
    /// Fingerprint settings.
    pub hash: HashConfig,
    /// Clustering settings.
    pub finder: FinderConfig,
    /// Hashing threads; 0 lets rayon decide.
    pub hash_threads: usize,
    /// Emit a progress event every this many hashed files.
    pub progress_every: usize,
    /// Emit each group as soon as it is finalized.
    pub stream_groups: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            include_subdirectories: true,
            similarity_percent: DEFAULT_SIMILARITY,
            valid_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            follow_symlinks: false,
            skip_hidden: false,
            hash: HashConfig::default(),
            finder: FinderConfig::default(),
            hash_threads: 0,
            progress_every: 1,
            stream_groups: false,
        }
    }
}

impl ScanOptions {
    /// Options for the given roots with all defaults.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Default::default()
        }
    }

    /// Set the similarity percentage.
    #[must_use]
    pub fn with_similarity(mut self, percent: u32) -> Self {
        self.similarity_percent = percent;
        self
    }

    /// Set whether subdirectories are scanned.
    #[must_use]
    pub fn with_subdirectories(mut self, include: bool) -> Self {
        self.include_subdirectories = include;
        self
    }

    /// Set the accepted extensions.
    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.valid_extensions = extensions;
        self
    }

    /// Set the fingerprint settings.
    #[must_use]
    pub fn with_hash_config(mut self, hash: HashConfig) -> Self {
        self.hash = hash;
        self
    }

    /// Set the clustering settings.
    #[must_use]
    pub fn with_finder_config(mut self, finder: FinderConfig) -> Self {
        self.finder = finder;
        self
    }

    /// Set the number of hashing threads.
    #[must_use]
    pub fn with_hash_threads(mut self, threads: usize) -> Self {
        self.hash_threads = threads;
        self
    }

    /// Set the progress cadence (clamped to at least 1).
    #[must_use]
    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every.max(1);
        self
    }

    /// Enable or disable group streaming.
    #[must_use]
    pub fn with_stream_groups(mut self, stream: bool) -> Self {
        self.stream_groups = stream;
        self
    }

    /// Check the options before a scan starts.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }
        if !(1..=100).contains(&self.similarity_percent) {
            return Err(ConfigError::SimilarityOutOfRange(self.similarity_percent));
        }
        let side = self.hash.hash_side;
        if !(4..=32).contains(&side) || side % 4 != 0 {
            return Err(ConfigError::InvalidHashSide(side));
        }
        if self.valid_extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        if self.hash.max_pixels == 0 {
            return Err(ConfigError::ZeroPixelCap);
        }
        Ok(())
    }

    /// Hamming distance bound derived from the similarity percentage.
    #[must_use]
    pub fn max_distance(&self) -> u32 {
        max_distance(self.similarity_percent.min(100) as u8, self.hash.bit_len())
    }

    fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            include_subdirectories: self.include_subdirectories,
            valid_extensions: self.valid_extensions.clone(),
            follow_symlinks: self.follow_symlinks,
            skip_hidden: self.skip_hidden,
        }
    }
}

/// Terminal state of a scan.
#[derive(Debug)]
pub enum ScanOutcome {
    /// Every phase ran to the end.
    Completed(ScanResult),
    /// Stopped by the cancel token; holds the partial result.
    Cancelled(ScanResult),
    /// Stopped by an unrecoverable failure.
    Failed(EngineError),
}

impl ScanOutcome {
    /// The result, unless the scan failed.
    #[must_use]
    pub fn result(&self) -> Option<&ScanResult> {
        match self {
            Self::Completed(r) | Self::Cancelled(r) => Some(r),
            Self::Failed(_) => None,
        }
    }

    /// Consume the outcome into its result, unless the scan failed.
    ///
    /// # Errors
    ///
    /// Returns the [`EngineError`] of a failed scan.
    pub fn into_result(self) -> Result<ScanResult, EngineError> {
        match self {
            Self::Completed(r) | Self::Cancelled(r) => Ok(r),
            Self::Failed(e) => Err(e),
        }
    }

    /// Terminal state this outcome corresponds to.
    #[must_use]
    pub fn state(&self) -> ScanState {
        match self {
            Self::Completed(_) => ScanState::Completed,
            Self::Cancelled(_) => ScanState::Cancelled,
            Self::Failed(_) => ScanState::Failed,
        }
    }
}

/// A scan running on a background thread.
pub struct ScanHandle {
    events: Receiver<ScanEvent>,
    cancel: CancelToken,
    join: JoinHandle<ScanOutcome>,
}

impl ScanHandle {
    /// Event stream, in production order. Ends when the scan finishes.
    #[must_use]
    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The token this scan polls.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Block until the scan finishes.
    ///
    /// Consumes the handle, so events not yet received from
    /// [`ScanHandle::events`] are dropped. Drain the stream first to see
    /// all of them.
    pub fn wait(self) -> ScanOutcome {
        match self.join.join() {
            Ok(outcome) => outcome,
            Err(_) => ScanOutcome::Failed(EngineError::Fatal("scan worker panicked".to_string())),
        }
    }
}

/// Drives one scan.
#[derive(Debug, Clone)]
pub struct ScanCoordinator {
    options: ScanOptions,
}

impl ScanCoordinator {
    /// Create a coordinator for validated options.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the options are invalid.
    pub fn new(options: ScanOptions) -> Result<Self, EngineError> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Options this coordinator runs with.
    #[must_use]
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Run the scan on a dedicated background thread.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Fatal`] if the thread cannot be started.
    pub fn spawn(self, cancel: CancelToken) -> Result<ScanHandle, EngineError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker_cancel = cancel.clone();

        let join = std::thread::Builder::new()
            .name("imgdupe-scan".to_string())
            .spawn(move || self.run(&worker_cancel, &tx))
            .map_err(|e| EngineError::Fatal(format!("failed to start scan worker: {e}")))?;

        Ok(ScanHandle {
            events: rx,
            cancel,
            join,
        })
    }

    /// Run the scan on the calling thread.
    ///
    /// Never panics: a panic inside the pipeline becomes
    /// [`ScanOutcome::Failed`].
    pub fn run(&self, cancel: &CancelToken, observer: &dyn ScanObserver) -> ScanOutcome {
        let mut machine = StateMachine::new(observer);

        let outcome = catch_unwind(AssertUnwindSafe(|| self.run_pipeline(cancel, &mut machine)));

        match outcome {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("Scan failed: {}", message);
                observer.on_log(LogLevel::Error, &format!("Scan failed: {message}"));
                machine.force(ScanState::Failed);
                ScanOutcome::Failed(EngineError::Fatal(message))
            }
        }
    }

    fn run_pipeline(&self, cancel: &CancelToken, machine: &mut StateMachine<'_>) -> ScanOutcome {
        let start = Instant::now();
        let observer = machine.observer;
        let reporter = Reporter::new(observer);
        let max_distance = self.options.max_distance();
        let mut result = ScanResult {
            max_distance,
            ..Default::default()
        };

        log::info!(
            "Starting scan of {} roots (similarity {}%, max distance {})",
            self.options.roots.len(),
            self.options.similarity_percent,
            max_distance
        );

        // Collecting
        machine.advance(ScanState::Collecting);
        reporter.progress(0.0, "Collecting images");
        let collection =
            Collector::new(self.options.collector_config()).collect(&self.options.roots, cancel);
        log::info!("Collected {} images", collection.files.len());
        for err in &collection.errors {
            observer.on_log(LogLevel::Warning, &err.to_string());
        }
        result.total_files = collection.files.len();
        result.skipped_roots = collection.skipped_roots;
        if result.skipped_roots > 0 {
            inform(
                observer,
                &format!(
                    "Skipped {} of {} roots",
                    result.skipped_roots,
                    self.options.roots.len()
                ),
            );
        }

        if collection.cancelled || cancel.is_cancelled() {
            return finish_cancelled(result, start, machine);
        }
        reporter.progress(
            COLLECT_DONE,
            &format!("Found {} images", collection.files.len()),
        );

        if collection.files.is_empty() {
            log::info!("No candidate images found");
            return finish_completed(result, start, machine, &reporter);
        }

        // Hashing
        machine.advance(ScanState::Hashing);
        let phase = match self.hash_all(&collection.files, cancel, &reporter) {
            Ok(phase) => phase,
            Err(e) => {
                log::error!("{}", e);
                observer.on_log(LogLevel::Error, &e.to_string());
                machine.advance(ScanState::Failed);
                return ScanOutcome::Failed(e);
            }
        };
        result.hashes_computed = phase.entries.len();
        result.failed_files = phase.failed;
        inform(
            observer,
            &format!(
                "Fingerprinted {} of {} images ({} failed)",
                phase.entries.len(),
                result.total_files,
                phase.failed
            ),
        );

        if phase.cancelled {
            return finish_cancelled(result, start, machine);
        }

        // Clustering
        machine.advance(ScanState::Clustering);
        reporter.progress(
            HASH_DONE,
            &format!("Clustering {} fingerprints", phase.entries.len()),
        );
        let finder = DuplicateFinder::new(self.options.finder.clone());
        let stream = self.options.stream_groups;
        let outcome = finder.find_groups(&phase.entries, max_distance, cancel, |group| {
            if stream {
                observer.on_group_found(group);
            }
        });

        result.groups = outcome.groups;
        result.comparisons = outcome.comparisons;
        result.strategy = Some(outcome.strategy);

        if outcome.cancelled {
            return finish_cancelled(result, start, machine);
        }
        finish_completed(result, start, machine, &reporter)
    }

    /// Fingerprint every file. Failures are logged and dropped.
    fn hash_all(
        &self,
        files: &[ImageFile],
        cancel: &CancelToken,
        reporter: &Reporter<'_>,
    ) -> Result<HashPhase, EngineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.hash_threads)
            .thread_name(|i| format!("imgdupe-hash-{i}"))
            .build()
            .map_err(|e| EngineError::Fatal(format!("failed to build hashing pool: {e}")))?;

        let hash_config = self.options.hash;
        let total = files.len();
        let every = self.options.progress_every.max(1);

        log::info!(
            "Hashing {} images on {} threads",
            total,
            pool.current_num_threads()
        );

        let results: Vec<Option<Result<_, HashError>>> = pool.install(|| {
            files
                .par_iter()
                .map_init(
                    || HashCalculator::new(hash_config),
                    |calculator, file| {
                        if cancel.is_cancelled() {
                            return None;
                        }
                        let res = calculator.compute_path(&file.path);
                        reporter.file_hashed(&file.path, res.as_ref().err(), total, every);
                        Some(res)
                    },
                )
                .collect()
        });

        let mut phase = HashPhase::default();
        for (file, res) in files.iter().zip(results) {
            match res {
                Some(Ok(fingerprint)) => {
                    log::trace!("{} -> {}", file.path.display(), fingerprint);
                    phase
                        .entries
                        .push(HashedImage::new(file.clone(), fingerprint));
                }
                Some(Err(_)) => phase.failed += 1,
                None => phase.cancelled = true,
            }
        }
        Ok(phase)
    }
}

#[derive(Default)]
struct HashPhase {
    entries: Vec<HashedImage>,
    failed: usize,
    cancelled: bool,
}

fn finish_completed(
    mut result: ScanResult,
    start: Instant,
    machine: &mut StateMachine<'_>,
    reporter: &Reporter<'_>,
) -> ScanOutcome {
    result.elapsed = start.elapsed();
    reporter.progress(
        100.0,
        &format!("Found {} duplicate groups", result.group_count()),
    );
    inform(
        machine.observer,
        &format!(
            "Scan complete: {} groups, {} duplicate files, {} reclaimable",
            result.group_count(),
            result.duplicate_files(),
            result.reclaimable_display()
        ),
    );
    log::debug!("Scan took {:.2?}", result.elapsed);
    machine.advance(ScanState::Completed);
    ScanOutcome::Completed(result)
}

fn finish_cancelled(
    mut result: ScanResult,
    start: Instant,
    machine: &mut StateMachine<'_>,
) -> ScanOutcome {
    result.cancelled = true;
    result.elapsed = start.elapsed();
    log::info!(
        "Scan cancelled with {} finalized groups",
        result.group_count()
    );
    machine.advance(ScanState::Cancelled);
    ScanOutcome::Cancelled(result)
}

/// Phase summary, sent to the log backend and the observer.
fn inform(observer: &dyn ScanObserver, message: &str) {
    log::info!("{}", message);
    observer.on_log(LogLevel::Info, message);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "scan worker panicked".to_string()
    }
}

/// Tracks the current state and notifies the observer on every change.
struct StateMachine<'a> {
    state: ScanState,
    observer: &'a dyn ScanObserver,
}

impl<'a> StateMachine<'a> {
    fn new(observer: &'a dyn ScanObserver) -> Self {
        Self {
            state: ScanState::Idle,
            observer,
        }
    }

    fn advance(&mut self, next: ScanState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.force(next);
    }

    fn force(&mut self, next: ScanState) {
        if self.state == next || self.state.is_terminal() {
            return;
        }
        log::debug!("Scan state: {} -> {}", self.state, next);
        self.state = next;
        self.observer.on_state(next);
    }
}

/// Serializes progress and log notifications so the percent stays
/// monotonic while hashing runs in parallel.
struct Reporter<'a> {
    observer: &'a dyn ScanObserver,
    state: Mutex<ReportState>,
}

#[derive(Default)]
struct ReportState {
    last_percent: f32,
    hashed: usize,
}

impl<'a> Reporter<'a> {
    fn new(observer: &'a dyn ScanObserver) -> Self {
        Self {
            observer,
            state: Mutex::new(ReportState::default()),
        }
    }

    fn emit(&self, state: &mut ReportState, percent: f32, message: &str) {
        let percent = percent.clamp(state.last_percent, 100.0);
        state.last_percent = percent;
        self.observer.on_progress(percent, message);
    }

    fn progress(&self, percent: f32, message: &str) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        self.emit(&mut state, percent, message);
    }

    fn file_hashed(&self, path: &Path, failure: Option<&HashError>, total: usize, every: usize) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.hashed += 1;

        if let Some(err) = failure {
            log::warn!("Skipping {}: {}", path.display(), err);
            self.observer
                .on_log(LogLevel::Warning, &format!("Skipping {}: {}", path.display(), err));
        }

        if state.hashed % every == 0 || state.hashed == total {
            let fraction = state.hashed as f32 / total as f32;
            let percent = COLLECT_DONE + (HASH_DONE - COLLECT_DONE) * fraction;
            let message = format!("Hashed {}/{} images", state.hashed, total);
            self.emit(&mut state, percent, &message);
        }
    }
}
