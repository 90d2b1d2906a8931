use super::fixtures::{checkerboard, copy_file, gradient, stripes, write_image};
use imgdupe::coordinator::{ScanCoordinator, ScanOptions, ScanOutcome, ScanState};
use imgdupe::duplicates::DuplicateGroup;
use imgdupe::progress::{LogLevel, ScanEvent, ScanObserver};
use imgdupe::signal::CancelToken;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::tempdir;

/// Cancels the scan as soon as the first group is streamed.
struct CancelOnFirstGroup {
    token: CancelToken,
    streamed: Mutex<Vec<PathBuf>>,
}

impl ScanObserver for CancelOnFirstGroup {
    fn on_progress(&self, _percent: f32, _message: &str) {}

    fn on_group_found(&self, group: &DuplicateGroup) {
        self.streamed
            .lock()
            .unwrap()
            .push(group.representative.path.clone());
        self.token.cancel();
    }
}

/// Forwards every event and cancels on the first hashing progress report.
struct CancelOnFirstHash {
    token: CancelToken,
    events: crossbeam_channel::Sender<ScanEvent>,
}

impl ScanObserver for CancelOnFirstHash {
    fn on_state(&self, state: ScanState) {
        self.events.on_state(state);
    }

    fn on_progress(&self, percent: f32, message: &str) {
        self.events.on_progress(percent, message);
        if message.starts_with("Hashed") {
            self.token.cancel();
        }
    }

    fn on_log(&self, level: LogLevel, message: &str) {
        self.events.on_log(level, message);
    }

    fn on_group_found(&self, group: &DuplicateGroup) {
        self.events.on_group_found(group);
    }
}

fn three_pairs(dir: &Path) {
    for (name, img) in [("a", checkerboard(8)), ("g", gradient()), ("s", stripes())] {
        let src = write_image(dir, &format!("{name}1.png"), &img);
        copy_file(&src, dir, &format!("{name}2.png"));
    }
}

#[test]
fn test_cancel_before_start() {
    let dir = tempdir().unwrap();
    three_pairs(dir.path());

    let cancel = CancelToken::new();
    cancel.cancel();
    let (tx, rx) = crossbeam_channel::unbounded();
    let outcome = ScanCoordinator::new(ScanOptions::new(vec![dir.path().to_path_buf()]))
        .unwrap()
        .run(&cancel, &tx);
    drop(tx);

    let result = match outcome {
        ScanOutcome::Cancelled(result) => result,
        other => panic!("expected cancellation, got {:?}", other.state()),
    };
    assert!(result.cancelled);
    assert!(result.groups.is_empty());

    let events: Vec<ScanEvent> = rx.into_iter().collect();
    assert_eq!(
        events.last(),
        Some(&ScanEvent::StateChanged(ScanState::Cancelled))
    );
}

#[test]
fn test_cancel_during_hashing_stops_remaining_files() {
    let dir = tempdir().unwrap();
    let src = write_image(dir.path(), "copy00.png", &checkerboard(8));
    for i in 1..20 {
        copy_file(&src, dir.path(), &format!("copy{i:02}.png"));
    }

    let token = CancelToken::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    let observer = CancelOnFirstHash {
        token: token.clone(),
        events: tx,
    };
    let options = ScanOptions::new(vec![dir.path().to_path_buf()])
        .with_similarity(100)
        .with_hash_threads(1);

    let outcome = ScanCoordinator::new(options).unwrap().run(&token, &observer);
    drop(observer);

    let result = match outcome {
        ScanOutcome::Cancelled(result) => result,
        other => panic!("expected cancellation, got {:?}", other.state()),
    };
    assert!(result.cancelled);
    assert_eq!(result.total_files, 20);
    assert!(result.hashes_computed >= 1);
    assert!(result.hashes_computed < result.total_files);
    assert!(result.groups.is_empty());
    assert!(result.strategy.is_none());

    let events: Vec<ScanEvent> = rx.into_iter().collect();
    assert!(!events.contains(&ScanEvent::StateChanged(ScanState::Clustering)));
    assert_eq!(
        events.last(),
        Some(&ScanEvent::StateChanged(ScanState::Cancelled))
    );
}

#[test]
fn test_cancel_during_clustering_keeps_finalized_groups() {
    let dir = tempdir().unwrap();
    three_pairs(dir.path());

    let token = CancelToken::new();
    let observer = CancelOnFirstGroup {
        token: token.clone(),
        streamed: Mutex::new(Vec::new()),
    };
    let options = ScanOptions::new(vec![dir.path().to_path_buf()])
        .with_similarity(100)
        .with_stream_groups(true);

    let outcome = ScanCoordinator::new(options).unwrap().run(&token, &observer);
    assert_eq!(outcome.state(), ScanState::Cancelled);

    let result = outcome.into_result().unwrap();
    assert!(result.cancelled);
    assert_eq!(result.hashes_computed, 6);

    // Only complete groups survive, and they are exactly the streamed ones
    let streamed = observer.streamed.lock().unwrap().clone();
    let keys: Vec<PathBuf> = result.groups.keys().cloned().collect();
    assert_eq!(keys, streamed);
    assert!(!keys.is_empty() && keys.len() < 3);
    for group in result.groups.values() {
        assert_eq!(group.len(), 2);
    }
}

#[test]
fn test_spawned_scan_can_be_cancelled() {
    let dir = tempdir().unwrap();
    three_pairs(dir.path());

    let cancel = CancelToken::new();
    cancel.cancel();
    let handle = ScanCoordinator::new(ScanOptions::new(vec![dir.path().to_path_buf()]))
        .unwrap()
        .spawn(cancel)
        .unwrap();
    assert!(handle.cancel_token().is_cancelled());

    let events: Vec<ScanEvent> = handle.events().iter().collect();
    assert!(events.contains(&ScanEvent::StateChanged(ScanState::Cancelled)));
    assert_eq!(handle.wait().state(), ScanState::Cancelled);
}

#[test]
fn test_wait_without_draining_events() {
    let dir = tempdir().unwrap();
    three_pairs(dir.path());

    let handle = ScanCoordinator::new(
        ScanOptions::new(vec![dir.path().to_path_buf()]).with_similarity(100),
    )
    .unwrap()
    .spawn(CancelToken::new())
    .unwrap();

    match handle.wait() {
        ScanOutcome::Completed(result) => assert_eq!(result.group_count(), 3),
        other => panic!("expected completion, got {:?}", other.state()),
    }
}

#[test]
fn test_spawned_scan_completes() {
    let dir = tempdir().unwrap();
    three_pairs(dir.path());

    let handle = ScanCoordinator::new(
        ScanOptions::new(vec![dir.path().to_path_buf()]).with_similarity(100),
    )
    .unwrap()
    .spawn(CancelToken::new())
    .unwrap();

    let events: Vec<ScanEvent> = handle.events().iter().collect();
    assert_eq!(
        events.last(),
        Some(&ScanEvent::StateChanged(ScanState::Completed))
    );

    match handle.wait() {
        ScanOutcome::Completed(result) => assert_eq!(result.group_count(), 3),
        other => panic!("expected completion, got {:?}", other.state()),
    }
}
