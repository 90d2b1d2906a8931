use super::fixtures::{checkerboard, copy_file, gradient, scan, stripes, write_image};
use imgdupe::coordinator::{ScanOptions, ScanOutcome, ScanState};
use imgdupe::duplicates::{ClusterPolicy, ClusterStrategy, FinderConfig, StrategyChoice};
use imgdupe::progress::{LogLevel, ScanEvent};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn warnings(events: &[ScanEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Log {
                level: LogLevel::Warning,
                message,
            } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_copy_grouped_unrelated_left_out() {
    let dir = tempdir().unwrap();
    let a = write_image(dir.path(), "A.jpg", &checkerboard(8));
    copy_file(&a, dir.path(), "B.jpg");
    write_image(dir.path(), "C.jpg", &gradient());

    let options = ScanOptions::new(vec![dir.path().to_path_buf()]).with_similarity(100);
    let (outcome, _) = scan(options);
    let result = match outcome {
        ScanOutcome::Completed(result) => result,
        other => panic!("expected completion, got {:?}", other.state()),
    };

    assert_eq!(result.total_files, 3);
    assert_eq!(result.hashes_computed, 3);
    assert_eq!(result.max_distance, 0);
    assert_eq!(result.group_count(), 1);

    let group = &result.groups[&dir.path().join("A.jpg")];
    assert_eq!(group.representative.path, dir.path().join("A.jpg"));
    assert_eq!(group.paths(), vec![dir.path().join("A.jpg"), dir.path().join("B.jpg")]);
    assert!(!result.cancelled);
}

#[test]
fn test_empty_directory() {
    let dir = tempdir().unwrap();

    let (outcome, events) = scan(ScanOptions::new(vec![dir.path().to_path_buf()]));
    let result = outcome.into_result().unwrap();

    assert!(result.groups.is_empty());
    assert_eq!(result.total_files, 0);
    assert_eq!(result.hashes_computed, 0);
    assert!(warnings(&events).is_empty());
    assert!(!events.iter().any(|e| matches!(
        e,
        ScanEvent::Log {
            level: LogLevel::Warning | LogLevel::Error,
            ..
        }
    )));
}

#[test]
fn test_corrupt_file_skipped_pair_still_grouped() {
    let dir = tempdir().unwrap();
    let good = write_image(dir.path(), "good1.png", &stripes());
    copy_file(&good, dir.path(), "good2.png");
    fs::write(dir.path().join("broken.png"), b"definitely not a png").unwrap();

    let (outcome, events) = scan(ScanOptions::new(vec![dir.path().to_path_buf()]));
    let result = outcome.into_result().unwrap();

    assert_eq!(result.total_files, 3);
    assert_eq!(result.hashes_computed, 2);
    assert_eq!(result.failed_files, 1);
    assert_eq!(result.group_count(), 1);
    assert!(result.group_for(&dir.path().join("broken.png")).is_none());
    assert!(result.group_for(&dir.path().join("good2.png")).is_some());

    let warnings = warnings(&events);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("broken.png"));
}

#[test]
fn test_empty_file_is_a_decode_failure() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("empty.jpg"), b"").unwrap();

    let (outcome, events) = scan(ScanOptions::new(vec![dir.path().to_path_buf()]));
    let result = outcome.into_result().unwrap();

    assert_eq!(result.total_files, 1);
    assert_eq!(result.failed_files, 1);
    assert_eq!(warnings(&events).len(), 1);
}

#[test]
fn test_repeated_scans_are_identical() {
    let dir = tempdir().unwrap();
    let a = write_image(dir.path(), "a.png", &checkerboard(8));
    copy_file(&a, dir.path(), "a_copy.png");
    let s = write_image(dir.path(), "s.png", &stripes());
    copy_file(&s, dir.path(), "s_copy.png");
    write_image(dir.path(), "g.png", &gradient());

    let options = ScanOptions::new(vec![dir.path().to_path_buf()]);
    let first = scan(options.clone()).0.into_result().unwrap();
    let second = scan(options).0.into_result().unwrap();

    let first_json = serde_json::to_string(&first.groups).unwrap();
    let second_json = serde_json::to_string(&second.groups).unwrap();
    assert_eq!(first_json, second_json);
    assert_eq!(first.group_count(), 2);
}

#[test]
fn test_resized_copy_grouped_at_default_similarity() {
    let dir = tempdir().unwrap();
    let img = stripes();
    write_image(dir.path(), "big.png", &img);
    let small = image::imageops::resize(&img, 32, 32, image::imageops::FilterType::Nearest);
    small.save(dir.path().join("small.png")).unwrap();
    write_image(dir.path(), "other.png", &checkerboard(8));

    let (outcome, _) = scan(ScanOptions::new(vec![dir.path().to_path_buf()]));
    let result = outcome.into_result().unwrap();

    let group = result
        .group_for(&dir.path().join("small.png"))
        .expect("resized copy should be grouped");
    assert!(group.contains(&dir.path().join("big.png")));
    assert!(!group.contains(&dir.path().join("other.png")));
}

#[test]
fn test_non_recursive_ignores_subdirectories() {
    let dir = tempdir().unwrap();
    let a = write_image(dir.path(), "a.png", &checkerboard(8));
    fs::create_dir(dir.path().join("nested")).unwrap();
    copy_file(&a, &dir.path().join("nested"), "a.png");

    let recursive = scan(ScanOptions::new(vec![dir.path().to_path_buf()]))
        .0
        .into_result()
        .unwrap();
    assert_eq!(recursive.total_files, 2);
    assert_eq!(recursive.group_count(), 1);

    let flat = scan(ScanOptions::new(vec![dir.path().to_path_buf()]).with_subdirectories(false))
        .0
        .into_result()
        .unwrap();
    assert_eq!(flat.total_files, 1);
    assert!(flat.groups.is_empty());
}

#[test]
fn test_extension_filter_is_case_insensitive() {
    let dir = tempdir().unwrap();
    let a = write_image(dir.path(), "a.png", &checkerboard(8));
    copy_file(&a, dir.path(), "B.PNG");
    copy_file(&a, dir.path(), "c.txt");

    let result = scan(
        ScanOptions::new(vec![dir.path().to_path_buf()]).with_extensions(vec!["png".to_string()]),
    )
    .0
    .into_result()
    .unwrap();

    assert_eq!(result.total_files, 2);
    assert_eq!(result.duplicate_files(), 1);
    assert!(result.group_for(&dir.path().join("c.txt")).is_none());
}

#[test]
fn test_states_and_progress_order() {
    let dir = tempdir().unwrap();
    let a = write_image(dir.path(), "a.png", &checkerboard(8));
    copy_file(&a, dir.path(), "b.png");
    write_image(dir.path(), "c.png", &stripes());

    let (outcome, events) = scan(ScanOptions::new(vec![dir.path().to_path_buf()]));
    assert_eq!(outcome.state(), ScanState::Completed);

    let states: Vec<ScanState> = events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            ScanState::Collecting,
            ScanState::Hashing,
            ScanState::Clustering,
            ScanState::Completed
        ]
    );

    let percents: Vec<f32> = events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last().copied(), Some(100.0));
}

#[test]
fn test_streamed_groups_match_result() {
    let dir = tempdir().unwrap();
    for (name, img) in [("a", checkerboard(8)), ("g", gradient()), ("s", stripes())] {
        let src = write_image(dir.path(), &format!("{name}1.png"), &img);
        copy_file(&src, dir.path(), &format!("{name}2.png"));
    }

    let options = ScanOptions::new(vec![dir.path().to_path_buf()])
        .with_similarity(100)
        .with_stream_groups(true);
    let (outcome, events) = scan(options);
    let result = outcome.into_result().unwrap();

    let streamed: Vec<PathBuf> = events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::GroupFound(g) => Some(g.representative.path.clone()),
            _ => None,
        })
        .collect();
    let keys: Vec<PathBuf> = result.groups.keys().cloned().collect();

    assert_eq!(result.group_count(), 3);
    assert_eq!(streamed, keys);
}

#[test]
fn test_no_group_events_without_streaming() {
    let dir = tempdir().unwrap();
    let a = write_image(dir.path(), "a.png", &checkerboard(8));
    copy_file(&a, dir.path(), "b.png");

    let (outcome, events) = scan(ScanOptions::new(vec![dir.path().to_path_buf()]));
    assert_eq!(outcome.into_result().unwrap().group_count(), 1);
    assert!(!events.iter().any(|e| matches!(e, ScanEvent::GroupFound(_))));
}

#[test]
fn test_every_strategy_finds_exact_copies() {
    let dir = tempdir().unwrap();
    let a = write_image(dir.path(), "a.png", &checkerboard(8));
    copy_file(&a, dir.path(), "b.png");
    write_image(dir.path(), "c.png", &gradient());

    for strategy in [
        StrategyChoice::Exhaustive,
        StrategyChoice::SortedSweep,
        StrategyChoice::BkTree,
    ] {
        for policy in [ClusterPolicy::RepresentativeOnly, ClusterPolicy::TransitiveClosure] {
            let finder = FinderConfig::default()
                .with_strategy(strategy)
                .with_policy(policy);
            let options = ScanOptions::new(vec![dir.path().to_path_buf()])
                .with_similarity(100)
                .with_finder_config(finder);
            let result = scan(options).0.into_result().unwrap();

            assert_eq!(result.group_count(), 1, "{strategy:?}/{policy:?}");
            assert!(result.group_for(&dir.path().join("b.png")).is_some());
        }
    }
}

#[test]
fn test_auto_strategy_reported() {
    let dir = tempdir().unwrap();
    write_image(dir.path(), "a.png", &checkerboard(8));

    let result = scan(ScanOptions::new(vec![dir.path().to_path_buf()]))
        .0
        .into_result()
        .unwrap();
    assert_eq!(result.strategy, Some(ClusterStrategy::Exhaustive));

    let large = FinderConfig::default().with_exhaustive_limit(0);
    let result = scan(ScanOptions::new(vec![dir.path().to_path_buf()]).with_finder_config(large))
        .0
        .into_result()
        .unwrap();
    assert_eq!(result.strategy, Some(ClusterStrategy::SortedSweep));
}

#[test]
fn test_single_hash_thread() {
    let dir = tempdir().unwrap();
    let a = write_image(dir.path(), "a.png", &checkerboard(8));
    copy_file(&a, dir.path(), "b.png");

    let result = scan(
        ScanOptions::new(vec![dir.path().to_path_buf()])
            .with_hash_threads(1)
            .with_progress_every(10),
    )
    .0
    .into_result()
    .unwrap();
    assert_eq!(result.group_count(), 1);
}
