use super::fixtures::{checkerboard, copy_file, gradient, scan, write_image};
use imgdupe::coordinator::ScanOptions;
use imgdupe::progress::{LogLevel, ScanEvent};
use tempfile::tempdir;

#[test]
fn test_duplicates_across_roots() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    let a = write_image(left.path(), "a.png", &checkerboard(8));
    copy_file(&a, right.path(), "a_backup.png");
    write_image(right.path(), "other.png", &gradient());

    let options = ScanOptions::new(vec![left.path().to_path_buf(), right.path().to_path_buf()]);
    let result = scan(options).0.into_result().unwrap();

    assert_eq!(result.total_files, 3);
    assert_eq!(result.group_count(), 1);
    let group = result.group_for(&a).unwrap();
    assert!(group.contains(&right.path().join("a_backup.png")));
}

#[test]
fn test_overlapping_roots_collect_each_file_once() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("nested");
    let a = write_image(&nested, "a.png", &checkerboard(8));
    copy_file(&a, dir.path(), "top.png");

    let options = ScanOptions::new(vec![dir.path().to_path_buf(), nested.clone()]);
    let result = scan(options).0.into_result().unwrap();

    assert_eq!(result.total_files, 2);
    assert_eq!(result.group_count(), 1);
    assert_eq!(result.duplicate_files(), 1);
}

#[test]
fn test_missing_root_skipped_with_warning() {
    let dir = tempdir().unwrap();
    let a = write_image(dir.path(), "a.png", &checkerboard(8));
    copy_file(&a, dir.path(), "b.png");
    let missing = dir.path().join("does-not-exist");

    let options = ScanOptions::new(vec![missing, dir.path().to_path_buf()]);
    let (outcome, events) = scan(options);
    let result = outcome.into_result().unwrap();

    assert_eq!(result.skipped_roots, 1);
    assert_eq!(result.group_count(), 1);
    assert!(events.iter().any(|e| matches!(
        e,
        ScanEvent::Log { level: LogLevel::Warning, message } if message.contains("does-not-exist")
    )));
}

#[test]
fn test_file_as_root_is_skipped() {
    let dir = tempdir().unwrap();
    let a = write_image(dir.path(), "a.png", &checkerboard(8));

    let result = scan(ScanOptions::new(vec![a])).0.into_result().unwrap();

    assert_eq!(result.skipped_roots, 1);
    assert_eq!(result.total_files, 0);
}

#[test]
fn test_canonical_order_follows_paths() {
    let dir = tempdir().unwrap();
    let z = write_image(dir.path(), "z/late.png", &checkerboard(8));
    copy_file(&z, dir.path(), "a_early.png");

    let result = scan(ScanOptions::new(vec![dir.path().to_path_buf()]))
        .0
        .into_result()
        .unwrap();

    let group = result.groups.values().next().unwrap();
    assert_eq!(group.representative.path, dir.path().join("a_early.png"));
    assert_eq!(group.representative.order_index, 0);
    assert_eq!(group.members[0].order_index, 1);
}
