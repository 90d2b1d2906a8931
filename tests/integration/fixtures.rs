//! Synthetic images and scan helpers shared by the integration tests.

use image::{Rgb, RgbImage};
use imgdupe::coordinator::{ScanCoordinator, ScanOptions, ScanOutcome};
use imgdupe::progress::ScanEvent;
use imgdupe::signal::CancelToken;
use std::path::{Path, PathBuf};

/// 64x64 black and white checkerboard with `cell`-pixel squares.
pub fn checkerboard(cell: u32) -> RgbImage {
    RgbImage::from_fn(64, 64, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// 64x64 diagonal grey gradient.
pub fn gradient() -> RgbImage {
    RgbImage::from_fn(64, 64, |x, y| {
        let v = ((x + y) * 2) as u8;
        Rgb([v, v, v])
    })
}

/// 64x64 vertical stripes, 16 pixels wide.
pub fn stripes() -> RgbImage {
    RgbImage::from_fn(64, 64, |x, _| {
        if (x / 16) % 2 == 0 {
            Rgb([230, 40, 40])
        } else {
            Rgb([20, 20, 120])
        }
    })
}

/// Save `img` under `dir/name`; the format follows the extension.
pub fn write_image(dir: &Path, name: &str, img: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    img.save(&path).unwrap();
    path
}

/// Byte-for-byte copy of `src` as `dir/name`.
pub fn copy_file(src: &Path, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::copy(src, &path).unwrap();
    path
}

/// Run a scan synchronously, collecting every event.
pub fn scan(options: ScanOptions) -> (ScanOutcome, Vec<ScanEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let outcome = ScanCoordinator::new(options)
        .unwrap()
        .run(&CancelToken::new(), &tx);
    drop(tx);
    (outcome, rx.into_iter().collect())
}

