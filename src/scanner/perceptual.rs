//! Perceptual image hashing for similarity detection.
//!
//! This module provides the [`HashCalculator`] which turns one image into a
//! fixed-width [`Fingerprint`]. Fingerprints stay stable under resizing,
//! recompression and small color shifts, but change under cropping and
//! rotation: the hash is perceptual, not cryptographic.
//!
//! The pipeline is: read bytes, check header dimensions against the pixel
//! cap, decode, reduce to luminance, downsample to a small grid, transform
//! and threshold. The last three steps are delegated to `image_hasher`.

use std::cmp::Ordering;
use std::fmt;
use std::io::Cursor;
use std::path::Path;

use bk_tree::{BKTree, Metric};
use image::{ImageError, ImageReader, Limits};
use image_hasher::{HashAlg, HasherConfig, ImageHash, InvalidBytesError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default cap on decoded pixel count (about 179 megapixels).
///
/// Anything larger is treated as a decompression bomb and rejected before
/// decoding.
pub const DEFAULT_MAX_PIXELS: u64 = 178_956_970;

// Widest decoded sample layout (RGBA, 32-bit float channels).
const MAX_BYTES_PER_PIXEL: u64 = 16;

/// Default fingerprint side; the fingerprint holds `side * side` bits.
pub const DEFAULT_HASH_SIDE: u32 = 8;

/// Supported perceptual hashing algorithms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PerceptualAlgorithm {
    /// pHash (Perceptual Hash) - DCT-based, most resilient to transformations.
    #[default]
    Phash,
    /// dHash (Difference Hash) - Gradient-based, very fast and effective.
    Dhash,
    /// aHash (Average Hash) - Mean-based, fast but less resilient.
    Ahash,
}

impl fmt::Display for PerceptualAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phash => write!(f, "pHash"),
            Self::Dhash => write!(f, "dHash"),
            Self::Ahash => write!(f, "aHash"),
        }
    }
}

/// Errors that can occur while fingerprinting one image.
///
/// None of these abort a scan: the coordinator logs them and drops the file.
#[derive(Debug, Error)]
pub enum HashError {
    /// The file could not be read.
    #[error("Failed to read {subject}: {source}")]
    Io {
        /// Path (or label) of the input
        subject: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The image is corrupt, truncated or in an unknown format.
    #[error("Failed to decode {subject}: {reason}")]
    Decode {
        /// Path (or label) of the input
        subject: String,
        /// Decoder message
        reason: String,
    },

    /// The image is too large or uses an unsupported feature.
    #[error("Unsupported media {subject}: {reason}")]
    UnsupportedMedia {
        /// Path (or label) of the input
        subject: String,
        /// Why the image was rejected
        reason: String,
    },
}

/// A fixed-length perceptual fingerprint.
///
/// Wraps the `image_hasher` hash. Ordering is the ordering of the bytes read
/// as one big-endian unsigned integer, which is what the sorted-sweep
/// strategy sorts by.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    hash: ImageHash,
}

impl Fingerprint {
    /// Build a fingerprint from raw big-endian bytes.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidBytesError::BytesEmpty`] for an empty slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InvalidBytesError> {
        <ImageHash>::from_bytes(bytes).map(Self::from)
    }

    /// Build a 64-bit fingerprint from an integer.
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        match Self::from_bytes(&value.to_be_bytes()) {
            Ok(fingerprint) => fingerprint,
            // eight bytes are never empty
            Err(_) => unreachable!(),
        }
    }

    /// Raw fingerprint bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.hash.as_bytes()
    }

    /// The underlying `image_hasher` hash.
    #[must_use]
    pub fn image_hash(&self) -> &ImageHash {
        &self.hash
    }

    /// Number of bits in the fingerprint.
    #[must_use]
    pub fn bit_len(&self) -> u32 {
        (self.as_bytes().len() * 8) as u32
    }

    /// Hamming distance to another fingerprint.
    ///
    /// Fingerprints of different lengths count the missing bytes as fully
    /// different.
    #[must_use]
    pub fn distance(&self, other: &Self) -> u32 {
        let extra = self.as_bytes().len().abs_diff(other.as_bytes().len()) as u32 * 8;
        self.hash.dist(&other.hash) + extra
    }

    /// Absolute difference of the two fingerprints read as big-endian
    /// integers, saturating at `u64::MAX`.
    #[must_use]
    pub fn numeric_gap(&self, other: &Self) -> u64 {
        if self.as_bytes().len() != other.as_bytes().len() {
            return u64::MAX;
        }
        let (hi, lo) = if self >= other {
            (self.as_bytes(), other.as_bytes())
        } else {
            (other.as_bytes(), self.as_bytes())
        };

        let mut diff = vec![0u8; hi.len()];
        let mut borrow = 0i16;
        for i in (0..hi.len()).rev() {
            let mut d = i16::from(hi[i]) - i16::from(lo[i]) - borrow;
            if d < 0 {
                d += 256;
                borrow = 1;
            } else {
                borrow = 0;
            }
            diff[i] = d as u8;
        }

        let split = diff.len().saturating_sub(8);
        if diff[..split].iter().any(|&b| b != 0) {
            return u64::MAX;
        }
        diff[split..]
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.as_bytes().iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl From<ImageHash> for Fingerprint {
    fn from(hash: ImageHash) -> Self {
        Self { hash }
    }
}

impl PartialOrd for Fingerprint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fingerprint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Settings for fingerprint construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashConfig {
    /// Hashing algorithm.
    pub algorithm: PerceptualAlgorithm,
    /// Fingerprint side; the fingerprint has `side * side` bits.
    pub hash_side: u32,
    /// Maximum `width * height` accepted before decoding.
    pub max_pixels: u64,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            algorithm: PerceptualAlgorithm::Phash,
            hash_side: DEFAULT_HASH_SIDE,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

impl HashConfig {
    /// Number of bits every fingerprint built with this config holds.
    #[must_use]
    pub fn bit_len(&self) -> u32 {
        self.hash_side * self.hash_side
    }
}

/// Computes perceptual fingerprints for images.
///
/// Not shared between threads; build one per worker.
pub struct HashCalculator {
    hasher: image_hasher::Hasher,
    config: HashConfig,
}

impl HashCalculator {
    /// Create a new calculator from the given settings.
    #[must_use]
    pub fn new(config: HashConfig) -> Self {
        let base = HasherConfig::new().hash_size(config.hash_side, config.hash_side);

        let hasher_config = match config.algorithm {
            PerceptualAlgorithm::Phash => base.hash_alg(HashAlg::Median).preproc_dct(),
            PerceptualAlgorithm::Dhash => base.hash_alg(HashAlg::Gradient),
            PerceptualAlgorithm::Ahash => base.hash_alg(HashAlg::Mean),
        };

        Self {
            hasher: hasher_config.to_hasher(),
            config,
        }
    }

    /// Settings this calculator was built with.
    #[must_use]
    pub fn config(&self) -> &HashConfig {
        &self.config
    }

    /// Compute the fingerprint of the image file at `path`.
    ///
    /// # Errors
    ///
    /// [`HashError::Io`] if the file cannot be read, otherwise the errors of
    /// [`HashCalculator::compute_bytes`].
    pub fn compute_path<P: AsRef<Path>>(&self, path: P) -> Result<Fingerprint, HashError> {
        let path = path.as_ref();
        let subject = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|source| HashError::Io {
            subject: subject.clone(),
            source,
        })?;
        self.compute_labeled(&bytes, &subject)
    }

    /// Compute the fingerprint of an encoded image held in memory.
    ///
    /// # Errors
    ///
    /// [`HashError::Decode`] for corrupt or unknown data,
    /// [`HashError::UnsupportedMedia`] when the pixel cap is exceeded.
    pub fn compute_bytes(&self, bytes: &[u8]) -> Result<Fingerprint, HashError> {
        self.compute_labeled(bytes, "<memory>")
    }

    fn compute_labeled(&self, bytes: &[u8], subject: &str) -> Result<Fingerprint, HashError> {
        let (width, height) = open_reader(bytes, subject, Limits::no_limits())?
            .into_dimensions()
            .map_err(|e| image_error(e, subject))?;

        let pixels = u64::from(width) * u64::from(height);
        if pixels == 0 {
            return Err(HashError::Decode {
                subject: subject.to_string(),
                reason: "image has no pixels".to_string(),
            });
        }
        if pixels > self.config.max_pixels {
            return Err(HashError::UnsupportedMedia {
                subject: subject.to_string(),
                reason: format!(
                    "{width}x{height} exceeds the {} pixel limit",
                    self.config.max_pixels
                ),
            });
        }

        let img = open_reader(bytes, subject, self.decode_limits(width, height))?
            .decode()
            .map_err(|e| image_error(e, subject))?;

        Ok(Fingerprint::from(self.hasher.hash_image(&img)))
    }

    // Decoder limits follow the pixel cap instead of the library default.
    fn decode_limits(&self, width: u32, height: u32) -> Limits {
        let mut limits = Limits::no_limits();
        limits.max_image_width = Some(width);
        limits.max_image_height = Some(height);
        limits.max_alloc = Some(self.config.max_pixels.saturating_mul(MAX_BYTES_PER_PIXEL));
        limits
    }
}

impl Default for HashCalculator {
    fn default() -> Self {
        Self::new(HashConfig::default())
    }
}

fn open_reader<'a>(
    bytes: &'a [u8],
    subject: &str,
    limits: Limits,
) -> Result<ImageReader<Cursor<&'a [u8]>>, HashError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|source| HashError::Io {
            subject: subject.to_string(),
            source,
        })?;
    if reader.format().is_none() {
        return Err(HashError::Decode {
            subject: subject.to_string(),
            reason: "unrecognized image format".to_string(),
        });
    }
    reader.limits(limits);
    Ok(reader)
}

fn image_error(err: ImageError, subject: &str) -> HashError {
    match err {
        ImageError::Unsupported(_) | ImageError::Limits(_) => HashError::UnsupportedMedia {
            subject: subject.to_string(),
            reason: err.to_string(),
        },
        ImageError::IoError(source) => HashError::Io {
            subject: subject.to_string(),
            source,
        },
        other => HashError::Decode {
            subject: subject.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Metric for comparing fingerprints using Hamming distance.
#[derive(Default, Clone, Copy, Debug)]
pub struct FingerprintMetric;

impl Metric<Fingerprint> for FingerprintMetric {
    fn distance(&self, a: &Fingerprint, b: &Fingerprint) -> u32 {
        a.image_hash().dist(b.image_hash())
    }

    fn threshold_distance(&self, a: &Fingerprint, b: &Fingerprint, threshold: u32) -> Option<u32> {
        let d = self.distance(a, b);
        if d <= threshold {
            Some(d)
        } else {
            None
        }
    }
}

/// A similarity index for fingerprints using a BK-tree.
///
/// Each distinct fingerprint is stored once; the slots (caller-defined
/// indices) sharing it are kept alongside, so identical images never collide
/// inside the tree.
pub struct SimilarityIndex {
    tree: BKTree<Fingerprint, FingerprintMetric>,
    slots: std::collections::HashMap<Fingerprint, Vec<usize>>,
    count: usize,
}

impl SimilarityIndex {
    /// Create a new empty similarity index.
    pub fn new() -> Self {
        Self {
            tree: BKTree::new(FingerprintMetric),
            slots: std::collections::HashMap::new(),
            count: 0,
        }
    }

    /// Add a fingerprint under the given slot.
    pub fn insert(&mut self, fingerprint: &Fingerprint, slot: usize) {
        match self.slots.get_mut(fingerprint) {
            Some(existing) => existing.push(slot),
            None => {
                self.tree.add(fingerprint.clone());
                self.slots.insert(fingerprint.clone(), vec![slot]);
            }
        }
        self.count += 1;
    }

    /// Find all slots whose fingerprint lies within `max_distance`.
    ///
    /// Slots are returned in ascending order.
    pub fn find(&self, fingerprint: &Fingerprint, max_distance: u32) -> Vec<usize> {
        let mut found: Vec<usize> = self
            .tree
            .find(fingerprint, max_distance)
            .filter_map(|(_, key)| self.slots.get(key))
            .flatten()
            .copied()
            .collect();
        found.sort_unstable();
        found
    }

    /// Number of slots in the index.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of distinct fingerprints in the index.
    pub fn distinct(&self) -> usize {
        self.slots.len()
    }
}

impl Default for SimilarityIndex {
    fn default() -> Self {
        Self::new()
    }
}
