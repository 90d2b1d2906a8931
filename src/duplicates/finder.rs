//! Threshold-based clustering of fingerprinted images.
//!
//! # Overview
//!
//! [`DuplicateFinder::find_groups`] partitions fingerprinted images into
//! duplicate groups under a Hamming distance bound `D`.
//!
//! The default policy ([`ClusterPolicy::RepresentativeOnly`]) is greedy and
//! single-pass: files are visited in canonical order, each unassigned file
//! opens a group, and every later unassigned file within `D` of that
//! representative joins it and leaves the pool. Members are compared only to
//! the representative, so two members of one group may be further than `D`
//! apart. Groups without members are dropped.
//!
//! Strategies decide how candidates are found:
//!
//! - [`ClusterStrategy::Exhaustive`]: full pairwise scan, O(n²).
//! - [`ClusterStrategy::SortedSweep`]: files sorted by fingerprint value; the
//!   inner scan stops once the numeric gap between fingerprints exceeds `D`.
//!   Hamming distance does not follow numeric distance, so this can miss
//!   close pairs whose values sort far apart. It is an approximation.
//! - [`ClusterStrategy::BkTree`]: radius queries on a BK-tree. Same result as
//!   `Exhaustive`, without the quadratic cost.
//!
//! # Example
//!
//! ```
//! use imgdupe::duplicates::{DuplicateFinder, FinderConfig, HashedImage};
//! use imgdupe::scanner::{Fingerprint, ImageFile};
//! use imgdupe::signal::CancelToken;
//! use std::path::PathBuf;
//!
//! let entries = vec![
//!     HashedImage::new(ImageFile::new(PathBuf::from("/a.jpg"), 10, 0), Fingerprint::from_u64(0)),
//!     HashedImage::new(ImageFile::new(PathBuf::from("/b.jpg"), 10, 1), Fingerprint::from_u64(1)),
//!     HashedImage::new(ImageFile::new(PathBuf::from("/c.jpg"), 10, 2), Fingerprint::from_u64(u64::MAX)),
//! ];
//!
//! let finder = DuplicateFinder::new(FinderConfig::default());
//! let outcome = finder.find_groups(&entries, 1, &CancelToken::new(), |_| {});
//!
//! assert_eq!(outcome.groups.len(), 1);
//! assert_eq!(outcome.groups[&PathBuf::from("/a.jpg")].members.len(), 1);
//! ```

use serde::{Deserialize, Serialize};

use super::groups::{DuplicateGroup, GroupMap};
use crate::scanner::{Fingerprint, ImageFile, SimilarityIndex};
use crate::signal::CancelToken;

/// Input size up to which `Auto` uses the exhaustive strategy.
pub const DEFAULT_EXHAUSTIVE_LIMIT: usize = 1000;

/// Inner-loop iterations between cancellation checks.
const CANCEL_POLL_INTERVAL: u64 = 1024;

/// Convert a similarity percentage into a maximum Hamming distance.
///
/// `D = round((100 - S) * K)` with `K = bit_len / 100`, so 100% means
/// identical fingerprints only and 0% would accept anything. Values above
/// 100 are clamped.
#[must_use]
pub fn max_distance(similarity_percent: u8, bit_len: u32) -> u32 {
    let similarity = similarity_percent.min(100);
    let k = f64::from(bit_len) / 100.0;
    (f64::from(100 - similarity) * k).round() as u32
}

/// How candidate pairs are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterStrategy {
    /// Full pairwise comparison.
    Exhaustive,
    /// Sort by fingerprint value and stop on numeric gap (approximate).
    SortedSweep,
    /// BK-tree radius queries.
    BkTree,
}

impl std::fmt::Display for ClusterStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhaustive => write!(f, "exhaustive"),
            Self::SortedSweep => write!(f, "sorted-sweep"),
            Self::BkTree => write!(f, "bk-tree"),
        }
    }
}

/// Strategy requested by the caller.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyChoice {
    /// Exhaustive for small inputs, the large-input strategy otherwise.
    #[default]
    Auto,
    /// Always exhaustive.
    Exhaustive,
    /// Always sorted sweep.
    SortedSweep,
    /// Always BK-tree.
    BkTree,
}

/// Which pairs end up in the same group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum ClusterPolicy {
    /// Members must be within `D` of the representative only.
    #[default]
    #[serde(rename = "representative")]
    #[value(name = "representative")]
    RepresentativeOnly,
    /// Connected components of the "within `D`" relation.
    #[serde(rename = "transitive")]
    #[value(name = "transitive")]
    TransitiveClosure,
}

/// Configuration for the duplicate finder.
#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// Requested strategy.
    pub strategy: StrategyChoice,
    /// Strategy `Auto` picks above `exhaustive_limit`.
    pub large_input_strategy: ClusterStrategy,
    /// Largest input `Auto` still scans exhaustively.
    pub exhaustive_limit: usize,
    /// Grouping policy.
    pub policy: ClusterPolicy,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyChoice::Auto,
            large_input_strategy: ClusterStrategy::SortedSweep,
            exhaustive_limit: DEFAULT_EXHAUSTIVE_LIMIT,
            policy: ClusterPolicy::RepresentativeOnly,
        }
    }
}

impl FinderConfig {
    /// Set the requested strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: StrategyChoice) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the strategy `Auto` uses for large inputs.
    #[must_use]
    pub fn with_large_input_strategy(mut self, strategy: ClusterStrategy) -> Self {
        self.large_input_strategy = strategy;
        self
    }

    /// Set the exhaustive input-size limit.
    #[must_use]
    pub fn with_exhaustive_limit(mut self, limit: usize) -> Self {
        self.exhaustive_limit = limit;
        self
    }

    /// Set the grouping policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ClusterPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Strategy that runs for an input of `n` fingerprints.
    #[must_use]
    pub fn resolve_strategy(&self, n: usize) -> ClusterStrategy {
        match self.strategy {
            StrategyChoice::Auto if n <= self.exhaustive_limit => ClusterStrategy::Exhaustive,
            StrategyChoice::Auto => self.large_input_strategy,
            StrategyChoice::Exhaustive => ClusterStrategy::Exhaustive,
            StrategyChoice::SortedSweep => ClusterStrategy::SortedSweep,
            StrategyChoice::BkTree => ClusterStrategy::BkTree,
        }
    }
}

/// A collected file together with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedImage {
    /// The file
    pub file: ImageFile,
    /// Its perceptual fingerprint
    pub fingerprint: Fingerprint,
}

impl HashedImage {
    /// Pair a file with its fingerprint.
    #[must_use]
    pub fn new(file: ImageFile, fingerprint: Fingerprint) -> Self {
        Self { file, fingerprint }
    }
}

/// Result of one clustering run.
#[derive(Debug, Clone)]
pub struct FindOutcome {
    /// Finalized groups in discovery order
    pub groups: GroupMap,
    /// Whether clustering stopped early
    pub cancelled: bool,
    /// Fingerprint comparisons performed
    pub comparisons: u64,
    /// Strategy that ran
    pub strategy: ClusterStrategy,
}

/// Clusters fingerprinted images into duplicate groups.
#[derive(Debug, Clone, Default)]
pub struct DuplicateFinder {
    config: FinderConfig,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with the given configuration.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Partition `entries` into duplicate groups under `max_distance`.
    ///
    /// `on_group` is called once per group, as soon as it is finalized and in
    /// the same order the groups appear in the returned map. Input order does
    /// not matter: entries are visited by `order_index`, then path.
    ///
    /// On cancellation only groups finalized so far are returned. Under
    /// [`ClusterPolicy::TransitiveClosure`] nothing is final until every edge
    /// is known, so a cancelled run returns no groups.
    pub fn find_groups<F>(
        &self,
        entries: &[HashedImage],
        max_distance: u32,
        cancel: &CancelToken,
        mut on_group: F,
    ) -> FindOutcome
    where
        F: FnMut(&DuplicateGroup),
    {
        let strategy = self.config.resolve_strategy(entries.len());
        log::debug!(
            "Clustering {} fingerprints with {} strategy, {:?} policy, max distance {}",
            entries.len(),
            strategy,
            self.config.policy,
            max_distance
        );

        let mut canon: Vec<&HashedImage> = entries.iter().collect();
        canon.sort_by(|a, b| {
            a.file
                .order_index
                .cmp(&b.file.order_index)
                .then_with(|| a.file.path.cmp(&b.file.path))
        });

        let mut run = Clustering {
            canon,
            max_distance,
            cancel,
            comparisons: 0,
            ticks: 0,
            groups: GroupMap::new(),
            on_group: &mut on_group,
        };

        let cancelled = match self.config.policy {
            ClusterPolicy::RepresentativeOnly => match strategy {
                ClusterStrategy::Exhaustive => run.greedy_exhaustive(),
                ClusterStrategy::SortedSweep => run.greedy_sorted_sweep(),
                ClusterStrategy::BkTree => run.greedy_bk_tree(),
            },
            ClusterPolicy::TransitiveClosure => run.transitive(strategy),
        };

        if cancelled {
            log::info!(
                "Clustering cancelled after {} groups",
                run.groups.len()
            );
        } else {
            log::info!(
                "Clustering complete: {} groups from {} fingerprints ({} comparisons)",
                run.groups.len(),
                run.canon.len(),
                run.comparisons
            );
        }

        FindOutcome {
            groups: run.groups,
            cancelled,
            comparisons: run.comparisons,
            strategy,
        }
    }
}

/// State of one clustering run. Indices refer to canonical positions.
struct Clustering<'a, 'f> {
    canon: Vec<&'a HashedImage>,
    max_distance: u32,
    cancel: &'a CancelToken,
    comparisons: u64,
    ticks: u64,
    groups: GroupMap,
    on_group: &'f mut dyn FnMut(&DuplicateGroup),
}

impl Clustering<'_, '_> {
    fn within(&mut self, a: usize, b: usize) -> bool {
        self.comparisons += 1;
        self.canon[a].fingerprint.distance(&self.canon[b].fingerprint) <= self.max_distance
    }

    /// Periodic cancellation check for inner loops.
    fn should_stop(&mut self) -> bool {
        self.ticks += 1;
        self.ticks % CANCEL_POLL_INTERVAL == 0 && self.cancel.is_cancelled()
    }

    fn finalize(&mut self, representative: usize, members: &[usize]) {
        if members.is_empty() {
            return;
        }
        let group = DuplicateGroup::new(
            self.canon[representative].file.clone(),
            members.iter().map(|&m| self.canon[m].file.clone()).collect(),
        );
        log::trace!(
            "Group {} with {} members",
            group.representative.path.display(),
            group.members.len()
        );
        (self.on_group)(&group);
        self.groups
            .insert(group.representative.path.clone(), group);
    }

    /// Returns `true` if cancelled.
    fn greedy_exhaustive(&mut self) -> bool {
        let n = self.canon.len();
        let mut assigned = vec![false; n];

        for i in 0..n {
            if self.cancel.is_cancelled() {
                return true;
            }
            if assigned[i] {
                continue;
            }
            assigned[i] = true;

            let mut members = Vec::new();
            for j in (i + 1)..n {
                if self.should_stop() {
                    return true;
                }
                if assigned[j] {
                    continue;
                }
                if self.within(i, j) {
                    assigned[j] = true;
                    members.push(j);
                }
            }
            self.finalize(i, &members);
        }
        false
    }

    /// Canonical positions sorted by fingerprint value, ties by position.
    fn sorted_by_value(&self) -> Vec<usize> {
        let mut sorted: Vec<usize> = (0..self.canon.len()).collect();
        sorted.sort_by(|&a, &b| {
            self.canon[a]
                .fingerprint
                .cmp(&self.canon[b].fingerprint)
                .then(a.cmp(&b))
        });
        sorted
    }

    fn gap_exceeded(&self, a: usize, b: usize) -> bool {
        self.canon[a].fingerprint.numeric_gap(&self.canon[b].fingerprint)
            > u64::from(self.max_distance)
    }

    fn greedy_sorted_sweep(&mut self) -> bool {
        let sorted = self.sorted_by_value();
        let mut assigned = vec![false; sorted.len()];

        for (pos, &i) in sorted.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return true;
            }
            if assigned[i] {
                continue;
            }
            assigned[i] = true;

            let mut members = Vec::new();
            for &j in &sorted[pos + 1..] {
                if self.should_stop() {
                    return true;
                }
                if self.gap_exceeded(i, j) {
                    break;
                }
                if assigned[j] {
                    continue;
                }
                if self.within(i, j) {
                    assigned[j] = true;
                    members.push(j);
                }
            }
            self.finalize(i, &members);
        }
        false
    }

    fn build_index(&self) -> SimilarityIndex {
        let mut index = SimilarityIndex::new();
        for (slot, entry) in self.canon.iter().enumerate() {
            index.insert(&entry.fingerprint, slot);
        }
        log::debug!(
            "BK-tree built: {} fingerprints, {} distinct",
            index.len(),
            index.distinct()
        );
        index
    }

    fn greedy_bk_tree(&mut self) -> bool {
        let index = self.build_index();
        let mut assigned = vec![false; self.canon.len()];

        for i in 0..self.canon.len() {
            if self.cancel.is_cancelled() {
                return true;
            }
            if assigned[i] {
                continue;
            }
            assigned[i] = true;

            let candidates = index.find(&self.canon[i].fingerprint, self.max_distance);
            self.comparisons += candidates.len() as u64;

            // Every earlier position is already assigned, so the unassigned
            // hits are exactly what the exhaustive scan would pick up.
            let members: Vec<usize> = candidates
                .into_iter()
                .filter(|&j| !assigned[j])
                .collect();
            for &j in &members {
                assigned[j] = true;
            }
            self.finalize(i, &members);
        }
        false
    }

    fn transitive(&mut self, strategy: ClusterStrategy) -> bool {
        let n = self.canon.len();
        let mut sets = DisjointSet::new(n);

        let cancelled = match strategy {
            ClusterStrategy::Exhaustive => self.union_exhaustive(&mut sets),
            ClusterStrategy::SortedSweep => self.union_sorted_sweep(&mut sets),
            ClusterStrategy::BkTree => self.union_bk_tree(&mut sets),
        };
        if cancelled {
            return true;
        }

        // Components in order of their lowest canonical position
        let mut components: Vec<Vec<usize>> = Vec::new();
        let mut slot_of_root: std::collections::HashMap<usize, usize> =
            std::collections::HashMap::new();
        for i in 0..n {
            let root = sets.find(i);
            match slot_of_root.get(&root) {
                Some(&slot) => components[slot].push(i),
                None => {
                    slot_of_root.insert(root, components.len());
                    components.push(vec![i]);
                }
            }
        }

        for component in components {
            self.finalize(component[0], &component[1..]);
        }
        false
    }

    fn union_exhaustive(&mut self, sets: &mut DisjointSet) -> bool {
        let n = self.canon.len();
        for i in 0..n {
            if self.cancel.is_cancelled() {
                return true;
            }
            for j in (i + 1)..n {
                if self.should_stop() {
                    return true;
                }
                if self.within(i, j) {
                    sets.union(i, j);
                }
            }
        }
        false
    }

    fn union_sorted_sweep(&mut self, sets: &mut DisjointSet) -> bool {
        let sorted = self.sorted_by_value();
        for (pos, &i) in sorted.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return true;
            }
            for &j in &sorted[pos + 1..] {
                if self.should_stop() {
                    return true;
                }
                if self.gap_exceeded(i, j) {
                    break;
                }
                if self.within(i, j) {
                    sets.union(i, j);
                }
            }
        }
        false
    }

    fn union_bk_tree(&mut self, sets: &mut DisjointSet) -> bool {
        let index = self.build_index();
        for i in 0..self.canon.len() {
            if self.cancel.is_cancelled() {
                return true;
            }
            let candidates = index.find(&self.canon[i].fingerprint, self.max_distance);
            self.comparisons += candidates.len() as u64;
            for j in candidates {
                sets.union(i, j);
            }
        }
        false
    }
}

/// Union-find over canonical positions.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// The smaller root wins, so a root is always its component's minimum.
    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}
