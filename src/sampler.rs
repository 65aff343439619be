//! Concurrent terrain sampling along candidate paths.
//!
//! Every sample point of every path is classified on a dedicated rayon pool,
//! so the number of in-flight lookups never exceeds the pool size regardless
//! of how many paths or points a request carries. Each worker folds results
//! into its own partial histograms; partials are merged at the join, which
//! keeps the final counts independent of completion order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::path::{CandidatePath, Coordinate, PathId};
use crate::terrain::{Classification, TerrainCategory, TerrainClassifier};
use crate::traits::LandUseLookup;

/// Default number of simultaneous classification calls.
pub const DEFAULT_WORKERS: usize = 8;

/// Per-path count of sample points falling into each terrain category.
///
/// Never holds an `unknown` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerrainHistogram {
    counts: BTreeMap<TerrainCategory, u32>,
}

impl TerrainHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one observation of `category`. `unknown` is dropped.
    pub fn record(&mut self, category: &TerrainCategory) {
        self.add(category.clone(), 1);
    }

    pub fn add(&mut self, category: TerrainCategory, count: u32) {
        if category.is_unknown() || count == 0 {
            return;
        }
        *self.counts.entry(category).or_insert(0) += count;
    }

    pub fn merge(&mut self, other: TerrainHistogram) {
        for (category, count) in other.counts {
            self.add(category, count);
        }
    }

    pub fn get(&self, category: &TerrainCategory) -> u32 {
        self.counts.get(category).copied().unwrap_or(0)
    }

    pub fn count_of(&self, name: &str) -> u32 {
        self.get(&TerrainCategory::new(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TerrainCategory, u32)> {
        self.counts.iter().map(|(category, count)| (category, *count))
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }
}

impl FromIterator<(TerrainCategory, u32)> for TerrainHistogram {
    fn from_iter<I: IntoIterator<Item = (TerrainCategory, u32)>>(iter: I) -> Self {
        let mut histogram = TerrainHistogram::new();
        for (category, count) in iter {
            histogram.add(category, count);
        }
        histogram
    }
}

/// Which points of a path are classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Every vertex plus the midpoint of every consecutive vertex pair.
    #[default]
    VerticesAndMidpoints,
    /// Vertices only.
    VerticesOnly,
}

impl SamplingStrategy {
    pub fn sample_points(&self, path: &CandidatePath) -> Vec<Coordinate> {
        let mut points = path.points().to_vec();
        if *self == SamplingStrategy::VerticesAndMidpoints {
            points.extend(path.segment_midpoints());
        }
        points
    }
}

#[derive(Debug, Clone)]
pub struct SamplerOptions {
    /// Maximum simultaneous classification calls.
    pub workers: usize,
    pub strategy: SamplingStrategy,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            strategy: SamplingStrategy::default(),
        }
    }
}

/// Result of sampling a batch of paths.
pub type PathHistograms = BTreeMap<PathId, TerrainHistogram>;

pub struct PathSampler {
    pool: rayon::ThreadPool,
    strategy: SamplingStrategy,
}

impl std::fmt::Debug for PathSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathSampler")
            .field("workers", &self.workers())
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl PathSampler {
    pub fn new(options: SamplerOptions) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers.max(1))
            .thread_name(|index| format!("terrain-sampler-{}", index))
            .build()?;

        Ok(Self {
            pool,
            strategy: options.strategy,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn strategy(&self) -> SamplingStrategy {
        self.strategy
    }

    /// Classify every sample point of `paths` and build one histogram per path.
    ///
    /// Path ids are the positions in `paths`. Failed and unknown samples add
    /// nothing to their path's histogram.
    pub fn sample<L: LandUseLookup>(
        &self,
        classifier: &TerrainClassifier<L>,
        paths: &[CandidatePath],
    ) -> PathHistograms {
        let never = AtomicBool::new(false);
        self.sample_cancellable(classifier, paths, &never)
            .unwrap_or_else(|| empty_histograms(paths.len()))
    }

    /// Like [`sample`](Self::sample), but stops dispatching lookups once
    /// `cancel` is set and then returns `None`; partial counts are dropped.
    pub fn sample_cancellable<L: LandUseLookup>(
        &self,
        classifier: &TerrainClassifier<L>,
        paths: &[CandidatePath],
        cancel: &AtomicBool,
    ) -> Option<PathHistograms> {
        let jobs: Vec<(usize, Coordinate)> = paths
            .iter()
            .enumerate()
            .flat_map(|(index, path)| {
                self.strategy
                    .sample_points(path)
                    .into_iter()
                    .map(move |point| (index, point))
            })
            .collect();

        tracing::debug!(
            paths = paths.len(),
            samples = jobs.len(),
            workers = self.workers(),
            "sampling terrain"
        );

        let path_count = paths.len();
        let tally = self.pool.install(|| {
            jobs.par_iter()
                .fold(
                    || Tally::new(path_count),
                    |mut tally, (index, point)| {
                        if cancel.load(Ordering::Relaxed) {
                            return tally;
                        }
                        let classification = classifier.classify(*point);
                        tally.record(*index, &classification);
                        tally
                    },
                )
                .reduce(|| Tally::new(path_count), Tally::merge)
        });

        if cancel.load(Ordering::Relaxed) {
            tracing::debug!("terrain sampling cancelled, discarding partial histograms");
            return None;
        }

        if tally.failed > 0 {
            tracing::warn!(
                failed = tally.failed,
                samples = jobs.len(),
                "some terrain samples failed and were not counted"
            );
        }
        tracing::debug!(unknown = tally.unknown, failed = tally.failed, "terrain sampling done");

        Some(
            tally
                .histograms
                .into_iter()
                .enumerate()
                .map(|(index, histogram)| (PathId(index), histogram))
                .collect(),
        )
    }
}

fn empty_histograms(path_count: usize) -> PathHistograms {
    (0..path_count)
        .map(|index| (PathId(index), TerrainHistogram::new()))
        .collect()
}

/// One worker's partial result.
struct Tally {
    histograms: Vec<TerrainHistogram>,
    unknown: usize,
    failed: usize,
}

impl Tally {
    fn new(path_count: usize) -> Self {
        Self {
            histograms: vec![TerrainHistogram::new(); path_count],
            unknown: 0,
            failed: 0,
        }
    }

    fn record(&mut self, path_index: usize, classification: &Classification) {
        match classification {
            Classification::Categories(_) => {
                for category in classification.countable() {
                    self.histograms[path_index].record(category);
                }
            }
            Classification::Unknown => self.unknown += 1,
            Classification::Failed(_) => self.failed += 1,
        }
    }

    fn merge(mut self, other: Tally) -> Tally {
        for (mine, theirs) in self.histograms.iter_mut().zip(other.histograms) {
            mine.merge(theirs);
        }
        self.unknown += other.unknown;
        self.failed += other.failed;
        self
    }
}
