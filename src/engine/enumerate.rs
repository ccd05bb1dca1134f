//! Pairwise enumeration over a class universe.
//!
//! Pairs are visited with the outer loop over classes in universe order and
//! the inner loop over every class strictly after it, so each unordered pair
//! is produced exactly once, oriented as (first seen, second seen).

use ahash::AHashSet;
use rayon::prelude::*;
use std::iter::FusedIterator;
use tracing::{debug, info, warn};

use crate::engine::hybrid::PairScorer;
use crate::engine::index::MetricIndex;
use crate::models::score::DependencyScore;

/// Number of unordered pairs over `k` classes.
pub fn total_pairs(k: usize) -> u64 {
    let k = k as u64;
    k * k.saturating_sub(1) / 2
}

/// Progress cadence used when the caller does not choose one: roughly every
/// ten thousand pairs, more sparsely for very large universes.
pub fn default_progress_interval(k: usize) -> u64 {
    10_000u64.max(k as u64 * 10)
}

/// Select the classes to pair up.
///
/// Defaults to the full metrics table in table order. A caller-supplied list
/// is de-duplicated (first occurrence wins) and may name classes the metrics
/// table does not know. `max_classes` keeps the first N.
pub fn universe<'a>(
    metrics: &'a MetricIndex,
    subset: Option<&'a [String]>,
    max_classes: Option<usize>,
) -> Vec<&'a str> {
    let mut classes: Vec<&str> = match subset {
        Some(list) => {
            let mut seen = AHashSet::with_capacity(list.len());
            list.iter()
                .map(String::as_str)
                .filter(|c| seen.insert(*c))
                .collect()
        }
        None => metrics.classes(),
    };
    if let Some(cap) = max_classes
        && classes.len() > cap
    {
        warn!(
            max_classes = cap,
            available = classes.len(),
            "limiting analysis to the first classes"
        );
        classes.truncate(cap);
    }
    classes
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Snapshot handed to a [`ProgressObserver`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub pairs_done: u64,
    pub total_pairs: u64,
    /// Outer-loop classes started so far
    pub classes_done: usize,
    pub class_count: usize,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total_pairs == 0 {
            100.0
        } else {
            self.pairs_done as f64 / self.total_pairs as f64 * 100.0
        }
    }
}

/// Side channel for enumeration progress. Never affects results.
pub trait ProgressObserver {
    fn on_progress(&mut self, progress: &Progress);
}

impl<F: FnMut(&Progress)> ProgressObserver for F {
    fn on_progress(&mut self, progress: &Progress) {
        self(progress)
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _progress: &Progress) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&mut self, p: &Progress) {
        info!(
            pairs_done = p.pairs_done,
            total_pairs = p.total_pairs,
            classes_done = p.classes_done,
            class_count = p.class_count,
            "scoring progress {:.1}%",
            p.percent()
        );
    }
}

/// Counts pairs and notifies the observer every `interval` pairs.
#[derive(Debug)]
struct ProgressTracker<P> {
    observer: P,
    interval: u64,
    last_report: u64,
    progress: Progress,
}

impl<P: ProgressObserver> ProgressTracker<P> {
    fn new(observer: P, interval: u64, class_count: usize) -> Self {
        Self {
            observer,
            interval,
            last_report: 0,
            progress: Progress {
                pairs_done: 0,
                total_pairs: total_pairs(class_count),
                classes_done: 0,
                class_count,
            },
        }
    }

    fn advance(&mut self, pairs: u64, classes_done: usize) {
        self.progress.pairs_done += pairs;
        self.progress.classes_done = classes_done;
        if self.interval > 0 && self.progress.pairs_done - self.last_report >= self.interval {
            self.last_report = self.progress.pairs_done;
            self.observer.on_progress(&self.progress);
        }
    }
}

// ---------------------------------------------------------------------------
// Sequential enumeration
// ---------------------------------------------------------------------------

/// Lifecycle of a [`PairEnumerator`]. There is no retry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationState {
    Initialized,
    Enumerating,
    Done,
}

/// Lazy stream of scores over every unordered pair of a universe.
///
/// Restarting means building a new enumerator over the same universe; the
/// output is identical each time.
pub struct PairEnumerator<'a, P = NoProgress> {
    scorer: PairScorer<'a>,
    classes: &'a [&'a str],
    outer: usize,
    inner: usize,
    state: EnumerationState,
    tracker: ProgressTracker<P>,
}

impl<'a> PairEnumerator<'a, NoProgress> {
    pub fn new(scorer: PairScorer<'a>, classes: &'a [&'a str]) -> Self {
        Self::with_progress(scorer, classes, NoProgress, 0)
    }
}

impl<'a, P: ProgressObserver> PairEnumerator<'a, P> {
    /// `interval` is the number of pairs between progress notifications;
    /// 0 disables them.
    pub fn with_progress(
        scorer: PairScorer<'a>,
        classes: &'a [&'a str],
        observer: P,
        interval: u64,
    ) -> Self {
        Self {
            scorer,
            classes,
            outer: 0,
            inner: 1,
            state: EnumerationState::Initialized,
            tracker: ProgressTracker::new(observer, interval, classes.len()),
        }
    }

    pub fn state(&self) -> EnumerationState {
        self.state
    }

    pub fn total_pairs(&self) -> u64 {
        self.tracker.progress.total_pairs
    }

    pub fn pairs_emitted(&self) -> u64 {
        self.tracker.progress.pairs_done
    }
}

impl<P: ProgressObserver> Iterator for PairEnumerator<'_, P> {
    type Item = DependencyScore;

    fn next(&mut self) -> Option<DependencyScore> {
        match self.state {
            EnumerationState::Done => return None,
            EnumerationState::Initialized => {
                debug!(
                    classes = self.classes.len(),
                    pairs = self.total_pairs(),
                    "enumeration started"
                );
                self.state = EnumerationState::Enumerating;
            }
            EnumerationState::Enumerating => {}
        }

        let n = self.classes.len();
        while self.inner >= n {
            self.outer += 1;
            self.inner = self.outer + 1;
            if self.outer + 1 >= n {
                self.state = EnumerationState::Done;
                debug!(pairs = self.pairs_emitted(), "enumeration done");
                return None;
            }
        }

        let score = self
            .scorer
            .score(self.classes[self.outer], self.classes[self.inner]);
        self.inner += 1;
        self.tracker.advance(1, self.outer + 1);
        Some(score)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_pairs() - self.pairs_emitted();
        match usize::try_from(remaining) {
            Ok(r) if self.state != EnumerationState::Done => (r, Some(r)),
            Ok(_) => (0, Some(0)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl<P: ProgressObserver> FusedIterator for PairEnumerator<'_, P> {}

// ---------------------------------------------------------------------------
// Parallel enumeration
// ---------------------------------------------------------------------------

/// Scores pairs on the rayon pool in ordered chunks.
///
/// Each chunk covers whole outer-loop rows totalling at least `chunk_pairs`
/// pairs (or whatever remains). Chunks come out in enumeration order and
/// their contents match [`PairEnumerator`] exactly.
pub struct ParallelChunks<'a, P = NoProgress> {
    scorer: PairScorer<'a>,
    classes: &'a [&'a str],
    next_outer: usize,
    chunk_pairs: u64,
    tracker: ProgressTracker<P>,
}

impl<'a, P: ProgressObserver> ParallelChunks<'a, P> {
    pub fn new(
        scorer: PairScorer<'a>,
        classes: &'a [&'a str],
        chunk_pairs: usize,
        observer: P,
        interval: u64,
    ) -> Self {
        Self {
            scorer,
            classes,
            next_outer: 0,
            chunk_pairs: chunk_pairs.max(1) as u64,
            tracker: ProgressTracker::new(observer, interval, classes.len()),
        }
    }
}

impl<P: ProgressObserver> Iterator for ParallelChunks<'_, P> {
    type Item = Vec<DependencyScore>;

    fn next(&mut self) -> Option<Vec<DependencyScore>> {
        let n = self.classes.len();
        let start = self.next_outer;
        if start + 1 >= n {
            return None;
        }

        let mut end = start;
        let mut pairs = 0u64;
        while end + 1 < n && pairs < self.chunk_pairs {
            pairs += (n - end - 1) as u64;
            end += 1;
        }
        self.next_outer = end;

        let scorer = self.scorer;
        let classes = self.classes;
        let chunk: Vec<DependencyScore> = (start..end)
            .into_par_iter()
            .flat_map_iter(|i| {
                ((i + 1)..n).map(move |j| scorer.score(classes[i], classes[j]))
            })
            .collect();

        self.tracker.advance(pairs, end);
        Some(chunk)
    }
}
