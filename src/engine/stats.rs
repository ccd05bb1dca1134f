use crate::models::score::DependencyScore;
use crate::models::statistics::{ComponentStats, ProjectStatistics};

/// Running moments of one score component (Welford), plus the raw values
/// when an exact median is wanted.
#[derive(Debug, Clone, Default)]
pub struct ComponentAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
    values: Option<Vec<f64>>,
}

impl ComponentAccumulator {
    /// Without `keep_values` the accumulator is constant-size and the
    /// median is reported as `None`.
    pub fn new(keep_values: bool, capacity: usize) -> Self {
        Self {
            values: keep_values.then(|| Vec::with_capacity(capacity)),
            ..Self::default()
        }
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        if let Some(values) = &mut self.values {
            values.push(value);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    /// Kept values in ascending order, `None` when values are not kept.
    pub fn sorted_values(&mut self) -> Option<&[f64]> {
        let values = self.values.as_mut()?;
        values.sort_by(f64::total_cmp);
        Some(values.as_slice())
    }

    /// Mean, median, population standard deviation and range. All zero for
    /// an empty component.
    pub fn summary(&mut self) -> ComponentStats {
        if self.count == 0 {
            return ComponentStats::default();
        }
        let median = self.sorted_values().and_then(median_of_sorted);
        ComponentStats {
            mean: self.mean,
            median,
            std: self.variance().sqrt(),
            min: self.min,
            max: self.max,
        }
    }
}

/// Middle value; the average of the two middle values for an even count.
pub fn median_of_sorted(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Summary of a finite sample, median included.
pub fn summarize(values: impl IntoIterator<Item = f64>) -> ComponentStats {
    let mut acc = ComponentAccumulator::new(true, 0);
    for v in values {
        acc.push(v);
    }
    acc.summary()
}

/// Collects score components during a streaming pass and summarizes them
/// once the pass is complete.
///
/// Mean, std, min and max are running values. Medians need every value:
/// with median tracking on, memory grows by 24 bytes per pair (one `f64`
/// per component).
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    hybrid: ComponentAccumulator,
    structural: ComponentAccumulator,
    logical: ComponentAccumulator,
    strong: u64,
}

impl StatsAccumulator {
    pub fn new(track_median: bool, capacity: usize) -> Self {
        let capacity = if track_median { capacity } else { 0 };
        Self {
            hybrid: ComponentAccumulator::new(track_median, capacity),
            structural: ComponentAccumulator::new(track_median, capacity),
            logical: ComponentAccumulator::new(track_median, capacity),
            strong: 0,
        }
    }

    pub fn record(&mut self, score: &DependencyScore) {
        self.hybrid.push(score.hybrid_score);
        self.structural.push(score.structural_score);
        self.logical.push(score.logical_score);
        if score.is_strong_coupling {
            self.strong += 1;
        }
    }

    pub fn pairs(&self) -> u64 {
        self.hybrid.count()
    }

    pub fn finish(
        mut self,
        project: &str,
        total_classes: usize,
        analyzed_classes: usize,
        has_dependencies: bool,
        has_co_changes: bool,
    ) -> ProjectStatistics {
        let total_pairs = self.pairs();
        let strong_coupling_pct = if total_pairs == 0 {
            0.0
        } else {
            self.strong as f64 / total_pairs as f64 * 100.0
        };
        let h = self.hybrid.summary();
        let s = self.structural.summary();
        let l = self.logical.summary();

        ProjectStatistics {
            project: project.to_string(),
            total_classes,
            analyzed_classes,
            total_pairs,
            strong_couplings: self.strong,
            strong_coupling_pct,
            hybrid_mean: h.mean,
            hybrid_median: h.median,
            hybrid_std: h.std,
            hybrid_min: h.min,
            hybrid_max: h.max,
            structural_mean: s.mean,
            structural_median: s.median,
            structural_std: s.std,
            structural_min: s.min,
            structural_max: s.max,
            logical_mean: l.mean,
            logical_median: l.median,
            logical_std: l.std,
            logical_min: l.min,
            logical_max: l.max,
            has_dependencies,
            has_co_changes,
        }
    }
}
