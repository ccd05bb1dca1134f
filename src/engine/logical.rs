use crate::engine::index::CoChangeIndex;
use crate::engine::policy::BoostPolicy;
use crate::engine::structural::unit;
use crate::models::score::LogicalMetrics;

const SUPPORT_WEIGHT: f64 = 0.4;
const CONFIDENCE_WEIGHT: f64 = 0.6;

/// Logical coupling from version-control co-change statistics.
#[derive(Debug, Clone, Copy)]
pub struct LogicalScorer<'a> {
    co_changes: &'a CoChangeIndex,
    boost: BoostPolicy,
}

impl<'a> LogicalScorer<'a> {
    pub fn new(co_changes: &'a CoChangeIndex, boost: BoostPolicy) -> Self {
        Self { co_changes, boost }
    }

    /// Score in [0, 1]. Pairs that never changed together score 0 with
    /// zeroed diagnostics.
    pub fn score(&self, class_a: &str, class_b: &str) -> (f64, LogicalMetrics) {
        let Some(stats) = self.co_changes.get(class_a, class_b) else {
            return (0.0, LogicalMetrics::default());
        };

        let raw = SUPPORT_WEIGHT * stats.support + CONFIDENCE_WEIGHT * stats.confidence;
        let score = unit(raw * self.boost.commit_factor(stats.commits));

        (
            score,
            LogicalMetrics {
                support: stats.support,
                confidence: stats.confidence,
                commits: stats.commits,
            },
        )
    }
}
