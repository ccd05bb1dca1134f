use crate::engine::index::CouplingIndices;
use crate::engine::logical::LogicalScorer;
use crate::engine::policy::ScoringConfig;
use crate::engine::structural::{StructuralScorer, unit};
use crate::models::score::{DependencyScore, PairMetrics};

/// Weighted sum of the two component scores plus strong-coupling
/// classification. Weights were validated when the `ScoringConfig` was built.
#[derive(Debug, Clone, Copy)]
pub struct HybridCombiner {
    structural_weight: f64,
    logical_weight: f64,
    threshold: f64,
}

impl HybridCombiner {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            structural_weight: config.structural_weight(),
            logical_weight: config.logical_weight(),
            threshold: config.coupling_threshold(),
        }
    }

    /// Returns `(hybrid_score, is_strong_coupling)`.
    pub fn combine(&self, structural: f64, logical: f64) -> (f64, bool) {
        let hybrid = unit(self.structural_weight * structural + self.logical_weight * logical);
        (hybrid, hybrid >= self.threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Scores a single class pair against a set of read-only indices.
///
/// Holds only shared references, so one scorer can be used from many
/// threads at once.
#[derive(Debug, Clone, Copy)]
pub struct PairScorer<'a> {
    structural: StructuralScorer<'a>,
    logical: LogicalScorer<'a>,
    combiner: HybridCombiner,
}

impl<'a> PairScorer<'a> {
    pub fn new(indices: &'a CouplingIndices, config: &ScoringConfig) -> Self {
        let boost = *config.boost();
        Self {
            structural: StructuralScorer::new(
                &indices.metrics,
                &indices.dependencies,
                boost.dependency_factor,
            ),
            logical: LogicalScorer::new(&indices.co_changes, boost),
            combiner: HybridCombiner::new(config),
        }
    }

    pub fn score(&self, class_a: &str, class_b: &str) -> DependencyScore {
        let (structural_score, structural) = self.structural.score(class_a, class_b);
        let (logical_score, logical) = self.logical.score(class_a, class_b);
        let (hybrid_score, is_strong_coupling) =
            self.combiner.combine(structural_score, logical_score);

        DependencyScore {
            class_a: class_a.to_string(),
            class_b: class_b.to_string(),
            structural_score,
            logical_score,
            hybrid_score,
            is_strong_coupling,
            metrics: PairMetrics {
                structural,
                logical,
            },
        }
    }

    pub fn combiner(&self) -> &HybridCombiner {
        &self.combiner
    }
}
