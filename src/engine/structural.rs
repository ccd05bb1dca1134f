use crate::engine::index::{DependencyIndex, MetricIndex};
use crate::models::score::StructuralMetrics;

const CBO_SCALE: f64 = 100.0;
const RFC_SCALE: f64 = 200.0;
const DIT_SCALE: f64 = 10.0;

const CBO_WEIGHT: f64 = 0.5;
const RFC_WEIGHT: f64 = 0.3;
const DIT_WEIGHT: f64 = 0.2;

/// Structural coupling from CK metrics plus explicit dependencies.
#[derive(Debug, Clone, Copy)]
pub struct StructuralScorer<'a> {
    metrics: &'a MetricIndex,
    dependencies: &'a DependencyIndex,
    dependency_factor: f64,
}

impl<'a> StructuralScorer<'a> {
    pub fn new(
        metrics: &'a MetricIndex,
        dependencies: &'a DependencyIndex,
        dependency_factor: f64,
    ) -> Self {
        Self {
            metrics,
            dependencies,
            dependency_factor,
        }
    }

    /// Score in [0, 1] with the raw values used. A class without metrics
    /// scores 0 with no diagnostics.
    pub fn score(&self, class_a: &str, class_b: &str) -> (f64, Option<StructuralMetrics>) {
        let (Some(a), Some(b)) = (self.metrics.get(class_a), self.metrics.get(class_b)) else {
            return (0.0, None);
        };

        let cbo = unit((a.cbo + b.cbo) / CBO_SCALE);
        let rfc = unit((a.rfc + b.rfc) / RFC_SCALE);
        // Hierarchical distance counts as a positive signal.
        let dit = unit((a.dit - b.dit).abs() / DIT_SCALE);

        let mut score = CBO_WEIGHT * cbo + RFC_WEIGHT * rfc + DIT_WEIGHT * dit;

        let has_direct_dependency = self.dependencies.contains(class_a, class_b);
        if has_direct_dependency {
            score *= self.dependency_factor;
        }

        let metrics = StructuralMetrics {
            cbo_a: a.cbo,
            cbo_b: b.cbo,
            rfc_a: a.rfc,
            rfc_b: b.rfc,
            dit_a: a.dit,
            dit_b: b.dit,
            has_direct_dependency,
        };
        (unit(score), Some(metrics))
    }
}

/// Clamp into [0, 1].
pub(crate) fn unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dependency::DependencyEdge;
    use crate::models::metrics::ClassMetrics;

    fn metrics() -> MetricIndex {
        MetricIndex::build(vec![
            ClassMetrics::new("User", 3.0, 8.0, 1.0),
            ClassMetrics::new("UserRepository", 5.0, 12.0, 0.0),
            ClassMetrics::new("God", 90.0, 250.0, 12.0),
            ClassMetrics::new("Root", 80.0, 100.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn user_and_repository_without_dependency() {
        let m = metrics();
        let deps = DependencyIndex::default();
        let scorer = StructuralScorer::new(&m, &deps, 1.5);
        let (score, diag) = scorer.score("User", "UserRepository");
        assert!((score - 0.09).abs() < 1e-12, "{score}");
        let diag = diag.unwrap();
        assert_eq!((diag.cbo_a, diag.cbo_b), (3.0, 5.0));
        assert_eq!((diag.rfc_a, diag.rfc_b), (8.0, 12.0));
        assert_eq!((diag.dit_a, diag.dit_b), (1.0, 0.0));
        assert!(!diag.has_direct_dependency);
    }

    #[test]
    fn dependency_boost_applies_in_either_order() {
        let m = metrics();
        let deps = DependencyIndex::build(&[DependencyEdge::new("UserRepository", "User")]);
        let scorer = StructuralScorer::new(&m, &deps, 1.5);
        let (ab, diag) = scorer.score("User", "UserRepository");
        let (ba, _) = scorer.score("UserRepository", "User");
        assert!((ab - 0.135).abs() < 1e-12, "{ab}");
        assert_eq!(ab, ba);
        assert!(diag.unwrap().has_direct_dependency);
    }

    #[test]
    fn boosted_score_is_clamped() {
        let m = metrics();
        let deps = DependencyIndex::build(&[DependencyEdge::new("God", "Root")]);
        let scorer = StructuralScorer::new(&m, &deps, 1.5);
        // cbo 1.0, rfc 1.0, dit 1.0 -> base 1.0, boosted past 1
        let (score, _) = scorer.score("God", "Root");
        assert_eq!(score, 1.0);
    }

    #[test]
    fn unknown_class_scores_zero() {
        let m = metrics();
        let deps = DependencyIndex::build(&[DependencyEdge::new("User", "Ghost")]);
        let scorer = StructuralScorer::new(&m, &deps, 1.5);
        assert_eq!(scorer.score("User", "Ghost"), (0.0, None));
        assert_eq!(scorer.score("Ghost", "User"), (0.0, None));
    }
}
