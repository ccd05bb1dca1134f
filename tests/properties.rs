use ahash::AHashSet;
use proptest::prelude::*;

use hybrid_coupling::engine::enumerate::{PairEnumerator, total_pairs};
use hybrid_coupling::engine::export::export_scores;
use hybrid_coupling::engine::hybrid::PairScorer;
use hybrid_coupling::engine::index::CouplingIndices;
use hybrid_coupling::engine::loader::Tables;
use hybrid_coupling::engine::policy::ScoringConfig;
use hybrid_coupling::models::cochange::CoChangeRecord;
use hybrid_coupling::models::dependency::DependencyEdge;
use hybrid_coupling::models::metrics::ClassMetrics;

fn metrics(max_classes: usize) -> impl Strategy<Value = Vec<ClassMetrics>> {
    prop::collection::vec((0u32..200, 0u32..500, 0u32..8), 2..max_classes).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (cbo, rfc, dit))| {
                ClassMetrics::new(format!("C{i}"), cbo as f64, rfc as f64, dit as f64)
            })
            .collect()
    })
}

/// Random tables over classes `C0..Cn`. Some pair endpoints are unknown classes.
fn tables() -> impl Strategy<Value = Tables> {
    metrics(12).prop_flat_map(|metrics| {
        let n = metrics.len() + 2;
        let deps = prop::collection::vec((0..n, 0..n), 0..10);
        let co = prop::collection::vec(
            (0..n, 0..n, 0u64..40, prop::option::of((0.0f64..=1.0, 0.0f64..=1.0))),
            0..10,
        );
        (Just(metrics), prop::option::of(deps), prop::option::of(co)).prop_map(
            |(metrics, deps, co)| Tables {
                metrics,
                dependencies: deps.map(|edges| {
                    edges
                        .into_iter()
                        .map(|(a, b)| DependencyEdge::new(format!("C{a}"), format!("C{b}")))
                        .collect()
                }),
                co_changes: co.map(|rows| {
                    rows.into_iter()
                        .map(|(a, b, commits, ratios)| {
                            let record =
                                CoChangeRecord::new(format!("C{a}"), format!("C{b}"), commits);
                            match ratios {
                                Some((s, c)) => record.with_ratios(s, c),
                                None => record,
                            }
                        })
                        .collect()
                }),
            },
        )
    })
}

/// Valid weights: structural in [0, 1], logical its complement.
fn config() -> impl Strategy<Value = ScoringConfig> {
    (0u32..=100, 0u32..=100).prop_map(|(s, t)| {
        let s = s as f64 / 100.0;
        ScoringConfig::from_weights(s, 1.0 - s, t as f64 / 100.0).unwrap()
    })
}

fn class_names(indices: &CouplingIndices) -> Vec<String> {
    let mut names: Vec<String> = indices
        .metrics
        .classes()
        .into_iter()
        .map(str::to_string)
        .collect();
    names.push("Unknown".to_string());
    names
}

proptest! {
    #[test]
    fn prop_scores_are_symmetric(tables in tables(), config in config()) {
        let indices = CouplingIndices::build(tables).unwrap();
        let scorer = PairScorer::new(&indices, &config);
        let names = class_names(&indices);
        for a in &names {
            for b in &names {
                let ab = scorer.score(a, b);
                let ba = scorer.score(b, a);
                prop_assert_eq!(ab.structural_score, ba.structural_score);
                prop_assert_eq!(ab.logical_score, ba.logical_score);
                prop_assert_eq!(ab.hybrid_score, ba.hybrid_score);
            }
        }
    }

    #[test]
    fn prop_scores_are_bounded_and_classified(tables in tables(), config in config()) {
        let indices = CouplingIndices::build(tables).unwrap();
        let scorer = PairScorer::new(&indices, &config);
        let names = class_names(&indices);
        for a in &names {
            for b in &names {
                let s = scorer.score(a, b);
                for v in [s.structural_score, s.logical_score, s.hybrid_score] {
                    prop_assert!((0.0..=1.0).contains(&v), "{} out of range", v);
                }
                prop_assert_eq!(
                    s.is_strong_coupling,
                    s.hybrid_score >= config.coupling_threshold()
                );
            }
        }
    }

    #[test]
    fn prop_unbalanced_weights_rejected(s in 0.0f64..=1.0, l in 0.0f64..=1.0) {
        prop_assume!(((s + l) - 1.0).abs() > 1e-6);
        prop_assert!(ScoringConfig::from_weights(s, l, 0.7).is_err());
    }

    #[test]
    fn prop_no_auxiliary_tables_means_no_boost(metrics in metrics(10), config in config()) {
        let indices = CouplingIndices::build(Tables { metrics: metrics.clone(), ..Tables::default() }).unwrap();
        let scorer = PairScorer::new(&indices, &config);
        for a in &metrics {
            for b in &metrics {
                let s = scorer.score(&a.class, &b.class);
                let expected = (0.5 * ((a.cbo + b.cbo) / 100.0).min(1.0)
                    + 0.3 * ((a.rfc + b.rfc) / 200.0).min(1.0)
                    + 0.2 * ((a.dit - b.dit).abs() / 10.0).min(1.0))
                .clamp(0.0, 1.0);
                prop_assert_eq!(s.logical_score, 0.0);
                prop_assert!((s.structural_score - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn prop_enumeration_is_complete(tables in tables()) {
        let indices = CouplingIndices::build(tables).unwrap();
        let config = ScoringConfig::default();
        let classes = indices.metrics.classes();
        let scores: Vec<_> =
            PairEnumerator::new(PairScorer::new(&indices, &config), &classes).collect();

        prop_assert_eq!(scores.len() as u64, total_pairs(classes.len()));
        let mut seen = AHashSet::new();
        for s in &scores {
            prop_assert!(s.class_a != s.class_b);
            let key = if s.class_a < s.class_b {
                (s.class_a.clone(), s.class_b.clone())
            } else {
                (s.class_b.clone(), s.class_a.clone())
            };
            prop_assert!(seen.insert(key), "pair visited twice");
        }
    }

    #[test]
    fn prop_batched_export_matches_single_pass(tables in tables(), batch in 1usize..8) {
        let indices = CouplingIndices::build(tables).unwrap();
        let config = ScoringConfig::default();
        let classes = indices.metrics.classes();
        let scorer = PairScorer::new(&indices, &config);

        let dir = tempfile::TempDir::new().unwrap();
        let batched = dir.path().join("batched.csv");
        let single = dir.path().join("single.csv");
        export_scores(PairEnumerator::new(scorer, &classes), &batched, batch).unwrap();
        export_scores(PairEnumerator::new(scorer, &classes), &single, usize::MAX).unwrap();

        prop_assert_eq!(
            std::fs::read(&batched).unwrap(),
            std::fs::read(&single).unwrap()
        );
    }
}
