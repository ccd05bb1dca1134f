//! Offline reports over finished runs: the score distribution of one
//! project and rankings across projects.

use anyhow::{Result, bail};
use serde::Serialize;
use std::path::Path;

use crate::engine::export::{ScoreReader, TopScores, read_statistics};
use crate::engine::stats::ComponentAccumulator;
use crate::error::{CouplingError, ErrorCode};
use crate::models::score::DependencyScore;
use crate::models::statistics::{ComponentStats, ProjectStatistics};

/// Hybrid-score percentiles reported by [`ScoreAnalysis`].
pub const PERCENTILES: [u8; 6] = [25, 50, 75, 90, 95, 99];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Percentile {
    pub percentile: u8,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Share {
    pub count: u64,
    pub pct: f64,
}

/// Which components contribute to each pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ComponentBreakdown {
    pub only_structural: Share,
    pub only_logical: Share,
    pub both: Share,
    pub none: Share,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationReading {
    /// r < 0.3
    Complementary,
    Moderate,
    /// r > 0.7
    Redundant,
}

impl CorrelationReading {
    pub fn of(r: f64) -> Self {
        if r < 0.3 {
            Self::Complementary
        } else if r > 0.7 {
            Self::Redundant
        } else {
            Self::Moderate
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Correlation {
    pub coefficient: f64,
    pub reading: CorrelationReading,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrongPair {
    pub class_a: String,
    pub class_b: String,
    pub hybrid_score: f64,
    pub structural_score: f64,
    pub logical_score: f64,
    pub has_direct_dependency: bool,
    pub commits: u64,
}

impl From<DependencyScore> for StrongPair {
    fn from(score: DependencyScore) -> Self {
        Self {
            has_direct_dependency: score
                .metrics
                .structural
                .is_some_and(|m| m.has_direct_dependency),
            commits: score.metrics.logical.commits,
            class_a: score.class_a,
            class_b: score.class_b,
            hybrid_score: score.hybrid_score,
            structural_score: score.structural_score,
            logical_score: score.logical_score,
        }
    }
}

/// Distribution of one project's scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreAnalysis {
    pub pairs: u64,
    pub strong_couplings: u64,
    pub hybrid: ComponentStats,
    pub structural: ComponentStats,
    pub logical: ComponentStats,
    pub percentiles: Vec<Percentile>,
    pub breakdown: ComponentBreakdown,
    /// Pearson r of structural vs logical; only when some pair has both
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Correlation>,
    /// Strongest couplings, strongest first
    pub strongest: Vec<StrongPair>,
}

/// Running co-moment of two components.
#[derive(Debug, Default)]
struct CoMoment {
    n: u64,
    mean_x: f64,
    mean_y: f64,
    c: f64,
}

impl CoMoment {
    fn push(&mut self, x: f64, y: f64) {
        self.n += 1;
        let dx = x - self.mean_x;
        self.mean_x += dx / self.n as f64;
        self.mean_y += (y - self.mean_y) / self.n as f64;
        self.c += dx * (y - self.mean_y);
    }

    /// Population covariance.
    fn covariance(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.c / self.n as f64
        }
    }
}

/// Linear interpolation between closest ranks over ascending `sorted`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p / 100.0).clamp(0.0, 1.0) * last as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

fn share(count: u64, total: u64) -> Share {
    Share {
        count,
        pct: if total == 0 {
            0.0
        } else {
            count as f64 / total as f64 * 100.0
        },
    }
}

#[derive(Debug)]
struct Analyzer {
    hybrid: ComponentAccumulator,
    structural: ComponentAccumulator,
    logical: ComponentAccumulator,
    co_moment: CoMoment,
    strong: u64,
    only_structural: u64,
    only_logical: u64,
    both: u64,
    strongest: TopScores,
}

impl Analyzer {
    fn new(top: usize) -> Self {
        Self {
            hybrid: ComponentAccumulator::new(true, 0),
            structural: ComponentAccumulator::new(true, 0),
            logical: ComponentAccumulator::new(true, 0),
            co_moment: CoMoment::default(),
            strong: 0,
            only_structural: 0,
            only_logical: 0,
            both: 0,
            strongest: TopScores::new(top),
        }
    }

    fn record(&mut self, score: DependencyScore) {
        let (s, l) = (score.structural_score, score.logical_score);
        self.hybrid.push(score.hybrid_score);
        self.structural.push(s);
        self.logical.push(l);
        self.co_moment.push(s, l);
        match (s > 0.0, l > 0.0) {
            (true, true) => self.both += 1,
            (true, false) => self.only_structural += 1,
            (false, true) => self.only_logical += 1,
            (false, false) => {}
        }
        if score.is_strong_coupling {
            self.strong += 1;
            self.strongest.offer(score);
        }
    }

    fn finish(mut self) -> ScoreAnalysis {
        let pairs = self.hybrid.count();
        let none = pairs - self.only_structural - self.only_logical - self.both;

        let percentiles: Vec<Percentile> = match self.hybrid.sorted_values() {
            Some(sorted) => PERCENTILES
                .iter()
                .filter_map(|&p| {
                    percentile(sorted, f64::from(p)).map(|value| Percentile {
                        percentile: p,
                        value,
                    })
                })
                .collect(),
            None => Vec::new(),
        };

        let correlation = if self.both > 0 {
            let spread = (self.structural.variance() * self.logical.variance()).sqrt();
            (spread > 0.0).then(|| {
                let coefficient = (self.co_moment.covariance() / spread).clamp(-1.0, 1.0);
                Correlation {
                    coefficient,
                    reading: CorrelationReading::of(coefficient),
                }
            })
        } else {
            None
        };

        ScoreAnalysis {
            pairs,
            strong_couplings: self.strong,
            hybrid: self.hybrid.summary(),
            structural: self.structural.summary(),
            logical: self.logical.summary(),
            percentiles,
            breakdown: ComponentBreakdown {
                only_structural: share(self.only_structural, pairs),
                only_logical: share(self.only_logical, pairs),
                both: share(self.both, pairs),
                none: share(none, pairs),
            },
            correlation,
            strongest: self
                .strongest
                .into_sorted()
                .into_iter()
                .map(StrongPair::from)
                .collect(),
        }
    }
}

/// Analyze a score sequence. Every component value is kept for the
/// percentiles and medians.
pub fn analyze<I>(scores: I, top: usize) -> Result<ScoreAnalysis>
where
    I: IntoIterator<Item = Result<DependencyScore>>,
{
    let mut analyzer = Analyzer::new(top);
    for score in scores {
        analyzer.record(score?);
    }
    if analyzer.hybrid.count() == 0 {
        bail!(CouplingError::new(
            ErrorCode::InvalidRequest,
            "no scores to analyze",
        ));
    }
    Ok(analyzer.finish())
}

/// Analyze a saved `all_scores.bin`.
pub fn analyze_file(path: &Path, top: usize) -> Result<ScoreAnalysis> {
    analyze(ScoreReader::open(path)?, top)
}

// ---------------------------------------------------------------------------
// Cross-project comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked {
    pub project: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrongRanked {
    pub project: String,
    pub strong_couplings: u64,
    pub strong_coupling_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonTotals {
    pub projects: usize,
    pub classes: u64,
    pub pairs: u64,
    pub strong_couplings: u64,
    /// Unweighted mean of the per-project percentages
    pub mean_strong_coupling_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectComparison {
    pub by_strong_couplings: Vec<StrongRanked>,
    pub by_hybrid_mean: Vec<Ranked>,
    pub by_structural_mean: Vec<Ranked>,
    pub by_logical_mean: Vec<Ranked>,
    pub totals: ComparisonTotals,
}

fn rank_by(
    rows: &[ProjectStatistics],
    limit: usize,
    key: fn(&ProjectStatistics) -> f64,
) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = rows
        .iter()
        .map(|r| Ranked {
            project: r.project.clone(),
            value: key(r),
        })
        .collect();
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
    ranked.truncate(limit);
    ranked
}

/// Rankings (top `limit` each) and totals over consolidated statistics.
pub fn compare(rows: &[ProjectStatistics], limit: usize) -> Result<ProjectComparison> {
    if rows.is_empty() {
        bail!(CouplingError::new(
            ErrorCode::InvalidRequest,
            "no projects to compare",
        ));
    }

    let mut by_strong: Vec<&ProjectStatistics> = rows.iter().collect();
    by_strong.sort_by(|a, b| b.strong_couplings.cmp(&a.strong_couplings));
    let by_strong_couplings = by_strong
        .into_iter()
        .take(limit)
        .map(|r| StrongRanked {
            project: r.project.clone(),
            strong_couplings: r.strong_couplings,
            strong_coupling_pct: r.strong_coupling_pct,
        })
        .collect();

    let totals = ComparisonTotals {
        projects: rows.len(),
        classes: rows.iter().map(|r| r.total_classes as u64).sum(),
        pairs: rows.iter().map(|r| r.total_pairs).sum(),
        strong_couplings: rows.iter().map(|r| r.strong_couplings).sum(),
        mean_strong_coupling_pct: rows.iter().map(|r| r.strong_coupling_pct).sum::<f64>()
            / rows.len() as f64,
    };

    Ok(ProjectComparison {
        by_strong_couplings,
        by_hybrid_mean: rank_by(rows, limit, |r| r.hybrid_mean),
        by_structural_mean: rank_by(rows, limit, |r| r.structural_mean),
        by_logical_mean: rank_by(rows, limit, |r| r.logical_mean),
        totals,
    })
}

/// Compare the projects of a `consolidated_statistics.csv`.
pub fn compare_file(path: &Path, limit: usize) -> Result<ProjectComparison> {
    if !path.exists() {
        bail!(CouplingError::file_not_found(&path.display().to_string()));
    }
    compare(&read_statistics(path)?, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::score::{LogicalMetrics, PairMetrics, StructuralMetrics};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn score(a: &str, structural: f64, logical: f64, commits: u64) -> DependencyScore {
        let hybrid = 0.5 * structural + 0.5 * logical;
        DependencyScore {
            class_a: a.into(),
            class_b: format!("{a}Peer"),
            structural_score: structural,
            logical_score: logical,
            hybrid_score: hybrid,
            is_strong_coupling: hybrid >= 0.7,
            metrics: PairMetrics {
                structural: Some(StructuralMetrics {
                    cbo_a: 1.0,
                    cbo_b: 2.0,
                    rfc_a: 3.0,
                    rfc_b: 4.0,
                    dit_a: 0.0,
                    dit_b: 1.0,
                    has_direct_dependency: structural >= 0.9,
                }),
                logical: LogicalMetrics {
                    commits,
                    ..LogicalMetrics::default()
                },
            },
        }
    }

    fn sample() -> Vec<DependencyScore> {
        vec![
            score("A", 0.2, 0.0, 0),
            score("B", 0.0, 0.4, 3),
            score("C", 0.6, 0.8, 12),
            score("D", 0.0, 0.0, 0),
            score("E", 1.0, 1.0, 30),
        ]
    }

    fn stats(
        project: &str,
        classes: usize,
        strong: u64,
        pct: f64,
        hybrid: f64,
    ) -> ProjectStatistics {
        ProjectStatistics {
            project: project.into(),
            total_classes: classes,
            analyzed_classes: classes,
            total_pairs: (classes * (classes - 1) / 2) as u64,
            strong_couplings: strong,
            strong_coupling_pct: pct,
            hybrid_mean: hybrid,
            hybrid_median: None,
            hybrid_std: 0.0,
            hybrid_min: 0.0,
            hybrid_max: 1.0,
            structural_mean: 1.0 - hybrid,
            structural_median: None,
            structural_std: 0.0,
            structural_min: 0.0,
            structural_max: 1.0,
            logical_mean: hybrid / 2.0,
            logical_median: None,
            logical_std: 0.0,
            logical_min: 0.0,
            logical_max: 1.0,
            has_dependencies: true,
            has_co_changes: true,
        }
    }

    #[test]
    fn percentiles_interpolate_linearly() {
        let sorted = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 25.0), Some(1.0));
        assert!(close(percentile(&sorted, 90.0).unwrap(), 3.6));
        assert_eq!(percentile(&sorted, 100.0), Some(4.0));
        assert_eq!(percentile(&[7.0], 99.0), Some(7.0));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn breakdown_counts_contributing_components() {
        let analysis = analyze(sample().into_iter().map(Ok), 10).unwrap();
        assert_eq!(analysis.pairs, 5);
        let b = analysis.breakdown;
        assert_eq!(
            (b.only_structural.count, b.only_logical.count, b.both.count, b.none.count),
            (1, 1, 2, 1)
        );
        assert!(close(b.both.pct, 40.0));
        assert!(close(
            b.only_structural.pct + b.only_logical.pct + b.both.pct + b.none.pct,
            100.0
        ));
    }

    #[test]
    fn distribution_and_strongest_pairs() {
        let analysis = analyze(sample().into_iter().map(Ok), 1).unwrap();
        // hybrid: 0.1, 0.2, 0.7, 0.0, 1.0
        assert_eq!(analysis.hybrid.median, Some(0.2));
        assert_eq!(analysis.hybrid.max, 1.0);
        assert_eq!(analysis.percentiles.len(), PERCENTILES.len());
        assert_eq!(analysis.percentiles[1].percentile, 50);
        assert_eq!(analysis.percentiles[1].value, 0.2);
        assert_eq!(analysis.strong_couplings, 2);

        assert_eq!(analysis.strongest.len(), 1);
        let top = &analysis.strongest[0];
        assert_eq!(top.class_a, "E");
        assert!(top.has_direct_dependency);
        assert_eq!(top.commits, 30);
    }

    #[test]
    fn correlation_matches_pearson() {
        let scores = sample();
        let xs: Vec<f64> = scores.iter().map(|s| s.structural_score).collect();
        let ys: Vec<f64> = scores.iter().map(|s| s.logical_score).collect();
        let n = xs.len() as f64;
        let (mx, my) = (xs.iter().sum::<f64>() / n, ys.iter().sum::<f64>() / n);
        let cov: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - mx) * (y - my)).sum();
        let vx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
        let vy: f64 = ys.iter().map(|y| (y - my).powi(2)).sum();
        let expected = cov / (vx * vy).sqrt();

        let analysis = analyze(scores.into_iter().map(Ok), 10).unwrap();
        let correlation = analysis.correlation.unwrap();
        assert!(close(correlation.coefficient, expected));
        assert_eq!(correlation.reading, CorrelationReading::of(expected));
    }

    #[test]
    fn correlation_needs_pairs_with_both_components() {
        let scores = vec![score("A", 0.2, 0.0, 0), score("B", 0.0, 0.4, 3)];
        let analysis = analyze(scores.into_iter().map(Ok), 10).unwrap();
        assert!(analysis.correlation.is_none());
        assert!(analysis.strongest.is_empty());
    }

    #[test]
    fn correlation_readings() {
        assert_eq!(CorrelationReading::of(0.1), CorrelationReading::Complementary);
        assert_eq!(CorrelationReading::of(0.5), CorrelationReading::Moderate);
        assert_eq!(CorrelationReading::of(0.9), CorrelationReading::Redundant);
    }

    #[test]
    fn empty_sequence_rejected() {
        let err = analyze(Vec::new(), 10).unwrap_err();
        assert_eq!(crate::error::error_code(&err), Some(ErrorCode::InvalidRequest));
    }

    #[test]
    fn read_error_propagates() {
        let scores = vec![
            Ok(score("A", 0.2, 0.0, 0)),
            Err(anyhow::Error::from(CouplingError::new(
                ErrorCode::SerializationError,
                "truncated",
            ))),
        ];
        let err = analyze(scores, 10).unwrap_err();
        assert_eq!(
            crate::error::error_code(&err),
            Some(ErrorCode::SerializationError)
        );
    }

    #[test]
    fn comparison_rankings_and_totals() {
        let rows = vec![
            stats("alpha", 4, 1, 16.0, 0.2),
            stats("beta", 5, 3, 30.0, 0.6),
            stats("gamma", 3, 0, 0.0, 0.4),
        ];
        let cmp = compare(&rows, 2).unwrap();

        let names = |r: &[Ranked]| r.iter().map(|r| r.project.clone()).collect::<Vec<_>>();
        assert_eq!(cmp.by_strong_couplings.len(), 2);
        assert_eq!(cmp.by_strong_couplings[0].project, "beta");
        assert_eq!(cmp.by_strong_couplings[0].strong_coupling_pct, 30.0);
        assert_eq!(names(&cmp.by_hybrid_mean), vec!["beta", "gamma"]);
        assert_eq!(names(&cmp.by_structural_mean), vec!["alpha", "gamma"]);
        assert_eq!(names(&cmp.by_logical_mean), vec!["beta", "gamma"]);

        assert_eq!(cmp.totals.projects, 3);
        assert_eq!(cmp.totals.classes, 12);
        assert_eq!(cmp.totals.pairs, 6 + 10 + 3);
        assert_eq!(cmp.totals.strong_couplings, 4);
        assert!(close(cmp.totals.mean_strong_coupling_pct, 46.0 / 3.0));
    }

    #[test]
    fn comparison_needs_rows() {
        let err = compare(&[], 10).unwrap_err();
        assert_eq!(crate::error::error_code(&err), Some(ErrorCode::InvalidRequest));
    }
}
