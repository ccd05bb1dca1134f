//! Read-only lookup structures built once per run.
//!
//! Pair indices store each unordered pair once, keyed by its canonical
//! orientation (lexicographically smaller identifier first), in a nested map
//! so a lookup by `&str` never allocates.

use ahash::{AHashMap, AHashSet};
use anyhow::{Result, bail};
use tracing::debug;

use crate::engine::loader::Tables;
use crate::error::{CouplingError, ErrorCode};
use crate::models::cochange::{CoChangeRecord, CoChangeStats};
use crate::models::dependency::DependencyEdge;
use crate::models::metrics::ClassMetrics;

/// Order a pair so that `(a, b)` and `(b, a)` map to the same key.
pub fn canonical<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

// ---------------------------------------------------------------------------
// Metric index
// ---------------------------------------------------------------------------

/// Class identifier → structural metrics, preserving table order.
#[derive(Debug, Default)]
pub struct MetricIndex {
    rows: Vec<ClassMetrics>,
    positions: AHashMap<String, usize>,
}

impl MetricIndex {
    /// Build the index. Duplicate identifiers are rejected.
    pub fn build(rows: Vec<ClassMetrics>) -> Result<Self> {
        let mut positions = AHashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if positions.insert(row.class.clone(), i).is_some() {
                bail!(CouplingError::new(
                    ErrorCode::MalformedInput,
                    format!("duplicate class in metrics table: {}", row.class),
                ));
            }
        }
        debug!(classes = rows.len(), "metric index built");
        Ok(Self { rows, positions })
    }

    pub fn get(&self, class: &str) -> Option<&ClassMetrics> {
        self.positions.get(class).map(|&i| &self.rows[i])
    }

    /// All rows in table order.
    pub fn rows(&self) -> &[ClassMetrics] {
        &self.rows
    }

    /// Class identifiers in table order.
    pub fn classes(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.class.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Dependency index
// ---------------------------------------------------------------------------

/// Symmetric membership test for explicit structural dependencies.
#[derive(Debug, Default)]
pub struct DependencyIndex {
    pairs: AHashMap<String, AHashSet<String>>,
    len: usize,
}

impl DependencyIndex {
    pub fn build(edges: &[DependencyEdge]) -> Self {
        let mut index = Self::default();
        for edge in edges {
            let (lo, hi) = canonical(&edge.source, &edge.target);
            if index
                .pairs
                .entry(lo.to_string())
                .or_default()
                .insert(hi.to_string())
            {
                index.len += 1;
            }
        }
        debug!(rows = edges.len(), pairs = index.len, "dependency index built");
        index
    }

    /// An absent table yields an empty index.
    pub fn from_optional(edges: Option<&[DependencyEdge]>) -> Self {
        edges.map(Self::build).unwrap_or_default()
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        let (lo, hi) = canonical(a, b);
        self.pairs.get(lo).is_some_and(|set| set.contains(hi))
    }

    /// Number of distinct unordered pairs.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// ---------------------------------------------------------------------------
// Co-change index
// ---------------------------------------------------------------------------

/// Symmetric pair → co-change statistics map.
#[derive(Debug, Default)]
pub struct CoChangeIndex {
    pairs: AHashMap<String, AHashMap<String, CoChangeStats>>,
    len: usize,
}

impl CoChangeIndex {
    /// Build the index, deriving `support` as `commits / max(commits)` and
    /// `confidence` as `support` where the table does not supply them.
    /// A later row for the same unordered pair replaces an earlier one.
    pub fn build(records: &[CoChangeRecord]) -> Result<Self> {
        let max_commits = records.iter().map(|r| r.commits).max().unwrap_or(0);
        let mut index = Self::default();

        for record in records {
            let support = match record.support {
                Some(s) => check_ratio(s, "support", record)?,
                None if max_commits == 0 => 0.0,
                None => record.commits as f64 / max_commits as f64,
            };
            let confidence = match record.confidence {
                Some(c) => check_ratio(c, "confidence", record)?,
                None => support,
            };
            let stats = CoChangeStats {
                support,
                confidence,
                commits: record.commits,
            };

            let (lo, hi) = canonical(&record.class_a, &record.class_b);
            if index
                .pairs
                .entry(lo.to_string())
                .or_default()
                .insert(hi.to_string(), stats)
                .is_none()
            {
                index.len += 1;
            }
        }
        debug!(
            rows = records.len(),
            pairs = index.len,
            max_commits = max_commits,
            "co-change index built"
        );
        Ok(index)
    }

    /// An absent table yields an empty index.
    pub fn from_optional(records: Option<&[CoChangeRecord]>) -> Result<Self> {
        match records {
            Some(r) => Self::build(r),
            None => Ok(Self::default()),
        }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<&CoChangeStats> {
        let (lo, hi) = canonical(a, b);
        self.pairs.get(lo).and_then(|m| m.get(hi))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The indices of one run. Built all at once so a failing table leaves no
/// partially indexed state behind.
#[derive(Debug, Default)]
pub struct CouplingIndices {
    pub metrics: MetricIndex,
    pub dependencies: DependencyIndex,
    pub co_changes: CoChangeIndex,
    /// Whether a dependency table was supplied at all
    pub has_dependencies: bool,
    /// Whether a co-change table was supplied at all
    pub has_co_changes: bool,
}

impl CouplingIndices {
    pub fn build(tables: Tables) -> Result<Self> {
        let dependencies = DependencyIndex::from_optional(tables.dependencies.as_deref());
        let co_changes = CoChangeIndex::from_optional(tables.co_changes.as_deref())?;
        let metrics = MetricIndex::build(tables.metrics)?;
        Ok(Self {
            metrics,
            dependencies,
            co_changes,
            has_dependencies: tables.dependencies.is_some(),
            has_co_changes: tables.co_changes.is_some(),
        })
    }
}

fn check_ratio(value: f64, name: &str, record: &CoChangeRecord) -> Result<f64> {
    if !(0.0..=1.0).contains(&value) {
        bail!(CouplingError::new(
            ErrorCode::MalformedInput,
            format!(
                "{name} for ({}, {}) must be within [0, 1], got {value}",
                record.class_a, record.class_b
            ),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_code;

    #[test]
    fn metric_lookup_and_order() {
        let index = MetricIndex::build(vec![
            ClassMetrics::new("B", 1.0, 2.0, 0.0),
            ClassMetrics::new("A", 3.0, 4.0, 1.0),
        ])
        .unwrap();
        assert_eq!(index.classes(), vec!["B", "A"]);
        assert_eq!(index.get("A").map(|m| m.cbo), Some(3.0));
        assert!(index.get("Missing").is_none());
    }

    #[test]
    fn metric_duplicates_rejected() {
        let err = MetricIndex::build(vec![
            ClassMetrics::new("A", 1.0, 2.0, 0.0),
            ClassMetrics::new("A", 3.0, 4.0, 1.0),
        ])
        .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::MalformedInput));
    }

    #[test]
    fn dependency_lookup_is_order_independent() {
        let index = DependencyIndex::build(&[
            DependencyEdge::new("Zeta", "Alpha"),
            DependencyEdge::new("Alpha", "Zeta"),
            DependencyEdge::new("Alpha", "Beta"),
        ]);
        assert!(index.contains("Alpha", "Zeta"));
        assert!(index.contains("Zeta", "Alpha"));
        assert!(index.contains("Beta", "Alpha"));
        assert!(!index.contains("Beta", "Zeta"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn absent_dependency_table_is_empty() {
        let index = DependencyIndex::from_optional(None);
        assert!(index.is_empty());
        assert!(!index.contains("A", "B"));
    }

    #[test]
    fn co_change_support_derived_from_max_commits() {
        let index = CoChangeIndex::build(&[
            CoChangeRecord::new("A", "B", 10),
            CoChangeRecord::new("C", "A", 5),
        ])
        .unwrap();
        let ab = index.get("B", "A").unwrap();
        assert_eq!(ab.support, 1.0);
        assert_eq!(ab.confidence, 1.0);
        let ac = index.get("A", "C").unwrap();
        assert_eq!(ac.support, 0.5);
        assert_eq!(ac.confidence, 0.5);
        assert_eq!(ac.commits, 5);
        assert!(index.get("B", "C").is_none());
    }

    #[test]
    fn co_change_supplied_ratios_kept() {
        let index =
            CoChangeIndex::build(&[CoChangeRecord::new("A", "B", 12).with_ratios(0.9, 0.8)])
                .unwrap();
        let s = index.get("A", "B").unwrap();
        assert_eq!((s.support, s.confidence, s.commits), (0.9, 0.8, 12));
    }

    #[test]
    fn co_change_zero_commits_gives_zero_support() {
        let index = CoChangeIndex::build(&[CoChangeRecord::new("A", "B", 0)]).unwrap();
        assert_eq!(index.get("A", "B").unwrap().support, 0.0);
    }

    #[test]
    fn co_change_out_of_range_ratio_rejected() {
        let err =
            CoChangeIndex::build(&[CoChangeRecord::new("A", "B", 1).with_ratios(1.5, 0.2)])
                .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::MalformedInput));
    }

    #[test]
    fn co_change_reversed_duplicate_replaces() {
        let index = CoChangeIndex::build(&[
            CoChangeRecord::new("A", "B", 2),
            CoChangeRecord::new("B", "A", 4),
        ])
        .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("A", "B").unwrap().commits, 4);
    }
}
