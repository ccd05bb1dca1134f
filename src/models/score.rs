use serde::{Deserialize, Serialize};

/// Raw structural values a structural score was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructuralMetrics {
    pub cbo_a: f64,
    pub cbo_b: f64,
    pub rfc_a: f64,
    pub rfc_b: f64,
    pub dit_a: f64,
    pub dit_b: f64,
    pub has_direct_dependency: bool,
}

/// Co-change values a logical score was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LogicalMetrics {
    pub support: f64,
    pub confidence: f64,
    pub commits: u64,
}

/// Diagnostics attached to a score.
///
/// `structural` is `None` when either class has no metrics row. Always
/// serialized (no skipped fields) so the binary stream stays decodable.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PairMetrics {
    pub structural: Option<StructuralMetrics>,
    pub logical: LogicalMetrics,
}

/// Coupling score of one unordered class pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyScore {
    pub class_a: String,
    pub class_b: String,
    pub structural_score: f64,
    pub logical_score: f64,
    pub hybrid_score: f64,
    pub is_strong_coupling: bool,
    pub metrics: PairMetrics,
}

/// Column layout of a score table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreLayout {
    /// Every column
    Full,
    /// Strong-coupling table: `is_strong_coupling` is implied and left out
    Strong,
}

impl DependencyScore {
    pub fn to_row(&self, layout: ScoreLayout) -> ScoreRow<'_> {
        let s = self.metrics.structural;
        let l = self.metrics.logical;
        ScoreRow {
            class_a: &self.class_a,
            class_b: &self.class_b,
            hybrid_score: self.hybrid_score,
            structural_score: self.structural_score,
            logical_score: self.logical_score,
            is_strong_coupling: match layout {
                ScoreLayout::Full => Some(self.is_strong_coupling),
                ScoreLayout::Strong => None,
            },
            cbo_a: s.map(|m| m.cbo_a),
            cbo_b: s.map(|m| m.cbo_b),
            rfc_a: s.map(|m| m.rfc_a),
            rfc_b: s.map(|m| m.rfc_b),
            dit_a: s.map(|m| m.dit_a),
            dit_b: s.map(|m| m.dit_b),
            has_direct_dependency: s.map(|m| m.has_direct_dependency),
            support: l.support,
            confidence: l.confidence,
            commits: l.commits,
        }
    }
}

/// Flat tabular form of a [`DependencyScore`].
///
/// Structural columns are left empty when the pair had no metrics.
/// `is_strong_coupling` is `None` only in the [`ScoreLayout::Strong`] layout,
/// where the column does not exist.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRow<'a> {
    pub class_a: &'a str,
    pub class_b: &'a str,
    pub hybrid_score: f64,
    pub structural_score: f64,
    pub logical_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_strong_coupling: Option<bool>,
    pub cbo_a: Option<f64>,
    pub cbo_b: Option<f64>,
    pub rfc_a: Option<f64>,
    pub rfc_b: Option<f64>,
    pub dit_a: Option<f64>,
    pub dit_b: Option<f64>,
    pub has_direct_dependency: Option<bool>,
    pub support: f64,
    pub confidence: f64,
    pub commits: u64,
}
