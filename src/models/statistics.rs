use serde::{Deserialize, Serialize};

/// Distribution summary of one score component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentStats {
    pub mean: f64,
    /// `None` when the run did not keep every value
    pub median: Option<f64>,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Summary of one scored project, one row of `statistics.csv`.
///
/// Kept flat so it maps directly onto a CSV row. Medians are empty cells
/// when median tracking was off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatistics {
    pub project: String,
    /// Classes in the metrics table
    pub total_classes: usize,
    /// Classes actually paired (after the class cap)
    pub analyzed_classes: usize,
    pub total_pairs: u64,
    pub strong_couplings: u64,
    pub strong_coupling_pct: f64,
    pub hybrid_mean: f64,
    pub hybrid_median: Option<f64>,
    pub hybrid_std: f64,
    pub hybrid_min: f64,
    pub hybrid_max: f64,
    pub structural_mean: f64,
    pub structural_median: Option<f64>,
    pub structural_std: f64,
    pub structural_min: f64,
    pub structural_max: f64,
    pub logical_mean: f64,
    pub logical_median: Option<f64>,
    pub logical_std: f64,
    pub logical_min: f64,
    pub logical_max: f64,
    pub has_dependencies: bool,
    pub has_co_changes: bool,
}

impl ProjectStatistics {
    pub fn hybrid(&self) -> ComponentStats {
        ComponentStats {
            mean: self.hybrid_mean,
            median: self.hybrid_median,
            std: self.hybrid_std,
            min: self.hybrid_min,
            max: self.hybrid_max,
        }
    }
}
