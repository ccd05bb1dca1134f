use serde::{Deserialize, Serialize};

/// Co-change statistics for one pair of classes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoChangeStats {
    /// Frequency relative to the most frequent pair, in [0, 1]
    pub support: f64,
    /// Conditional co-change probability, in [0, 1]
    pub confidence: f64,
    /// Number of commits where both classes changed
    pub commits: u64,
}

/// One row of the co-change table.
///
/// `support` and `confidence` are optional in the input; the loader derives
/// them from `commits` when the columns are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoChangeRecord {
    pub class_a: String,
    pub class_b: String,
    pub commits: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl CoChangeRecord {
    pub fn new(class_a: impl Into<String>, class_b: impl Into<String>, commits: u64) -> Self {
        Self {
            class_a: class_a.into(),
            class_b: class_b.into(),
            commits,
            support: None,
            confidence: None,
        }
    }

    pub fn with_ratios(mut self, support: f64, confidence: f64) -> Self {
        self.support = Some(support);
        self.confidence = Some(confidence);
        self
    }
}
