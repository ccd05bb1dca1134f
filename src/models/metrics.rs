use serde::{Deserialize, Serialize};

/// Structural metrics of a single class, one row of the metrics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class identifier (unique within a table)
    pub class: String,
    /// Coupling between objects
    pub cbo: f64,
    /// Depth of inheritance tree
    pub dit: f64,
    /// Lack of cohesion of methods (carried, not scored)
    pub lcom: f64,
    /// Response for class
    pub rfc: f64,
}

impl ClassMetrics {
    pub fn new(class: impl Into<String>, cbo: f64, rfc: f64, dit: f64) -> Self {
        Self {
            class: class.into(),
            cbo,
            dit,
            lcom: 0.0,
            rfc,
        }
    }
}
