//! Scoring configuration: combiner weights, strong-coupling threshold and
//! the multiplicative boost policy.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::error::CouplingError;

/// Allowed deviation of `structural_weight + logical_weight` from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Unvalidated combiner weights as read from config or CLI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub structural_weight: f64,
    pub logical_weight: f64,
    pub coupling_threshold: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            structural_weight: 0.5,
            logical_weight: 0.5,
            coupling_threshold: 0.7,
        }
    }
}

/// Multiplicative boosts applied before clamping to 1.0.
///
/// Defaults are hand-tuned, not learned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostPolicy {
    /// Structural boost when an explicit dependency exists
    pub dependency_factor: f64,
    /// Commits strictly above this get `strong_commit_factor`
    pub strong_commits: u64,
    pub strong_commit_factor: f64,
    /// Commits strictly above this (and not above `strong_commits`) get `moderate_commit_factor`
    pub moderate_commits: u64,
    pub moderate_commit_factor: f64,
}

impl Default for BoostPolicy {
    fn default() -> Self {
        Self {
            dependency_factor: 1.5,
            strong_commits: 10,
            strong_commit_factor: 1.3,
            moderate_commits: 5,
            moderate_commit_factor: 1.15,
        }
    }
}

impl BoostPolicy {
    pub fn validate(&self) -> Result<()> {
        for (name, factor) in [
            ("dependency_factor", self.dependency_factor),
            ("strong_commit_factor", self.strong_commit_factor),
            ("moderate_commit_factor", self.moderate_commit_factor),
        ] {
            if !factor.is_finite() || factor < 1.0 {
                bail!(CouplingError::invalid_config(format!(
                    "{name} must be a finite value >= 1.0, got {factor}"
                )));
            }
        }
        if self.moderate_commits > self.strong_commits {
            bail!(CouplingError::invalid_config(format!(
                "moderate_commits ({}) must not exceed strong_commits ({})",
                self.moderate_commits, self.strong_commits
            )));
        }
        Ok(())
    }

    /// Boost factor earned by a pair seen in `commits` commits.
    pub fn commit_factor(&self, commits: u64) -> f64 {
        if commits > self.strong_commits {
            self.strong_commit_factor
        } else if commits > self.moderate_commits {
            self.moderate_commit_factor
        } else {
            1.0
        }
    }
}

/// Validated scoring configuration. Only constructible through [`ScoringConfig::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    weights: Weights,
    boost: BoostPolicy,
}

impl ScoringConfig {
    pub fn new(weights: Weights, boost: BoostPolicy) -> Result<Self> {
        let Weights {
            structural_weight: s,
            logical_weight: l,
            coupling_threshold: t,
        } = weights;
        for (name, value) in [
            ("structural_weight", s),
            ("logical_weight", l),
            ("coupling_threshold", t),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                bail!(CouplingError::invalid_config(format!(
                    "{name} must be a finite value in [0.0, 1.0], got {value}"
                )));
            }
        }
        if ((s + l) - 1.0).abs() > WEIGHT_TOLERANCE {
            bail!(CouplingError::invalid_config(format!(
                "structural_weight + logical_weight must sum to 1.0, got {s} + {l} = {}",
                s + l
            )));
        }
        boost.validate()?;
        Ok(Self { weights, boost })
    }

    pub fn from_weights(structural: f64, logical: f64, threshold: f64) -> Result<Self> {
        Self::new(
            Weights {
                structural_weight: structural,
                logical_weight: logical,
                coupling_threshold: threshold,
            },
            BoostPolicy::default(),
        )
    }

    pub fn structural_weight(&self) -> f64 {
        self.weights.structural_weight
    }

    pub fn logical_weight(&self) -> f64 {
        self.weights.logical_weight
    }

    pub fn coupling_threshold(&self) -> f64 {
        self.weights.coupling_threshold
    }

    pub fn boost(&self) -> &BoostPolicy {
        &self.boost
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            boost: BoostPolicy::default(),
        }
    }
}
