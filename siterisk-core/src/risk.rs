//! Total score and risk-level classification
//!
//! Global invariants enforced:
//! - Deterministic, pure calculations over axis scores
//! - Totals are finite and clamped to the policy scale
//! - Classification is monotonic in the score

use crate::policy::ScoringPolicy;
use serde::{Deserialize, Serialize};

/// Discrete risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No answer contributed a score; distinct from a genuinely low risk
    Unevaluated,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Unevaluated => "unevaluated",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Lower bounds of the medium and high levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        LevelThresholds {
            medium: 2.0,
            high: 4.0,
        }
    }
}

/// Assign a level: `score >= high` is high, `score >= medium` is medium
pub fn classify(score: f64, thresholds: &LevelThresholds) -> RiskLevel {
    if score >= thresholds.high {
        RiskLevel::High
    } else if score >= thresholds.medium {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Round to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Axis-product total: `probability × impact / mitigation`
///
/// A zero, negative or non-finite mitigation score is replaced by the
/// policy's neutral divisor. The result is clamped to the scale.
pub fn axis_product(policy: &ScoringPolicy, probability: f64, impact: f64, mitigation: f64) -> f64 {
    let divisor = policy.safe_mitigation(mitigation);
    let raw = (probability * impact) / divisor;
    if raw.is_finite() {
        policy.scale.clamp(raw)
    } else {
        policy.neutral_score
    }
}

/// Weighted section sum: `Σ score × weight / Σ weight`
///
/// Only sections that produced a score take part, so a section nobody has
/// answered does not drag the total toward zero. Returns `None` when no
/// section carries positive weight.
pub fn weighted_section_sum(policy: &ScoringPolicy, sections: &[(f64, f64)]) -> Option<f64> {
    let total_weight: f64 = sections.iter().map(|(_, w)| w.max(0.0)).sum();
    if total_weight <= 0.0 {
        return None;
    }
    let sum: f64 = sections.iter().map(|(s, w)| s * w.max(0.0)).sum();
    Some(policy.scale.clamp(sum / total_weight))
}
