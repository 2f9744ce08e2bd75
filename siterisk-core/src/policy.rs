//! Scoring policy
//!
//! One policy value decides scale, total formula, multiselect strategy and
//! neutral defaults for a whole computation. Two formulas are supported:
//!
//! - `AxisProduct` (default): `total = probability × impact / mitigation`
//!   on the 1-5 scale
//! - `WeightedSectionSum`: `total = Σ section_score × section_weight`
//!   normalized by the weight of scored sections, usually on the 0-100 scale
//!
//! Global invariants enforced:
//! - A policy is applied uniformly; no call site picks its own strategy
//! - Every score the policy produces lies within the scale's range

use crate::model::OptionRiskLevel;
use crate::risk::LevelThresholds;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Numeric range shared by option scores, axis scores and totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoreScale {
    /// 1 (lowest risk) to 5 (highest risk)
    OneToFive,
    /// 0 to 100
    Percent,
}

impl ScoreScale {
    pub fn min(self) -> f64 {
        match self {
            ScoreScale::OneToFive => 1.0,
            ScoreScale::Percent => 0.0,
        }
    }

    pub fn max(self) -> f64 {
        match self {
            ScoreScale::OneToFive => 5.0,
            ScoreScale::Percent => 100.0,
        }
    }

    pub fn midpoint(self) -> f64 {
        (self.min() + self.max()) / 2.0
    }

    pub fn clamp(self, score: f64) -> f64 {
        score.clamp(self.min(), self.max())
    }

    /// Mirror a score around the midpoint (`6 - s` on the 1-5 scale)
    pub fn invert(self, score: f64) -> f64 {
        self.min() + self.max() - score
    }

    /// Position of a fraction in [0, 1] on the scale
    pub fn at_fraction(self, fraction: f64) -> f64 {
        self.min() + fraction.clamp(0.0, 1.0) * (self.max() - self.min())
    }

    /// Map a score expressed on `from` to the same relative position on this scale
    pub fn rescale_from(self, from: ScoreScale, score: f64) -> f64 {
        if from == self {
            return self.clamp(score);
        }
        self.at_fraction((score - from.min()) / (from.max() - from.min()))
    }

    /// Score of a coarse risk category
    pub fn level_score(self, level: OptionRiskLevel) -> f64 {
        match (self, level) {
            (ScoreScale::OneToFive, OptionRiskLevel::Low) => 1.0,
            (ScoreScale::OneToFive, OptionRiskLevel::Medium) => 3.0,
            (ScoreScale::OneToFive, OptionRiskLevel::High) => 5.0,
            (ScoreScale::Percent, OptionRiskLevel::Low) => 25.0,
            (ScoreScale::Percent, OptionRiskLevel::Medium) => 50.0,
            (ScoreScale::Percent, OptionRiskLevel::High) => 100.0,
        }
    }

    pub fn default_thresholds(self) -> LevelThresholds {
        match self {
            ScoreScale::OneToFive => LevelThresholds {
                medium: 2.0,
                high: 4.0,
            },
            ScoreScale::Percent => LevelThresholds {
                medium: 50.0,
                high: 75.0,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreScale::OneToFive => "one-to-five",
            ScoreScale::Percent => "percent",
        }
    }
}

/// How axis or section scores combine into the total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TotalFormula {
    AxisProduct,
    WeightedSectionSum,
}

impl TotalFormula {
    pub fn as_str(&self) -> &'static str {
        match self {
            TotalFormula::AxisProduct => "axis-product",
            TotalFormula::WeightedSectionSum => "weighted-section-sum",
        }
    }
}

/// How a multiselect answer turns into one question score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MultiselectStrategy {
    /// Option-weight-weighted average of each selected option's score
    WeightedAverage,
    /// Share of selected options marked high risk, placed on the scale
    HighRiskFraction,
}

impl MultiselectStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MultiselectStrategy::WeightedAverage => "weighted-average",
            MultiselectStrategy::HighRiskFraction => "high-risk-fraction",
        }
    }
}

/// Optional free-text heuristic: first matching pattern assigns the score
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub pattern: Regex,
    pub score: f64,
}

/// Complete description of how a facility is scored
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    pub scale: ScoreScale,
    /// Scale the catalog's option and threshold `risk_score` values are written on
    pub metadata_scale: ScoreScale,
    pub formula: TotalFormula,
    pub multiselect: MultiselectStrategy,
    /// Axis score used when an axis has no contributions
    pub neutral_score: f64,
    /// Question score used when metadata cannot resolve an answer
    pub fallback_score: f64,
    /// Read mitigation answers as maturity (higher is better) on the axis
    pub invert_mitigation: bool,
    pub thresholds: LevelThresholds,
    pub keywords: Vec<KeywordRule>,
    /// Size of the cross-axis "total" recommendation buckets
    pub recommendation_top_n: usize,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        ScoringPolicy::for_scale(ScoreScale::OneToFive, TotalFormula::AxisProduct)
    }
}

impl ScoringPolicy {
    /// Policy with scale-appropriate defaults
    pub fn for_scale(scale: ScoreScale, formula: TotalFormula) -> Self {
        ScoringPolicy {
            scale,
            metadata_scale: ScoreScale::OneToFive,
            formula,
            multiselect: MultiselectStrategy::WeightedAverage,
            neutral_score: scale.midpoint(),
            fallback_score: scale.midpoint(),
            invert_mitigation: true,
            thresholds: scale.default_thresholds(),
            keywords: Vec::new(),
            recommendation_top_n: 5,
        }
    }

    /// The weighted-section-sum variant on the 0-100 scale
    pub fn weighted_section_sum() -> Self {
        let mut policy =
            ScoringPolicy::for_scale(ScoreScale::Percent, TotalFormula::WeightedSectionSum);
        policy.multiselect = MultiselectStrategy::HighRiskFraction;
        policy
    }

    /// Divisor substituted for a zero or missing mitigation score
    pub fn safe_mitigation(&self, mitigation: f64) -> f64 {
        if mitigation > 0.0 && mitigation.is_finite() {
            mitigation
        } else if self.neutral_score > 0.0 {
            self.neutral_score
        } else {
            self.scale.max().max(1.0) / 2.0
        }
    }

    /// A catalog `risk_score` placed on the policy scale
    pub fn metadata_score(&self, score: f64) -> Option<f64> {
        score
            .is_finite()
            .then(|| self.scale.rescale_from(self.metadata_scale, score))
    }

    /// Score from the optional keyword heuristic
    pub fn keyword_score(&self, text: &str) -> Option<f64> {
        self.keywords
            .iter()
            .find(|rule| rule.pattern.is_match(text))
            .map(|rule| self.scale.clamp(rule.score))
    }
}
