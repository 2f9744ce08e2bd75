//! Axis and section aggregation
//!
//! Folds resolved contributions into per-axis weighted averages, per-section
//! breakdowns and the facility's `RiskScoreRecord`.
//!
//! Global invariants enforced:
//! - Aggregates are strictly derived from resolved answers (never edited)
//! - An axis without contributions reads the policy's neutral score, not 0
//! - Excluded answers never enter a denominator
//! - Deterministic ordering (sections and details sorted by id)

use crate::catalog::Questionnaire;
use crate::model::{FacilityId, QuestionId, RiskFactor, SectionId};
use crate::policy::{ScoreScale, ScoringPolicy, TotalFormula};
use crate::resolve::{Contribution, ResolvedAnswer, ScoreSource};
use crate::risk::{axis_product, classify, weighted_section_sum, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running `Σ score·weight` and `Σ weight` for one axis
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct WeightedMean {
    sum: f64,
    weight: f64,
    count: usize,
}

impl WeightedMean {
    fn add(&mut self, score: f64, weight: f64) {
        if !(score.is_finite() && weight.is_finite()) || weight <= 0.0 {
            return;
        }
        self.sum += score * weight;
        self.weight += weight;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.weight > 0.0).then(|| self.sum / self.weight)
    }
}

/// The three axis scores of a facility or section
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AxisScores {
    pub probability: f64,
    pub impact: f64,
    pub mitigation: f64,
    /// Number of contributions that landed on any axis
    pub contributing: usize,
}

impl AxisScores {
    pub fn neutral(policy: &ScoringPolicy) -> Self {
        AxisScores {
            probability: policy.neutral_score,
            impact: policy.neutral_score,
            mitigation: policy.neutral_score,
            contributing: 0,
        }
    }

    pub fn get(&self, factor: RiskFactor) -> Option<f64> {
        match factor {
            RiskFactor::Probability => Some(self.probability),
            RiskFactor::Impact => Some(self.impact),
            RiskFactor::Mitigation => Some(self.mitigation),
            RiskFactor::Unknown => None,
        }
    }
}

/// Weighted average per axis over a set of contributions
///
/// Contributions with an unknown factor are skipped; they only reach the
/// section score and the cross-axis recommendations.
pub fn aggregate_axes<'a>(
    contributions: impl IntoIterator<Item = &'a Contribution>,
    policy: &ScoringPolicy,
) -> AxisScores {
    let mut probability = WeightedMean::default();
    let mut impact = WeightedMean::default();
    let mut mitigation = WeightedMean::default();

    for c in contributions {
        let target = match c.factor {
            RiskFactor::Probability => &mut probability,
            RiskFactor::Impact => &mut impact,
            RiskFactor::Mitigation => &mut mitigation,
            RiskFactor::Unknown => continue,
        };
        target.add(c.axis_score(policy), c.weight);
    }

    let neutral = policy.neutral_score;
    AxisScores {
        probability: probability.mean().unwrap_or(neutral),
        impact: impact.mean().unwrap_or(neutral),
        mitigation: mitigation.mean().unwrap_or(neutral),
        contributing: probability.count + impact.count + mitigation.count,
    }
}

/// Weighted mean risk of every contribution regardless of axis
///
/// Reads the raw risk score, so mitigation enters with the same orientation
/// as the other axes (higher is riskier).
fn overall_mean<'a>(
    contributions: impl IntoIterator<Item = &'a Contribution>,
    policy: &ScoringPolicy,
) -> Option<f64> {
    let mut acc = WeightedMean::default();
    for c in contributions {
        acc.add(c.risk_score, c.weight);
    }
    acc.mean().map(|m| policy.scale.clamp(m))
}

/// Score, axes and level of one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SectionBreakdown {
    pub section_id: SectionId,
    pub name: String,
    pub weight: f64,
    pub section_score: f64,
    pub probability_score: f64,
    pub impact_score: f64,
    pub mitigation_score: f64,
    pub risk_level: RiskLevel,
    pub answered: usize,
    pub contributing: usize,
}

/// Per-question view of a contribution as it entered the axes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContributionDetail {
    pub question_id: QuestionId,
    pub section_id: SectionId,
    pub factor: RiskFactor,
    pub risk_score: f64,
    pub axis_score: f64,
    pub weight: f64,
    pub weighted_score: f64,
    pub source: ScoreSource,
}

/// Derived score of one facility; one current record per facility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskScoreRecord {
    pub facility_id: FacilityId,
    pub scale: ScoreScale,
    pub formula: TotalFormula,
    pub probability_score: f64,
    pub impact_score: f64,
    pub mitigation_score: f64,
    pub total_score: f64,
    pub risk_level: RiskLevel,
    pub sections: Vec<SectionBreakdown>,
    pub contributions: Vec<ContributionDetail>,
    pub answered: usize,
    /// Newest `updated_at` among the scored answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_at: Option<DateTime<Utc>>,
}

impl RiskScoreRecord {
    pub fn is_evaluated(&self) -> bool {
        self.risk_level != RiskLevel::Unevaluated
    }

    pub fn axis_score(&self, factor: RiskFactor) -> Option<f64> {
        match factor {
            RiskFactor::Probability => Some(self.probability_score),
            RiskFactor::Impact => Some(self.impact_score),
            RiskFactor::Mitigation => Some(self.mitigation_score),
            RiskFactor::Unknown => None,
        }
    }
}

/// Score a set of contributions as one unit (facility or section)
///
/// Returns `None` when nothing contributed.
fn score_unit(
    contributions: &[&Contribution],
    policy: &ScoringPolicy,
) -> (AxisScores, Option<f64>) {
    let axes = aggregate_axes(contributions.iter().copied(), policy);
    let score = match policy.formula {
        TotalFormula::AxisProduct if axes.contributing > 0 => Some(axis_product(
            policy,
            axes.probability,
            axes.impact,
            axes.mitigation,
        )),
        TotalFormula::AxisProduct => None,
        TotalFormula::WeightedSectionSum => overall_mean(contributions.iter().copied(), policy),
    };
    (axes, score)
}

/// Break the facility's contributions down by section
///
/// Every questionnaire section is listed, answered or not.
pub fn compute_section_breakdown(
    resolved: &[ResolvedAnswer],
    questionnaire: &Questionnaire,
    policy: &ScoringPolicy,
) -> Vec<SectionBreakdown> {
    let mut answered: BTreeMap<SectionId, usize> = BTreeMap::new();
    let mut by_section: BTreeMap<SectionId, Vec<&Contribution>> = BTreeMap::new();

    for r in resolved {
        let Some(question) = questionnaire.question(r.entry.answer.question_id) else {
            continue;
        };
        if r.entry.normalized.is_answered() {
            *answered.entry(question.section_id).or_default() += 1;
        }
        if let Some(c) = r.resolution.contribution() {
            by_section.entry(c.section_id).or_default().push(c);
        }
    }

    questionnaire
        .sections()
        .iter()
        .map(|section| {
            let contributions = by_section.get(&section.id).map(Vec::as_slice).unwrap_or(&[]);
            let (axes, score) = score_unit(contributions, policy);
            SectionBreakdown {
                section_id: section.id,
                name: section.name.clone(),
                weight: section.weight,
                section_score: score.unwrap_or(policy.neutral_score),
                probability_score: axes.probability,
                impact_score: axes.impact,
                mitigation_score: axes.mitigation,
                risk_level: score
                    .map(|s| classify(s, &policy.thresholds))
                    .unwrap_or(RiskLevel::Unevaluated),
                answered: answered.get(&section.id).copied().unwrap_or(0),
                contributing: contributions.len(),
            }
        })
        .collect()
}

/// Assemble the facility record from resolved answers
///
/// Pure: the same answers and metadata always yield an identical record.
pub fn build_record(
    facility_id: &str,
    resolved: &[ResolvedAnswer],
    questionnaire: &Questionnaire,
    policy: &ScoringPolicy,
) -> RiskScoreRecord {
    let contributions: Vec<&Contribution> = resolved
        .iter()
        .filter_map(|r| r.resolution.contribution())
        .collect();
    let sections = compute_section_breakdown(resolved, questionnaire, policy);

    let axes = aggregate_axes(contributions.iter().copied(), policy);
    let total = match policy.formula {
        TotalFormula::AxisProduct => (axes.contributing > 0)
            .then(|| axis_product(policy, axes.probability, axes.impact, axes.mitigation)),
        TotalFormula::WeightedSectionSum => {
            let scored: Vec<(f64, f64)> = sections
                .iter()
                .filter(|s| s.contributing > 0)
                .map(|s| (s.section_score, s.weight))
                .collect();
            weighted_section_sum(policy, &scored)
                .or_else(|| overall_mean(contributions.iter().copied(), policy))
        }
    };

    let mut details: Vec<ContributionDetail> = contributions
        .iter()
        .map(|c| {
            let axis_score = c.axis_score(policy);
            ContributionDetail {
                question_id: c.question_id,
                section_id: c.section_id,
                factor: c.factor,
                risk_score: c.risk_score,
                axis_score,
                weight: c.weight,
                weighted_score: axis_score * c.weight,
                source: c.source,
            }
        })
        .collect();
    details.sort_by_key(|d| d.question_id);

    let computed_at = resolved
        .iter()
        .filter(|r| r.resolution.contribution().is_some())
        .map(|r| r.entry.answer.updated_at)
        .max();

    RiskScoreRecord {
        facility_id: facility_id.to_string(),
        scale: policy.scale,
        formula: policy.formula,
        probability_score: axes.probability,
        impact_score: axes.impact,
        mitigation_score: axes.mitigation,
        total_score: total.unwrap_or(policy.neutral_score),
        risk_level: total
            .map(|t| classify(t, &policy.thresholds))
            .unwrap_or(RiskLevel::Unevaluated),
        sections,
        contributions: details,
        answered: resolved
            .iter()
            .filter(|r| r.entry.normalized.is_answered())
            .count(),
        computed_at,
    }
}
