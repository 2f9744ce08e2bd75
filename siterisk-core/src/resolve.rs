//! Option and threshold risk resolution
//!
//! Maps one normalized answer to a risk contribution using the question's
//! options or numeric thresholds.
//!
//! Global invariants enforced:
//! - Resolution never fails; unresolvable answers get the policy fallback
//! - A numeric answer outside every threshold bucket contributes nothing
//! - The multiselect strategy comes from the policy, never from the call site

use crate::catalog::Questionnaire;
use crate::model::{
    InputType, OptionRiskLevel, Question, QuestionId, QuestionOption, RiskFactor, SectionId,
};
use crate::normalize::{NormalizedAnswer, NormalizedEntry};
use crate::policy::{MultiselectStrategy, ScoringPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Where a contribution's score came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    Option,
    Threshold,
    Keyword,
    Fallback,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::Option => "option",
            ScoreSource::Threshold => "threshold",
            ScoreSource::Keyword => "keyword",
            ScoreSource::Fallback => "fallback",
        }
    }
}

/// One question's risk contribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Contribution {
    pub question_id: QuestionId,
    pub section_id: SectionId,
    pub factor: RiskFactor,
    /// Risk on the policy scale; higher is riskier on every axis
    pub risk_score: f64,
    pub weight: f64,
    pub source: ScoreSource,
}

impl Contribution {
    /// Score as it enters the axis average
    ///
    /// Mitigation answers are read as maturity when the policy inverts them,
    /// so a strong countermeasure raises the divisor of the total.
    pub fn axis_score(&self, policy: &ScoringPolicy) -> f64 {
        if self.factor == RiskFactor::Mitigation && policy.invert_mitigation {
            policy.scale.invert(self.risk_score)
        } else {
            self.risk_score
        }
    }
}

/// Why an answer produced no contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Exclusion {
    Unanswered,
    UnknownQuestion,
    NonScoring,
    TextAnswer,
    NoThresholdMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Contribution(Contribution),
    Excluded(Exclusion),
}

impl Resolution {
    pub fn contribution(&self) -> Option<&Contribution> {
        match self {
            Resolution::Contribution(c) => Some(c),
            Resolution::Excluded(_) => None,
        }
    }
}

/// A normalized answer together with its resolution
#[derive(Debug, Clone)]
pub struct ResolvedAnswer {
    pub entry: NormalizedEntry,
    pub resolution: Resolution,
}

/// Score of a single option on the policy scale, if it carries one
pub fn option_score(option: &QuestionOption, policy: &ScoringPolicy) -> Option<f64> {
    option
        .risk_score
        .and_then(|s| policy.metadata_score(s))
        .or_else(|| option.risk_level.map(|l| policy.scale.level_score(l)))
}

/// Option weight if explicitly positive, else the question's importance
fn contribution_weight(question: &Question, option: Option<&QuestionOption>) -> f64 {
    option
        .and_then(|o| o.weight)
        .filter(|w| *w > 0.0 && w.is_finite())
        .unwrap_or_else(|| question.importance_weight())
}

/// Resolve one answer against its question's metadata
pub fn resolve(
    question: &Question,
    options: &[QuestionOption],
    answer: &NormalizedAnswer,
    policy: &ScoringPolicy,
) -> Resolution {
    if !answer.is_answered() {
        return Resolution::Excluded(Exclusion::Unanswered);
    }
    if !question.scoring {
        return Resolution::Excluded(Exclusion::NonScoring);
    }

    match answer {
        NormalizedAnswer::None => Resolution::Excluded(Exclusion::Unanswered),
        NormalizedAnswer::Options(selected) => resolve_options(question, options, selected, policy),
        NormalizedAnswer::Numeric(n) => resolve_numeric(question, options, *n, policy),
        // Single selects are often stored in `value` rather than as an option list
        NormalizedAnswer::Text(text)
            if matches!(question.input_type, InputType::Select | InputType::Multiselect) =>
        {
            resolve_options(question, options, std::slice::from_ref(text), policy)
        }
        NormalizedAnswer::Text(text) => match policy.keyword_score(text) {
            Some(score) => Resolution::Contribution(Contribution {
                question_id: question.id,
                section_id: question.section_id,
                factor: question.risk_factor.unwrap_or(RiskFactor::Unknown),
                risk_score: score,
                weight: question.importance_weight(),
                source: ScoreSource::Keyword,
            }),
            None => Resolution::Excluded(Exclusion::TextAnswer),
        },
    }
}

fn fallback(question: &Question, policy: &ScoringPolicy, reason: &str) -> Resolution {
    warn!(
        question_id = question.id,
        fallback_score = policy.fallback_score,
        "{reason}; using fallback score"
    );
    Resolution::Contribution(Contribution {
        question_id: question.id,
        section_id: question.section_id,
        factor: question.risk_factor.unwrap_or(RiskFactor::Unknown),
        risk_score: policy.fallback_score,
        weight: question.importance_weight(),
        source: ScoreSource::Fallback,
    })
}

fn resolve_options(
    question: &Question,
    options: &[QuestionOption],
    selected: &[String],
    policy: &ScoringPolicy,
) -> Resolution {
    let mut matched: Vec<&QuestionOption> = Vec::new();
    for value in selected {
        if let Some(option) = options.iter().find(|o| o.matches(value)) {
            if !matched.iter().any(|m| std::ptr::eq(*m, option)) {
                matched.push(option);
            }
        }
    }

    if matched.is_empty() {
        return fallback(question, policy, "no option matches the selected values");
    }

    if question.input_type != InputType::Multiselect {
        let option = matched[0];
        let Some(score) = option_score(option, policy) else {
            return fallback(question, policy, "selected option carries no risk score");
        };
        return Resolution::Contribution(Contribution {
            question_id: question.id,
            section_id: question.section_id,
            factor: option
                .risk_factor
                .or(question.risk_factor)
                .unwrap_or(RiskFactor::Unknown),
            risk_score: score,
            weight: contribution_weight(question, Some(option)),
            source: ScoreSource::Option,
        });
    }

    let score = match policy.multiselect {
        MultiselectStrategy::WeightedAverage => {
            let mut weighted = 0.0;
            let mut total_weight = 0.0;
            for option in &matched {
                let score = option_score(option, policy).unwrap_or(policy.fallback_score);
                let weight = option.weight.filter(|w| *w > 0.0).unwrap_or(1.0);
                weighted += score * weight;
                total_weight += weight;
            }
            weighted / total_weight
        }
        MultiselectStrategy::HighRiskFraction => {
            let high = matched
                .iter()
                .filter(|o| is_high_risk(o, policy))
                .count();
            policy.scale.at_fraction(high as f64 / matched.len() as f64)
        }
    };

    let factor = question
        .risk_factor
        .or_else(|| matched.iter().find_map(|o| o.risk_factor))
        .unwrap_or(RiskFactor::Unknown);

    Resolution::Contribution(Contribution {
        question_id: question.id,
        section_id: question.section_id,
        factor,
        risk_score: policy.scale.clamp(score),
        weight: question.importance_weight(),
        source: ScoreSource::Option,
    })
}

fn is_high_risk(option: &QuestionOption, policy: &ScoringPolicy) -> bool {
    match option.risk_level {
        Some(level) => level == OptionRiskLevel::High,
        None => option
            .risk_score
            .and_then(|s| policy.metadata_score(s))
            .is_some_and(|s| s >= policy.thresholds.high),
    }
}

fn resolve_numeric(
    question: &Question,
    options: &[QuestionOption],
    value: f64,
    policy: &ScoringPolicy,
) -> Resolution {
    if question.thresholds.is_empty() {
        if !options.is_empty() {
            let as_text = NormalizedAnswer::Numeric(value).display();
            return resolve_options(question, options, &[as_text], policy);
        }
        return fallback(question, policy, "numeric question has no thresholds");
    }

    let Some(threshold) = question
        .thresholds
        .iter()
        .find(|t| t.operator.test(value, t.value))
    else {
        debug!(question_id = question.id, value, "numeric answer matched no threshold");
        return Resolution::Excluded(Exclusion::NoThresholdMatch);
    };

    let score = threshold
        .risk_score
        .and_then(|s| policy.metadata_score(s))
        .unwrap_or_else(|| policy.scale.level_score(threshold.risk_level));

    Resolution::Contribution(Contribution {
        question_id: question.id,
        section_id: question.section_id,
        factor: question.risk_factor.unwrap_or(RiskFactor::Unknown),
        risk_score: score,
        weight: question.importance_weight(),
        source: ScoreSource::Threshold,
    })
}

/// Resolve every prepared answer of a facility
///
/// Answers to questions missing from the questionnaire are excluded and
/// logged rather than failing the computation.
pub fn resolve_all(
    entries: Vec<NormalizedEntry>,
    questionnaire: &Questionnaire,
    policy: &ScoringPolicy,
) -> Vec<ResolvedAnswer> {
    entries
        .into_iter()
        .map(|entry| {
            let resolution = match questionnaire.question(entry.answer.question_id) {
                Some(question) => resolve(
                    question,
                    questionnaire.options_for(question.id),
                    &entry.normalized,
                    policy,
                ),
                None if !entry.normalized.is_answered() => {
                    Resolution::Excluded(Exclusion::Unanswered)
                }
                None => {
                    warn!(
                        question_id = entry.answer.question_id,
                        "answer refers to an unknown question"
                    );
                    Resolution::Excluded(Exclusion::UnknownQuestion)
                }
            };
            ResolvedAnswer { entry, resolution }
        })
        .collect()
}
