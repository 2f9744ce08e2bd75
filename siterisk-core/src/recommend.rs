//! Improvement recommendations
//!
//! Ranks scored questions by their own risk score and attaches a canned
//! remediation message per question.
//!
//! Global invariants enforced:
//! - High items score `>= high`; medium items score in `[medium, high)`
//! - An item lands in at most one bucket per group
//! - Non-scoring and unresolved questions never produce an item
//! - Deterministic ordering (score descending, then question id)

use crate::aggregates::RiskScoreRecord;
use crate::catalog::Questionnaire;
use crate::model::{FacilityId, QuestionId, RiskFactor};
use crate::policy::ScoringPolicy;
use crate::resolve::ResolvedAnswer;
use crate::risk::RiskLevel;
use serde::{Deserialize, Serialize};

/// Per-question remediation text: (question, high message, medium message)
const MESSAGES: &[(QuestionId, &str, &str)] = &[
    (
        2001,
        "Commission a detailed structural survey of the ageing building and plan reinforcement work where needed.",
        "Schedule periodic building inspections so signs of ageing are caught early.",
    ),
    (
        2004,
        "Carry out seismic retrofitting to the current building code as a priority.",
        "Run a detailed seismic evaluation and consider partial reinforcement where it falls short.",
    ),
    (
        2007,
        "Combine flood barriers, elevated placement of critical equipment and water detection to address flooding.",
        "Strengthen drainage, inspect and clear drains regularly, and add a flood warning system.",
    ),
    (
        3001,
        "Raise power redundancy to at least N+1 and run regular failover tests.",
        "Load-test the current power system and add capacity or partial redundancy where needed.",
    ),
    (
        3002,
        "Raise cooling redundancy to at least N+1 and run regular failover tests.",
        "Evaluate cooling efficiency and consider partial redundancy or efficiency improvements.",
    ),
    (
        3004,
        "Install clean-agent suppression, improve early fire detection and hold regular fire drills.",
        "Inspect suppression equipment more often and schedule regular fire drills.",
    ),
    (
        3005,
        "Establish 24x7 staffed monitoring, automate alerting and tighten escalation.",
        "Automate more of the monitoring and document response procedures for critical alerts.",
    ),
    (
        3007,
        "Increase UPS capacity, extend generator fuel reserves and load-test backup power regularly.",
        "Inspect backup power more often and review fuel supply contracts.",
    ),
    (
        3008,
        "Add multi-factor access control, more CCTV coverage, security staff and intrusion detection.",
        "Review the access management system and run regular security training.",
    ),
    (
        5001,
        "Keep encrypted backups at geographically separate sites and verify them automatically.",
        "Review backup frequency and retention, and run periodic restore tests.",
    ),
    (
        5003,
        "Write a detailed disaster recovery plan with explicit RTO and RPO targets and rehearse it regularly.",
        "Review the disaster recovery plan and run recovery tests for key systems.",
    ),
    (
        5005,
        "Improve SLA compliance through stronger monitoring, preventive maintenance and faster incident handling.",
        "Analyse the causes of SLA breaches and address the recurring ones.",
    ),
];

const DEFAULT_MESSAGE: &str = "Review the countermeasures for this item in light of its risk score.";

const PROBABILITY_GENERAL: &str = "For items with a high likelihood of occurring, strengthen preventive measures: regular inspections, early warning systems and standby equipment.";
const IMPACT_GENERAL: &str = "For items with a high impact, add measures that limit the blast radius of a failure, secure alternatives and streamline recovery.";
const MITIGATION_GENERAL: &str = "For items with weak countermeasures, implement concrete controls based on industry practice, have them reviewed by specialists and improve them on a fixed cycle.";
const TOTAL_GENERAL: &str = "Address the highest overall risks first, weighing likelihood, impact and countermeasures together.";

/// Remediation message for a question at a given score
pub fn message_for(question_id: QuestionId, score: f64, policy: &ScoringPolicy) -> &'static str {
    match MESSAGES.iter().find(|(id, _, _)| *id == question_id) {
        Some((_, high, _)) if score >= policy.thresholds.high => high,
        Some((_, _, medium)) => medium,
        None => DEFAULT_MESSAGE,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskItem {
    pub question_id: QuestionId,
    pub question: String,
    pub answer: String,
    pub factor: RiskFactor,
    pub risk_score: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CategoryRecommendations {
    pub high_risk_items: Vec<RiskItem>,
    pub medium_risk_items: Vec<RiskItem>,
    pub general_recommendation: String,
}

impl CategoryRecommendations {
    fn new(general: &str) -> Self {
        CategoryRecommendations {
            high_risk_items: Vec::new(),
            medium_risk_items: Vec::new(),
            general_recommendation: general.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.high_risk_items.is_empty() && self.medium_risk_items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskRecommendations {
    pub facility_id: FacilityId,
    pub risk_level: RiskLevel,
    pub probability: CategoryRecommendations,
    pub impact: CategoryRecommendations,
    pub mitigation: CategoryRecommendations,
    pub total: CategoryRecommendations,
}

impl RiskRecommendations {
    /// Groups in display order
    pub fn groups(&self) -> [(&'static str, &CategoryRecommendations); 4] {
        [
            ("probability", &self.probability),
            ("impact", &self.impact),
            ("mitigation", &self.mitigation),
            ("total", &self.total),
        ]
    }
}

fn rank(items: &mut [RiskItem]) {
    items.sort_by(|a, b| {
        b.risk_score
            .total_cmp(&a.risk_score)
            .then(a.question_id.cmp(&b.question_id))
    });
}

/// Build the four recommendation groups for a facility
///
/// Items use each question's own (non-inverted) risk score, so a weak
/// countermeasure ranks as high as a likely hazard.
pub fn generate_recommendations(
    record: &RiskScoreRecord,
    resolved: &[ResolvedAnswer],
    questionnaire: &Questionnaire,
    policy: &ScoringPolicy,
) -> RiskRecommendations {
    let mut high = Vec::new();
    let mut medium = Vec::new();

    for r in resolved {
        let Some(c) = r.resolution.contribution() else {
            continue;
        };
        let Some(question) = questionnaire.question(c.question_id) else {
            continue;
        };
        if !question.scoring || c.risk_score < policy.thresholds.medium {
            continue;
        }

        let item = RiskItem {
            question_id: c.question_id,
            question: question.text.clone(),
            answer: r.entry.normalized.display(),
            factor: c.factor,
            risk_score: c.risk_score,
            recommendation: message_for(c.question_id, c.risk_score, policy).to_string(),
        };
        if c.risk_score >= policy.thresholds.high {
            high.push(item);
        } else {
            medium.push(item);
        }
    }

    rank(&mut high);
    rank(&mut medium);

    let bucket = |general: &str, factor: Option<RiskFactor>, limit: usize| {
        let mut group = CategoryRecommendations::new(general);
        let keep = |item: &&RiskItem| factor.map_or(true, |f| item.factor == f);
        group.high_risk_items = high.iter().filter(keep).take(limit).cloned().collect();
        group.medium_risk_items = medium.iter().filter(keep).take(limit).cloned().collect();
        group
    };

    RiskRecommendations {
        facility_id: record.facility_id.clone(),
        risk_level: record.risk_level,
        probability: bucket(PROBABILITY_GENERAL, Some(RiskFactor::Probability), usize::MAX),
        impact: bucket(IMPACT_GENERAL, Some(RiskFactor::Impact), usize::MAX),
        mitigation: bucket(MITIGATION_GENERAL, Some(RiskFactor::Mitigation), usize::MAX),
        total: bucket(TOTAL_GENERAL, None, policy.recommendation_top_n),
    }
}
