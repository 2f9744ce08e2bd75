//! Stored score validation
//!
//! Recomputes a facility's record and compares it with the stored one, so
//! stale or hand-edited records are caught.

use crate::aggregates::RiskScoreRecord;
use crate::engine::RiskEngine;
use crate::error::EngineError;
use crate::model::FacilityId;
use crate::store::AssessmentStore;
use serde::{Deserialize, Serialize};

/// Absolute tolerance for score comparisons
const SCORE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FieldDifference {
    pub field: String,
    pub stored: String,
    pub recomputed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoreValidation {
    pub facility_id: FacilityId,
    pub stored: Option<RiskScoreRecord>,
    pub recomputed: RiskScoreRecord,
    pub matches: bool,
    pub differences: Vec<FieldDifference>,
}

fn score_diff(out: &mut Vec<FieldDifference>, field: &str, stored: f64, recomputed: f64) {
    if (stored - recomputed).abs() > SCORE_EPSILON {
        out.push(FieldDifference {
            field: field.to_string(),
            stored: format!("{stored:.4}"),
            recomputed: format!("{recomputed:.4}"),
        });
    }
}

/// Field-level differences between two records of the same facility
pub fn compare_records(
    stored: &RiskScoreRecord,
    recomputed: &RiskScoreRecord,
) -> Vec<FieldDifference> {
    let mut out = Vec::new();
    score_diff(
        &mut out,
        "probability_score",
        stored.probability_score,
        recomputed.probability_score,
    );
    score_diff(&mut out, "impact_score", stored.impact_score, recomputed.impact_score);
    score_diff(
        &mut out,
        "mitigation_score",
        stored.mitigation_score,
        recomputed.mitigation_score,
    );
    score_diff(&mut out, "total_score", stored.total_score, recomputed.total_score);

    if stored.risk_level != recomputed.risk_level {
        out.push(FieldDifference {
            field: "risk_level".into(),
            stored: stored.risk_level.as_str().into(),
            recomputed: recomputed.risk_level.as_str().into(),
        });
    }
    if stored.formula != recomputed.formula || stored.scale != recomputed.scale {
        out.push(FieldDifference {
            field: "policy".into(),
            stored: format!("{}/{}", stored.formula.as_str(), stored.scale.as_str()),
            recomputed: format!("{}/{}", recomputed.formula.as_str(), recomputed.scale.as_str()),
        });
    }
    if stored.contributions.len() != recomputed.contributions.len() {
        out.push(FieldDifference {
            field: "contributions".into(),
            stored: stored.contributions.len().to_string(),
            recomputed: recomputed.contributions.len().to_string(),
        });
    }
    for (s, r) in stored.sections.iter().zip(&recomputed.sections) {
        if s.section_id == r.section_id {
            score_diff(
                &mut out,
                &format!("sections[{}].section_score", s.section_id),
                s.section_score,
                r.section_score,
            );
        }
    }
    out
}

/// Recompute a facility's score and compare it with the stored record
pub fn validate_stored_score<S: AssessmentStore>(
    engine: &RiskEngine<S>,
    facility_id: &str,
) -> Result<ScoreValidation, EngineError> {
    let recomputed = engine.compute_risk_score(facility_id)?;
    let stored = engine.store().risk_score(facility_id)?;
    let differences = match &stored {
        Some(s) => compare_records(s, &recomputed),
        None => vec![FieldDifference {
            field: "record".into(),
            stored: "missing".into(),
            recomputed: recomputed.risk_level.as_str().into(),
        }],
    };
    Ok(ScoreValidation {
        facility_id: facility_id.to_string(),
        matches: differences.is_empty(),
        stored,
        recomputed,
        differences,
    })
}
