//! Risk engine
//!
//! Ties the pipeline together: store → normalize → resolve → aggregate →
//! classify → (persist) → recommend, with progress computed alongside.
//!
//! Global invariants enforced:
//! - Every computation is a pure function of stored answers and metadata
//! - Recomputing without answer changes yields an identical record
//! - Store failures surface as `EngineError`; scoring anomalies never do
//! - Batch scoring reads and writes sequentially; only pure work runs in parallel

use crate::aggregates::{build_record, RiskScoreRecord};
use crate::catalog::Questionnaire;
use crate::error::EngineError;
use crate::model::{Answer, Facility, FacilityId};
use crate::normalize::prepare_answers;
use crate::policy::ScoringPolicy;
use crate::progress::{compute_progress, ProgressReport};
use crate::recommend::{generate_recommendations, RiskRecommendations};
use crate::resolve::resolve_all;
use crate::store::AssessmentStore;
use rayon::prelude::*;
use tracing::{debug, info};

/// Everything needed to score one facility without touching the store
#[derive(Debug, Clone)]
pub struct FacilityInputs {
    pub facility_id: FacilityId,
    pub answers: Vec<Answer>,
}

/// Score and progress of one facility
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityAssessment {
    pub record: RiskScoreRecord,
    pub progress: ProgressReport,
}

/// Score one facility's inputs
pub fn score_inputs(
    inputs: &FacilityInputs,
    questionnaire: &Questionnaire,
    policy: &ScoringPolicy,
) -> RiskScoreRecord {
    let entries = prepare_answers(inputs.answers.clone());
    let resolved = resolve_all(entries, questionnaire, policy);
    build_record(&inputs.facility_id, &resolved, questionnaire, policy)
}

/// Score and progress in one pass over the answers
pub fn assess_inputs(
    inputs: &FacilityInputs,
    questionnaire: &Questionnaire,
    policy: &ScoringPolicy,
) -> FacilityAssessment {
    let entries = prepare_answers(inputs.answers.clone());
    let progress = compute_progress(&entries, questionnaire);
    let resolved = resolve_all(entries, questionnaire, policy);
    FacilityAssessment {
        record: build_record(&inputs.facility_id, &resolved, questionnaire, policy),
        progress,
    }
}

pub struct RiskEngine<S> {
    store: S,
    policy: ScoringPolicy,
}

impl<S: AssessmentStore> RiskEngine<S> {
    pub fn new(store: S, policy: ScoringPolicy) -> Self {
        RiskEngine { store, policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn require_facility(&self, facility_id: &str) -> Result<Facility, EngineError> {
        self.store
            .facility(facility_id)?
            .ok_or_else(|| EngineError::FacilityNotFound(facility_id.to_string()))
    }

    fn load_inputs(&self, facility_id: &str) -> Result<FacilityInputs, EngineError> {
        self.require_facility(facility_id)?;
        Ok(FacilityInputs {
            facility_id: facility_id.to_string(),
            answers: self.store.answers(facility_id)?,
        })
    }

    /// Compute a facility's record without persisting it
    ///
    /// A facility without answers yields an `unevaluated` record, not an error.
    pub fn compute_risk_score(&self, facility_id: &str) -> Result<RiskScoreRecord, EngineError> {
        let inputs = self.load_inputs(facility_id)?;
        let questionnaire = self.store.questionnaire()?;
        let record = score_inputs(&inputs, &questionnaire, &self.policy);
        info!(
            facility_id,
            total_score = record.total_score,
            risk_level = record.risk_level.as_str(),
            "computed risk score"
        );
        Ok(record)
    }

    /// Compute, upsert the record and store the facility's progress
    pub fn recalculate_and_store(
        &mut self,
        facility_id: &str,
    ) -> Result<RiskScoreRecord, EngineError> {
        let inputs = self.load_inputs(facility_id)?;
        let questionnaire = self.store.questionnaire()?;
        let assessment = assess_inputs(&inputs, &questionnaire, &self.policy);
        self.persist(&assessment)?;
        info!(
            facility_id,
            total_score = assessment.record.total_score,
            risk_level = assessment.record.risk_level.as_str(),
            progress = assessment.progress.overall,
            "stored risk score"
        );
        Ok(assessment.record)
    }

    fn persist(&mut self, assessment: &FacilityAssessment) -> Result<(), EngineError> {
        let facility_id = assessment.record.facility_id.as_str();
        self.store.upsert_risk_score(facility_id, &assessment.record)?;
        self.store
            .update_facility_progress(facility_id, assessment.progress.overall)?;
        Ok(())
    }

    pub fn compute_progress(&self, facility_id: &str) -> Result<ProgressReport, EngineError> {
        let inputs = self.load_inputs(facility_id)?;
        let questionnaire = self.store.questionnaire()?;
        let entries = prepare_answers(inputs.answers);
        Ok(compute_progress(&entries, &questionnaire))
    }

    /// Recommendations against the stored record, or a fresh one if none exists
    pub fn compute_recommendations(
        &self,
        facility_id: &str,
    ) -> Result<RiskRecommendations, EngineError> {
        let inputs = self.load_inputs(facility_id)?;
        let questionnaire = self.store.questionnaire()?;
        let entries = prepare_answers(inputs.answers);
        let resolved = resolve_all(entries, &questionnaire, &self.policy);

        let record = match self.store.risk_score(facility_id)? {
            Some(stored) => stored,
            None => {
                debug!(facility_id, "no stored score; computing a fresh record");
                build_record(facility_id, &resolved, &questionnaire, &self.policy)
            }
        };
        Ok(generate_recommendations(
            &record,
            &resolved,
            &questionnaire,
            &self.policy,
        ))
    }

    /// Recalculate and store every facility
    ///
    /// `on_scored` runs once per facility after its record is persisted.
    pub fn score_all<F>(&mut self, mut on_scored: F) -> Result<Vec<RiskScoreRecord>, EngineError>
    where
        F: FnMut(&RiskScoreRecord),
    {
        let questionnaire = self.store.questionnaire()?;
        let inputs = self
            .store
            .facilities()?
            .into_iter()
            .map(|f| -> Result<FacilityInputs, EngineError> {
                let answers = self.store.answers(&f.id)?;
                Ok(FacilityInputs {
                    facility_id: f.id,
                    answers,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let policy = &self.policy;
        let assessments: Vec<FacilityAssessment> = inputs
            .par_iter()
            .map(|i| assess_inputs(i, &questionnaire, policy))
            .collect();

        let mut records = Vec::with_capacity(assessments.len());
        for assessment in assessments {
            self.persist(&assessment)?;
            on_scored(&assessment.record);
            records.push(assessment.record);
        }
        info!(facilities = records.len(), "scored all facilities");
        Ok(records)
    }
}
