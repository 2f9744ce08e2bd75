//! Siterisk core library - risk scoring for data-center assessment questionnaires

// Global invariants enforced in this crate:
// - Scoring is a pure function of stored answers and questionnaire metadata
// - No global mutable state; metadata is read-only once loaded
// - Scoring anomalies are absorbed with documented defaults and logged
// - Store failures always propagate to the caller
// - Identical input yields byte-for-byte identical records

pub mod aggregates;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod normalize;
pub mod options;
pub mod policy;
pub mod progress;
pub mod recommend;
pub mod reconcile;
pub mod report;
pub mod resolve;
pub mod risk;
pub mod sqlite;
pub mod store;
pub mod validate;

pub use aggregates::RiskScoreRecord;
pub use catalog::Questionnaire;
pub use config::ResolvedConfig;
pub use engine::RiskEngine;
pub use error::{EngineError, StoreError};
pub use policy::ScoringPolicy;
pub use risk::RiskLevel;
pub use sqlite::SqliteStore;
pub use store::{AssessmentStore, MemoryStore};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use model::{Answer, Facility, QuestionId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One answer in an assessment import file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportedAnswer {
    pub question_id: QuestionId,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub numeric_value: Option<f64>,
    #[serde(default)]
    pub selected_options: Option<serde_json::Value>,
    /// Defaults to the import time
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// An exported assessment: one facility and its answers
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssessmentFile {
    pub facility: Facility,
    #[serde(default)]
    pub answers: Vec<ImportedAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub facility_id: String,
    pub answers_written: usize,
    /// Answers naming a question the questionnaire does not have
    pub unknown_questions: Vec<QuestionId>,
}

/// Import an assessment file through the store's write boundary
///
/// Answers are upserted one by one, so repeated questions in the file
/// collapse to the last entry.
pub fn import_assessment<S: AssessmentStore>(
    store: &mut S,
    path: &Path,
    now: DateTime<Utc>,
) -> Result<ImportSummary> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read assessment file: {}", path.display()))?;
    let file: AssessmentFile = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse assessment file: {}", path.display()))?;
    if file.facility.id.trim().is_empty() {
        anyhow::bail!("facility id must not be empty in {}", path.display());
    }

    let questionnaire = store.questionnaire()?;
    let mut facility = file.facility;
    facility.created_at.get_or_insert(now);
    facility.updated_at = Some(now);
    store.upsert_facility(&facility)?;

    let mut unknown_questions = Vec::new();
    for imported in &file.answers {
        if questionnaire.question(imported.question_id).is_none() {
            unknown_questions.push(imported.question_id);
        }
        store.upsert_answer(&Answer {
            facility_id: facility.id.clone(),
            question_id: imported.question_id,
            value: imported.value.clone(),
            numeric_value: imported.numeric_value,
            selected_options: imported.selected_options.clone(),
            updated_at: imported.updated_at.unwrap_or(now),
        })?;
    }
    unknown_questions.sort_unstable();
    unknown_questions.dedup();
    if !unknown_questions.is_empty() {
        tracing::warn!(
            facility_id = %facility.id,
            count = unknown_questions.len(),
            "imported answers refer to unknown questions"
        );
    }

    Ok(ImportSummary {
        facility_id: facility.id,
        answers_written: file.answers.len(),
        unknown_questions,
    })
}
