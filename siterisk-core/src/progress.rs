//! Completion progress
//!
//! Counts answered required questions overall and per section. Risk scores
//! and weights play no part here.
//!
//! Global invariants enforced:
//! - Each question counts once, however many answers were stored for it
//! - A scope with zero required questions is 100% complete

use crate::catalog::Questionnaire;
use crate::model::{QuestionId, SectionId};
use crate::normalize::NormalizedEntry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SectionProgress {
    pub section_id: SectionId,
    pub required: usize,
    pub answered: usize,
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProgressReport {
    pub overall: u8,
    pub required: usize,
    pub answered: usize,
    pub sections: Vec<SectionProgress>,
}

impl ProgressReport {
    pub fn section(&self, id: SectionId) -> Option<&SectionProgress> {
        self.sections.iter().find(|s| s.section_id == id)
    }
}

/// `round(100 × answered / required)`, or 100 when nothing is required
pub fn completion_percent(answered: usize, required: usize) -> u8 {
    if required == 0 {
        return 100;
    }
    let ratio = answered.min(required) as f64 / required as f64;
    (ratio * 100.0).round() as u8
}

/// Progress of one facility from its prepared (deduplicated) answers
pub fn compute_progress(
    entries: &[NormalizedEntry],
    questionnaire: &Questionnaire,
) -> ProgressReport {
    let answered: BTreeSet<QuestionId> = entries
        .iter()
        .filter(|e| e.normalized.is_answered())
        .map(|e| e.answer.question_id)
        .collect();

    let mut per_section: BTreeMap<SectionId, (usize, usize)> = questionnaire
        .sections()
        .iter()
        .map(|s| (s.id, (0, 0)))
        .collect();

    for question in questionnaire.required_questions() {
        let counts = per_section.entry(question.section_id).or_default();
        counts.0 += 1;
        if answered.contains(&question.id) {
            counts.1 += 1;
        }
    }

    let required: usize = per_section.values().map(|(r, _)| r).sum();
    let answered_required: usize = per_section.values().map(|(_, a)| a).sum();

    ProgressReport {
        overall: completion_percent(answered_required, required),
        required,
        answered: answered_required,
        sections: per_section
            .into_iter()
            .map(|(section_id, (required, answered))| SectionProgress {
                section_id,
                required,
                answered,
                percent: completion_percent(answered, required),
            })
            .collect(),
    }
}
