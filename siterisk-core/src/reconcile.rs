//! Section reconciliation
//!
//! Legacy data grouped questions by `id / 1000` while rows also carried an
//! explicit `section_id` that could disagree. Scoring only trusts the
//! explicit reference, so this one-off pass rewrites disagreeing rows.

use crate::error::StoreError;
use crate::model::{
    legacy_section_of, Question, QuestionId, Section, SectionId, LEGACY_SECTION_DIVISOR,
};
use crate::store::AssessmentStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// A question whose stored section disagrees with its id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SectionFix {
    pub question_id: QuestionId,
    pub current_section: SectionId,
    pub derived_section: SectionId,
    /// False when the derived section does not exist
    pub applicable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReconcileSummary {
    pub fixes: Vec<SectionFix>,
    pub applied: usize,
    pub skipped: usize,
}

/// Find questions whose explicit section differs from the legacy convention
pub fn plan_section_fixes(questions: &[Question], sections: &[Section]) -> Vec<SectionFix> {
    let known: BTreeSet<SectionId> = sections.iter().map(|s| s.id).collect();
    let mut fixes: Vec<SectionFix> = questions
        .iter()
        .filter(|q| q.id >= LEGACY_SECTION_DIVISOR)
        .filter_map(|q| {
            let derived = legacy_section_of(q.id);
            (derived != q.section_id).then(|| SectionFix {
                question_id: q.id,
                current_section: q.section_id,
                derived_section: derived,
                applicable: known.contains(&derived),
            })
        })
        .collect();
    fixes.sort_by_key(|f| f.question_id);
    fixes
}

/// Rewrite every applicable fix through the store
///
/// With `dry_run` the plan is returned and nothing is written.
pub fn apply_section_fixes<S: AssessmentStore>(
    store: &mut S,
    dry_run: bool,
) -> Result<ReconcileSummary, StoreError> {
    let questions = store.questions(None)?;
    let sections = store.sections()?;
    let fixes = plan_section_fixes(&questions, &sections);

    let mut summary = ReconcileSummary::default();
    for fix in &fixes {
        if !fix.applicable {
            warn!(
                question_id = fix.question_id,
                derived_section = fix.derived_section,
                "derived section does not exist; leaving question unchanged"
            );
            summary.skipped += 1;
            continue;
        }
        if !dry_run {
            store.set_question_section(fix.question_id, fix.derived_section)?;
            summary.applied += 1;
        }
    }
    summary.fixes = fixes;
    info!(
        planned = summary.fixes.len(),
        applied = summary.applied,
        skipped = summary.skipped,
        dry_run,
        "section reconciliation finished"
    );
    Ok(summary)
}
