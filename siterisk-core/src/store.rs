//! Persistence boundary
//!
//! The engine reads facilities, questionnaire metadata and answers through
//! [`AssessmentStore`] and writes back one score record per facility.
//!
//! Global invariants enforced:
//! - At most one answer per (facility, question); writes overwrite
//! - At most one score record per facility; writes overwrite
//! - Store failures are returned to the caller, never retried here

use crate::aggregates::RiskScoreRecord;
use crate::catalog::Questionnaire;
use crate::error::StoreError;
use crate::model::{
    Answer, Facility, FacilityId, Question, QuestionId, QuestionOption, Section, SectionId,
};
use chrono::Utc;
use std::collections::BTreeMap;

pub type StoreResult<T> = Result<T, StoreError>;

/// Read and write queries the engine needs from its storage
pub trait AssessmentStore {
    fn facility(&self, id: &str) -> StoreResult<Option<Facility>>;

    /// All facilities, ordered by id
    fn facilities(&self) -> StoreResult<Vec<Facility>>;

    fn sections(&self) -> StoreResult<Vec<Section>>;

    /// Questions of one section, or all of them, ordered by id
    fn questions(&self, section: Option<SectionId>) -> StoreResult<Vec<Question>>;

    fn question_options(&self, question: QuestionId) -> StoreResult<Vec<QuestionOption>>;

    fn required_questions(&self, section: Option<SectionId>) -> StoreResult<Vec<Question>> {
        Ok(self
            .questions(section)?
            .into_iter()
            .filter(|q| q.required)
            .collect())
    }

    /// Every stored answer of a facility; duplicates are possible in legacy data
    fn answers(&self, facility: &str) -> StoreResult<Vec<Answer>>;

    /// Insert or replace the facility's answer to a question
    ///
    /// The newest `updated_at` wins; on a tie the later write wins.
    fn upsert_answer(&mut self, answer: &Answer) -> StoreResult<()>;

    fn upsert_facility(&mut self, facility: &Facility) -> StoreResult<()>;

    /// Replace sections, questions and options with the given catalog
    fn load_catalog(&mut self, questionnaire: &Questionnaire) -> StoreResult<()>;

    fn risk_score(&self, facility: &str) -> StoreResult<Option<RiskScoreRecord>>;

    fn upsert_risk_score(&mut self, facility: &str, record: &RiskScoreRecord) -> StoreResult<()>;

    /// Store completion progress on the facility; unknown facilities are ignored
    fn update_facility_progress(&mut self, facility: &str, progress: u8) -> StoreResult<()>;

    fn set_question_section(&mut self, question: QuestionId, section: SectionId) -> StoreResult<()>;

    /// Load the complete questionnaire in one value
    fn questionnaire(&self) -> StoreResult<Questionnaire> {
        let sections = self.sections()?;
        let questions = self.questions(None)?;
        let mut options = Vec::new();
        for q in &questions {
            options.extend(self.question_options(q.id)?);
        }
        Ok(Questionnaire::new(sections, questions, options))
    }
}

/// In-memory store with the same upsert semantics as the SQLite store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    facilities: BTreeMap<FacilityId, Facility>,
    sections: BTreeMap<SectionId, Section>,
    questions: BTreeMap<QuestionId, Question>,
    options: BTreeMap<QuestionId, Vec<QuestionOption>>,
    /// Insertion order; legacy duplicates only enter through `push_raw_answer`
    answers: Vec<Answer>,
    scores: BTreeMap<FacilityId, RiskScoreRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_questionnaire(questionnaire: &Questionnaire) -> Self {
        let mut store = Self::default();
        store.install_catalog(questionnaire);
        store
    }

    /// Append an answer without the uniqueness check, as legacy rows were written
    pub fn push_raw_answer(&mut self, answer: Answer) -> &mut Self {
        self.answers.push(answer);
        self
    }

    fn install_catalog(&mut self, questionnaire: &Questionnaire) {
        self.sections = questionnaire
            .sections()
            .iter()
            .map(|s| (s.id, s.clone()))
            .collect();
        self.questions = questionnaire.questions().map(|q| (q.id, q.clone())).collect();
        self.options.clear();
        for option in questionnaire.all_options() {
            self.options
                .entry(option.question_id)
                .or_default()
                .push(option.clone());
        }
    }
}

impl AssessmentStore for MemoryStore {
    fn facility(&self, id: &str) -> StoreResult<Option<Facility>> {
        Ok(self.facilities.get(id).cloned())
    }

    fn facilities(&self) -> StoreResult<Vec<Facility>> {
        Ok(self.facilities.values().cloned().collect())
    }

    fn sections(&self) -> StoreResult<Vec<Section>> {
        Ok(self.sections.values().cloned().collect())
    }

    fn questions(&self, section: Option<SectionId>) -> StoreResult<Vec<Question>> {
        Ok(self
            .questions
            .values()
            .filter(|q| section.map_or(true, |s| q.section_id == s))
            .cloned()
            .collect())
    }

    fn question_options(&self, question: QuestionId) -> StoreResult<Vec<QuestionOption>> {
        Ok(self.options.get(&question).cloned().unwrap_or_default())
    }

    fn answers(&self, facility: &str) -> StoreResult<Vec<Answer>> {
        Ok(self
            .answers
            .iter()
            .filter(|a| a.facility_id == facility)
            .cloned()
            .collect())
    }

    fn upsert_answer(&mut self, answer: &Answer) -> StoreResult<()> {
        let newer_exists = self.answers.iter().any(|a| {
            a.facility_id == answer.facility_id
                && a.question_id == answer.question_id
                && a.updated_at > answer.updated_at
        });
        if newer_exists {
            return Ok(());
        }
        self.answers.retain(|a| {
            !(a.facility_id == answer.facility_id && a.question_id == answer.question_id)
        });
        self.answers.push(answer.clone());
        Ok(())
    }

    fn upsert_facility(&mut self, facility: &Facility) -> StoreResult<()> {
        self.facilities.insert(facility.id.clone(), facility.clone());
        Ok(())
    }

    fn load_catalog(&mut self, questionnaire: &Questionnaire) -> StoreResult<()> {
        self.install_catalog(questionnaire);
        Ok(())
    }

    fn risk_score(&self, facility: &str) -> StoreResult<Option<RiskScoreRecord>> {
        Ok(self.scores.get(facility).cloned())
    }

    fn upsert_risk_score(&mut self, facility: &str, record: &RiskScoreRecord) -> StoreResult<()> {
        self.scores.insert(facility.to_string(), record.clone());
        Ok(())
    }

    fn update_facility_progress(&mut self, facility: &str, progress: u8) -> StoreResult<()> {
        if let Some(f) = self.facilities.get_mut(facility) {
            f.progress = progress.min(100);
            f.updated_at = Some(Utc::now());
        }
        Ok(())
    }

    fn set_question_section(
        &mut self,
        question: QuestionId,
        section: SectionId,
    ) -> StoreResult<()> {
        if let Some(q) = self.questions.get_mut(&question) {
            q.section_id = section;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn answer(question_id: QuestionId, value: &str) -> Answer {
        Answer {
            facility_id: "f1".into(),
            question_id,
            value: Some(value.into()),
            numeric_value: None,
            selected_options: None,
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_upsert_answer_keeps_one_per_question() {
        let mut store = MemoryStore::new();
        store.upsert_answer(&answer(1001, "old")).unwrap();
        store.upsert_answer(&answer(1001, "new")).unwrap();
        let answers = store.answers("f1").unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].value.as_deref(), Some("new"));
    }

    #[test]
    fn test_upsert_answer_keeps_newest_timestamp() {
        let mut store = MemoryStore::new();
        let mut newer = answer(1001, "newer");
        newer.updated_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        store.upsert_answer(&newer).unwrap();
        store.upsert_answer(&answer(1001, "older")).unwrap();
        let answers = store.answers("f1").unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].value.as_deref(), Some("newer"));
    }

    #[test]
    fn test_raw_answers_keep_duplicates() {
        let mut store = MemoryStore::new();
        store
            .push_raw_answer(answer(1001, "a"))
            .push_raw_answer(answer(1001, "b"));
        assert_eq!(store.answers("f1").unwrap().len(), 2);
        assert!(store.answers("f2").unwrap().is_empty());
    }

    #[test]
    fn test_questionnaire_round_trips_through_store() {
        let q = Questionnaire::builtin().unwrap();
        let store = MemoryStore::with_questionnaire(&q);
        let loaded = store.questionnaire().unwrap();
        assert_eq!(loaded.sections().len(), q.sections().len());
        assert_eq!(loaded.options_for(3002), q.options_for(3002));
        assert_eq!(
            store.required_questions(Some(1)).unwrap().len(),
            q.required_questions().filter(|q| q.section_id == 1).count()
        );
    }

    #[test]
    fn test_progress_update_ignores_unknown_facility() {
        let mut store = MemoryStore::new();
        store.update_facility_progress("missing", 50).unwrap();
        assert!(store.facility("missing").unwrap().is_none());
    }
}
