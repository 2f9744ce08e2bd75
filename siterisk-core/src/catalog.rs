//! Questionnaire catalog
//!
//! `Questionnaire` is the read-only metadata a computation runs against:
//! sections, questions and question options, loaded once and shared.
//! Catalog files accept the legacy option shapes and derive a missing
//! `section_id` from the question id; after loading, the explicit
//! section reference is the single source of truth.

use crate::model::{
    legacy_section_of, Importance, InputType, Question, QuestionId, QuestionOption, RiskFactor,
    Section, SectionId, Threshold,
};
use crate::options::option_definitions;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::warn;

const BUILTIN_CATALOG: &str = include_str!("../data/datacenter-catalog.json");

/// Sections, questions and options indexed for lookup
#[derive(Debug, Clone, Default)]
pub struct Questionnaire {
    sections: Vec<Section>,
    questions: BTreeMap<QuestionId, Question>,
    options: BTreeMap<QuestionId, Vec<QuestionOption>>,
}

impl Questionnaire {
    /// Index metadata; sections are kept in id order
    pub fn new(
        mut sections: Vec<Section>,
        questions: Vec<Question>,
        options: Vec<QuestionOption>,
    ) -> Self {
        sections.sort_by_key(|s| s.id);
        let questions = questions.into_iter().map(|q| (q.id, q)).collect();
        let mut by_question: BTreeMap<QuestionId, Vec<QuestionOption>> = BTreeMap::new();
        for option in options {
            by_question.entry(option.question_id).or_default().push(option);
        }
        Questionnaire {
            sections,
            questions,
            options: by_question,
        }
    }

    /// The questionnaire shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG).context("built-in catalog is invalid")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("invalid catalog: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: CatalogFile =
            serde_json::from_str(content).context("failed to parse catalog JSON")?;
        file.into_questionnaire()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.get(&id)
    }

    /// Questions in id order
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.questions.values()
    }

    pub fn options_for(&self, id: QuestionId) -> &[QuestionOption] {
        self.options.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_options(&self) -> impl Iterator<Item = &QuestionOption> {
        self.options.values().flatten()
    }

    pub fn required_questions(&self) -> impl Iterator<Item = &Question> {
        self.questions.values().filter(|q| q.required)
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    sections: Vec<Section>,
    #[serde(default)]
    questions: Vec<CatalogQuestion>,
}

/// A question as written in a catalog file
#[derive(Debug, Deserialize)]
struct CatalogQuestion {
    id: QuestionId,
    #[serde(default)]
    section_id: Option<SectionId>,
    text: String,
    #[serde(rename = "type")]
    input_type: InputType,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    importance: Option<Importance>,
    #[serde(default)]
    risk_factor: Option<RiskFactor>,
    #[serde(default)]
    scoring: Option<bool>,
    #[serde(default)]
    thresholds: Vec<Threshold>,
    /// Any of the legacy option shapes
    #[serde(default)]
    options: Value,
}

impl CatalogFile {
    fn into_questionnaire(self) -> Result<Questionnaire> {
        let section_ids: BTreeSet<SectionId> = self.sections.iter().map(|s| s.id).collect();
        let mut seen = BTreeSet::new();
        let mut questions = Vec::with_capacity(self.questions.len());
        let mut options = Vec::new();

        for q in self.questions {
            if !seen.insert(q.id) {
                anyhow::bail!("duplicate question id {}", q.id);
            }
            let section_id = q.section_id.unwrap_or_else(|| legacy_section_of(q.id));
            if !section_ids.contains(&section_id) {
                warn!(question_id = q.id, section_id, "question refers to an unknown section");
            }

            let defs = option_definitions(q.id, &q.options)
                .with_context(|| format!("invalid options for question {}", q.id))?;
            options.extend(defs);

            // Free-text and date answers describe the facility rather than its risk
            let scoring = q
                .scoring
                .unwrap_or(!matches!(q.input_type, InputType::Text | InputType::Date));

            questions.push(Question {
                id: q.id,
                section_id,
                text: q.text,
                input_type: q.input_type,
                required: q.required,
                importance: q.importance,
                risk_factor: q.risk_factor,
                scoring,
                thresholds: q.thresholds,
            });
        }

        Ok(Questionnaire::new(self.sections, questions, options))
    }
}
