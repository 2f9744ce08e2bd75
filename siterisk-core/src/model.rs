//! Questionnaire and assessment data model
//!
//! Facilities own answers; sections own questions; questions own options.
//! Everything here is plain data exchanged with an [`crate::store::AssessmentStore`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type FacilityId = String;
pub type SectionId = u32;
pub type QuestionId = u32;

/// Legacy numbering convention: question 2004 lives in section 2.
pub const LEGACY_SECTION_DIVISOR: u32 = 1000;

/// Section a question id would belong to under the legacy numbering convention
pub fn legacy_section_of(question_id: QuestionId) -> SectionId {
    question_id / LEGACY_SECTION_DIVISOR
}

/// An assessed facility
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Facility {
    pub id: FacilityId,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment_date: Option<NaiveDate>,
    /// Completion percentage (0-100)
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A weighted grouping of questions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    /// Share of the weighted-section-sum total (0-1)
    #[serde(default)]
    pub weight: f64,
}

/// Question input widget type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Select,
    Multiselect,
    Number,
    Text,
    Date,
}

/// Importance tier of a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

impl Importance {
    /// Weight multiplier: low 0.5, medium 1, high 2
    pub fn multiplier(self) -> f64 {
        match self {
            Importance::Low => 0.5,
            Importance::Medium => 1.0,
            Importance::High => 2.0,
        }
    }
}

/// The axis a question or option contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskFactor {
    Probability,
    Impact,
    Mitigation,
    Unknown,
}

impl RiskFactor {
    pub const AXES: [RiskFactor; 3] = [
        RiskFactor::Probability,
        RiskFactor::Impact,
        RiskFactor::Mitigation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFactor::Probability => "probability",
            RiskFactor::Impact => "impact",
            RiskFactor::Mitigation => "mitigation",
            RiskFactor::Unknown => "unknown",
        }
    }
}

/// Coarse risk category carried by options and thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRiskLevel {
    Low,
    Medium,
    High,
}

/// Comparison operator of a numeric threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdOperator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "=")]
    Eq,
}

impl ThresholdOperator {
    pub fn test(self, answer: f64, bound: f64) -> bool {
        match self {
            ThresholdOperator::Gt => answer > bound,
            ThresholdOperator::Ge => answer >= bound,
            ThresholdOperator::Lt => answer < bound,
            ThresholdOperator::Le => answer <= bound,
            ThresholdOperator::Eq => answer == bound,
        }
    }
}

/// One bucket of a numeric question; the first satisfied threshold wins
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Threshold {
    pub operator: ThresholdOperator,
    pub value: f64,
    pub risk_level: OptionRiskLevel,
    /// Explicit score overriding the level's position on the scale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
}

/// A questionnaire item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Question {
    pub id: QuestionId,
    pub section_id: SectionId,
    pub text: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
    /// Axis used when the selected option does not carry its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_factor: Option<RiskFactor>,
    /// Metadata questions (facility name, assessor, ...) never score
    #[serde(default = "default_true")]
    pub scoring: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thresholds: Vec<Threshold>,
}

fn default_true() -> bool {
    true
}

impl Question {
    /// Importance multiplier, or 1.0 when the question has no tier
    pub fn importance_weight(&self) -> f64 {
        self.importance.map(Importance::multiplier).unwrap_or(1.0)
    }
}

/// A selectable answer of a question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct QuestionOption {
    pub question_id: QuestionId,
    /// Stored value; matched against selected values
    pub value: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<OptionRiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_factor: Option<RiskFactor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl QuestionOption {
    /// Whether a selected value refers to this option (by value or by label)
    pub fn matches(&self, selected: &str) -> bool {
        self.value == selected || (!self.label.is_empty() && self.label == selected)
    }
}

/// A stored answer, exactly as the persistence layer returns it
///
/// `selected_options` is kept as raw JSON: legacy rows hold arrays of
/// strings, arrays of `{label, value}` objects, JSON-encoded strings or maps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Answer {
    pub facility_id: FacilityId,
    pub question_id: QuestionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_options: Option<Value>,
    pub updated_at: DateTime<Utc>,
}
