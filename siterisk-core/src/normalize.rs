//! Answer normalization
//!
//! Global invariants enforced:
//! - Normalization is pure and never fails; bad shapes become `None`
//! - At most one answer per (facility, question) reaches scoring

use crate::model::{Answer, QuestionId};
use crate::options::flatten_selected;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Canonical form of a stored answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum NormalizedAnswer {
    None,
    Text(String),
    Numeric(f64),
    /// Every selected value, in stored order
    Options(Vec<String>),
}

impl NormalizedAnswer {
    pub fn is_answered(&self) -> bool {
        !matches!(self, NormalizedAnswer::None)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NormalizedAnswer::None => "none",
            NormalizedAnswer::Text(_) => "text",
            NormalizedAnswer::Numeric(_) => "numeric",
            NormalizedAnswer::Options(_) => "options",
        }
    }

    /// Human-readable rendering used in recommendations
    pub fn display(&self) -> String {
        match self {
            NormalizedAnswer::None => String::new(),
            NormalizedAnswer::Text(t) => t.clone(),
            NormalizedAnswer::Numeric(n) => format_number(*n),
            NormalizedAnswer::Options(values) => values.join(", "),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Convert a raw answer into its canonical form
///
/// Precedence: numeric, then selected options, then free text.
pub fn normalize_answer(answer: &Answer) -> NormalizedAnswer {
    if let Some(n) = answer.numeric_value {
        if n.is_finite() {
            return NormalizedAnswer::Numeric(n);
        }
        warn!(
            facility_id = %answer.facility_id,
            question_id = answer.question_id,
            "ignoring non-finite numeric answer"
        );
    }

    if let Some(raw) = &answer.selected_options {
        match flatten_selected(raw) {
            Ok(values) if !values.is_empty() => return NormalizedAnswer::Options(values),
            Ok(_) => {}
            Err(e) => {
                warn!(
                    facility_id = %answer.facility_id,
                    question_id = answer.question_id,
                    error = %e,
                    "treating malformed selected options as unanswered"
                );
                return NormalizedAnswer::None;
            }
        }
    }

    match answer.value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => NormalizedAnswer::Text(text.to_string()),
        _ => NormalizedAnswer::None,
    }
}

/// Collapse duplicate answers to one per question, last write wins
///
/// The newest `updated_at` wins; on a tie the later entry in input order wins.
/// Output is ordered by question id.
pub fn collapse_duplicates(answers: Vec<Answer>) -> Vec<Answer> {
    let mut latest: BTreeMap<QuestionId, Answer> = BTreeMap::new();
    for answer in answers {
        match latest.get(&answer.question_id) {
            Some(existing) if existing.updated_at > answer.updated_at => {}
            _ => {
                latest.insert(answer.question_id, answer);
            }
        }
    }
    latest.into_values().collect()
}

/// An answer paired with its canonical form
#[derive(Debug, Clone)]
pub struct NormalizedEntry {
    pub answer: Answer,
    pub normalized: NormalizedAnswer,
}

/// Deduplicate and normalize a facility's answers in one pass
pub fn prepare_answers(answers: Vec<Answer>) -> Vec<NormalizedEntry> {
    collapse_duplicates(answers)
        .into_iter()
        .map(|answer| {
            let normalized = normalize_answer(&answer);
            NormalizedEntry { answer, normalized }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn answer(question_id: QuestionId) -> Answer {
        Answer {
            facility_id: "f1".to_string(),
            question_id,
            value: None,
            numeric_value: None,
            selected_options: None,
            updated_at: Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_numeric_takes_precedence() {
        let mut a = answer(2001);
        a.numeric_value = Some(25.0);
        a.value = Some("twenty five".to_string());
        a.selected_options = Some(json!(["x"]));
        assert_eq!(normalize_answer(&a), NormalizedAnswer::Numeric(25.0));
    }

    #[test]
    fn test_options_before_text() {
        let mut a = answer(3002);
        a.selected_options = Some(json!(["2n-redundant"]));
        a.value = Some("notes".to_string());
        assert_eq!(
            normalize_answer(&a),
            NormalizedAnswer::Options(vec!["2n-redundant".to_string()])
        );
    }

    #[test]
    fn test_empty_options_fall_through_to_text() {
        let mut a = answer(3002);
        a.selected_options = Some(json!([]));
        a.value = Some("  Tokyo  ".to_string());
        assert_eq!(normalize_answer(&a), NormalizedAnswer::Text("Tokyo".to_string()));
    }

    #[test]
    fn test_unanswered() {
        let mut a = answer(1001);
        a.value = Some("   ".to_string());
        assert_eq!(normalize_answer(&a), NormalizedAnswer::None);
        assert!(!normalize_answer(&a).is_answered());
    }

    #[test]
    fn test_malformed_options_are_unanswered() {
        let mut a = answer(3004);
        a.selected_options = Some(json!("{not json"));
        a.value = Some("fallback text".to_string());
        assert_eq!(normalize_answer(&a), NormalizedAnswer::None);
    }

    #[test]
    fn test_nan_numeric_is_ignored() {
        let mut a = answer(2001);
        a.numeric_value = Some(f64::NAN);
        assert_eq!(normalize_answer(&a), NormalizedAnswer::None);
    }

    #[test]
    fn test_collapse_duplicates_last_write_wins() {
        let mut older = answer(2001);
        older.numeric_value = Some(5.0);
        let mut newer = answer(2001);
        newer.numeric_value = Some(25.0);
        newer.updated_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let other = answer(1001);

        let collapsed = collapse_duplicates(vec![newer.clone(), other, older]);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].question_id, 1001);
        assert_eq!(collapsed[1].numeric_value, Some(25.0));
    }

    #[test]
    fn test_collapse_duplicates_tie_prefers_later_entry() {
        let mut first = answer(2001);
        first.numeric_value = Some(1.0);
        let mut second = answer(2001);
        second.numeric_value = Some(2.0);
        let collapsed = collapse_duplicates(vec![first, second]);
        assert_eq!(collapsed[0].numeric_value, Some(2.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(NormalizedAnswer::Numeric(25.0).display(), "25");
        assert_eq!(NormalizedAnswer::Numeric(2.5).display(), "2.5");
        assert_eq!(
            NormalizedAnswer::Options(vec!["a".into(), "b".into()]).display(),
            "a, b"
        );
    }
}
