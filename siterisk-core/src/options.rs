//! Option payload normalization
//!
//! Stored option data arrives in several shapes: arrays of strings, arrays of
//! `{label, value}` objects, JSON-encoded strings of either, or plain maps.
//! This module converts each shape once, at the boundary, so scoring only
//! ever sees a flat list of option values.

use crate::model::{QuestionId, QuestionOption};
use serde_json::{Map, Value};
use thiserror::Error;

/// JSON-in-JSON is unwrapped at most this many times
const MAX_ENCODING_DEPTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionShapeError {
    #[error("option payload is not valid JSON: {0}")]
    Unparsable(String),
    #[error("option payload is nested too deeply")]
    TooDeep,
    #[error("unsupported option payload: {0}")]
    Unsupported(&'static str),
}

/// An option carried as a `{label, value}` object
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledOption {
    pub label: String,
    pub value: String,
}

/// The recognised shapes of a stored option payload
#[derive(Debug, Clone, PartialEq)]
pub enum OptionPayload {
    Empty,
    StringList(Vec<String>),
    LabeledOptionList(Vec<LabeledOption>),
    /// A JSON document stored inside a string
    RawJson(String),
    /// `{ value: label }` or `{ value: true }` maps
    Map(Map<String, Value>),
}

impl OptionPayload {
    /// Classify a raw JSON value into one of the known shapes
    pub fn classify(value: &Value) -> Result<Self, OptionShapeError> {
        match value {
            Value::Null => Ok(OptionPayload::Empty),
            Value::String(s) if s.trim().is_empty() => Ok(OptionPayload::Empty),
            Value::String(s) => Ok(OptionPayload::RawJson(s.clone())),
            Value::Number(n) => Ok(OptionPayload::StringList(vec![n.to_string()])),
            Value::Bool(_) => Err(OptionShapeError::Unsupported("boolean")),
            Value::Array(items) => classify_array(items),
            Value::Object(map) => match labeled_from_object(map) {
                Some(single) => Ok(OptionPayload::LabeledOptionList(vec![single])),
                None => Ok(OptionPayload::Map(map.clone())),
            },
        }
    }

    /// Flatten the payload into selected option values
    pub fn into_values(self) -> Result<Vec<String>, OptionShapeError> {
        self.into_values_at(0)
    }

    fn into_values_at(self, depth: usize) -> Result<Vec<String>, OptionShapeError> {
        match self {
            OptionPayload::Empty => Ok(Vec::new()),
            OptionPayload::StringList(values) => Ok(values),
            OptionPayload::LabeledOptionList(options) => {
                Ok(options.into_iter().map(|o| o.value).collect())
            }
            OptionPayload::RawJson(raw) => {
                if depth >= MAX_ENCODING_DEPTH {
                    return Err(OptionShapeError::TooDeep);
                }
                let parsed: Value = serde_json::from_str(&raw)
                    .map_err(|e| OptionShapeError::Unparsable(e.to_string()))?;
                match parsed {
                    // A quoted scalar is a single selected value
                    Value::String(inner) if serde_json::from_str::<Value>(&inner).is_err() => {
                        Ok(vec![inner])
                    }
                    other => OptionPayload::classify(&other)?.into_values_at(depth + 1),
                }
            }
            OptionPayload::Map(map) => Ok(map
                .into_iter()
                .filter(|(_, v)| is_truthy(v))
                .map(|(k, _)| k)
                .collect()),
        }
    }
}

/// Flatten any stored selection payload into a list of selected values
pub fn flatten_selected(value: &Value) -> Result<Vec<String>, OptionShapeError> {
    OptionPayload::classify(value)?.into_values()
}

fn classify_array(items: &[Value]) -> Result<OptionPayload, OptionShapeError> {
    if items.iter().all(|v| v.is_string() || v.is_number()) {
        let values = items
            .iter()
            .map(scalar_to_string)
            .filter(|s| !s.is_empty())
            .collect();
        return Ok(OptionPayload::StringList(values));
    }

    let mut labeled = Vec::new();
    for item in items {
        match item {
            Value::Null => {}
            Value::String(_) | Value::Number(_) => {
                let s = scalar_to_string(item);
                labeled.push(LabeledOption {
                    label: s.clone(),
                    value: s,
                });
            }
            Value::Object(map) => match labeled_from_object(map) {
                Some(option) => labeled.push(option),
                None => return Err(OptionShapeError::Unsupported("object without value")),
            },
            Value::Array(_) => return Err(OptionShapeError::Unsupported("nested array")),
            Value::Bool(_) => return Err(OptionShapeError::Unsupported("boolean")),
        }
    }
    Ok(OptionPayload::LabeledOptionList(labeled))
}

fn labeled_from_object(map: &Map<String, Value>) -> Option<LabeledOption> {
    let value = map
        .get("value")
        .or_else(|| map.get("id"))
        .filter(|v| v.is_string() || v.is_number())
        .map(scalar_to_string)?;
    let label = map
        .get("label")
        .filter(|v| v.is_string())
        .map(scalar_to_string)
        .unwrap_or_else(|| value.clone());
    Some(LabeledOption { label, value })
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

/// Build option definitions for a question from a legacy `options` payload
///
/// Objects may carry `risk_score`, `risk_level`, `risk_factor` and `weight`
/// alongside `label`/`value`; plain strings become label-only options; maps
/// are read as `{ value: label }`.
pub fn option_definitions(
    question_id: QuestionId,
    payload: &Value,
) -> Result<Vec<QuestionOption>, OptionShapeError> {
    let bare = |value: String, label: String| QuestionOption {
        question_id,
        value,
        label,
        risk_score: None,
        risk_level: None,
        risk_factor: None,
        weight: None,
    };

    match payload {
        Value::Null => Ok(Vec::new()),
        Value::String(raw) => {
            let parsed: Value = serde_json::from_str(raw)
                .map_err(|e| OptionShapeError::Unparsable(e.to_string()))?;
            if parsed.is_string() {
                return Err(OptionShapeError::Unsupported("scalar option definition"));
            }
            option_definitions(question_id, &parsed)
        }
        Value::Array(items) => {
            let mut options = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(_) | Value::Number(_) => {
                        let s = scalar_to_string(item);
                        options.push(bare(s.clone(), s));
                    }
                    Value::Object(map) => {
                        let Some(labeled) = labeled_from_object(map) else {
                            return Err(OptionShapeError::Unsupported("object without value"));
                        };
                        let mut option = bare(labeled.value, labeled.label);
                        option.risk_score = map.get("risk_score").and_then(Value::as_f64);
                        option.weight = map.get("weight").and_then(Value::as_f64);
                        option.risk_level = map
                            .get("risk_level")
                            .and_then(|v| serde_json::from_value(v.clone()).ok());
                        option.risk_factor = map
                            .get("risk_factor")
                            .and_then(|v| serde_json::from_value(v.clone()).ok());
                        options.push(option);
                    }
                    _ => return Err(OptionShapeError::Unsupported("option entry")),
                }
            }
            Ok(options)
        }
        Value::Object(map) => Ok(map
            .iter()
            .map(|(value, label)| {
                let label = label.as_str().map(str::to_string).unwrap_or_default();
                bare(value.clone(), label)
            })
            .collect()),
        Value::Number(_) | Value::Bool(_) => {
            Err(OptionShapeError::Unsupported("scalar option definition"))
        }
    }
}
