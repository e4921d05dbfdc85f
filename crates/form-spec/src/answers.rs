use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Answers recorded so far, keyed by question key. Unanswered keys are absent.
pub type AnswerMap = BTreeMap<String, AnswerValue>;

/// A single recorded answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Checkbox style answer.
    Flag(bool),
    /// Single-select choice or free text.
    Single(String),
    /// Multi-select choices in selection order.
    Multi(Vec<String>),
}

impl AnswerValue {
    /// Members of the answer when viewed as a set of selections.
    pub fn as_set(&self) -> BTreeSet<&str> {
        match self {
            AnswerValue::Flag(true) => BTreeSet::from(["true"]),
            AnswerValue::Flag(false) => BTreeSet::from(["false"]),
            AnswerValue::Single(text) => BTreeSet::from([text.as_str()]),
            AnswerValue::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            AnswerValue::Flag(flag) => *flag,
            AnswerValue::Single(text) => !text.is_empty(),
            AnswerValue::Multi(values) => !values.is_empty(),
        }
    }

    /// Human readable rendering used by the text renderer and CLI.
    pub fn display(&self) -> String {
        match self {
            AnswerValue::Flag(flag) => if *flag { "yes" } else { "no" }.to_string(),
            AnswerValue::Single(text) => text.clone(),
            AnswerValue::Multi(values) => values.join(", "),
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        AnswerValue::Single(value.to_string())
    }
}

impl From<String> for AnswerValue {
    fn from(value: String) -> Self {
        AnswerValue::Single(value)
    }
}

impl From<bool> for AnswerValue {
    fn from(value: bool) -> Self {
        AnswerValue::Flag(value)
    }
}

impl<S: Into<String>> From<Vec<S>> for AnswerValue {
    fn from(values: Vec<S>) -> Self {
        AnswerValue::Multi(values.into_iter().map(Into::into).collect())
    }
}

/// Problem found in a collected answer map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_key: Option<String>,
    pub message: String,
    pub code: String,
}

/// Outcome of checking an answer map against a form.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<ValidationError>,
    #[serde(default)]
    pub unknown_fields: Vec<String>,
    #[serde(default)]
    pub hidden_answers: Vec<String>,
}
