use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::answers::AnswerValue;
use crate::rule::Rule;

/// Supported question widgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    #[serde(alias = "single_select")]
    Single,
    #[serde(alias = "multi_select")]
    Multiselect,
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "free_text")]
    Text,
    /// Display-only text; never carries an answer.
    Statement,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Single => "single",
            QuestionType::Multiselect => "multiselect",
            QuestionType::Bool => "bool",
            QuestionType::Text => "text",
            QuestionType::Statement => "statement",
        }
    }

    pub fn is_select(&self) -> bool {
        matches!(self, QuestionType::Single | QuestionType::Multiselect)
    }
}

impl std::str::FromStr for QuestionType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "single" | "single_select" => Ok(QuestionType::Single),
            "multiselect" | "multi_select" => Ok(QuestionType::Multiselect),
            "bool" | "boolean" => Ok(QuestionType::Bool),
            "text" | "free_text" => Ok(QuestionType::Text),
            "statement" => Ok(QuestionType::Statement),
            other => Err(format!(
                "unknown question type '{}'; expected single|multiselect|bool|text|statement",
                other
            )),
        }
    }
}

/// A single question in a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionSpec {
    pub key: String,
    #[serde(default, alias = "prompt")]
    pub label: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(
        default,
        alias = "visibility_rule",
        deserialize_with = "deserialize_rule",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<Rule>")]
    pub show_if: Option<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<AnswerValue>,
}

impl QuestionSpec {
    pub fn new(key: impl Into<String>, kind: QuestionType) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            kind,
            options: Vec::new(),
            show_if: None,
            help: None,
            placeholder: None,
            default: None,
        }
    }

    pub fn with_options<S: Into<String>>(mut self, options: impl IntoIterator<Item = S>) -> Self {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rule(mut self, rule: impl Into<Rule>) -> Self {
        self.show_if = Some(rule.into());
        self
    }

    /// Label shown to respondents, falling back to the key.
    pub fn display_label(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.key
        } else {
            &self.label
        }
    }
}

/// `null` and `{}` both mean "no rule".
fn deserialize_rule<'de, D>(deserializer: D) -> Result<Option<Rule>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
