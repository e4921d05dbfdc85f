use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::spec::question::QuestionSpec;

pub const DEFAULT_PAGE_TITLE: &str = "Questionnaire";
pub const DEFAULT_INTRO_HEADING: &str = "Welcome!";
pub const DEFAULT_INTRO_PARAGRAPHS: [&str; 2] = [
    "Please answer the questions below so we can tailor the experience to you.",
    "Questions may appear or disappear automatically depending on your responses.",
];
pub const DEFAULT_SUBMIT_LABEL: &str = "Submit questionnaire";
pub const DEFAULT_SUBMIT_SUCCESS_MESSAGE: &str = "Responses captured.";

/// Introduction block shown above the questions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Introduction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraphs: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SubmitSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
}

/// Presentation settings for the questionnaire page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PageSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_introduction: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introduction: Option<Introduction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit: Option<SubmitSettings>,
}

impl PageSettings {
    pub fn is_empty(&self) -> bool {
        self == &PageSettings::default()
    }

    /// Introduction heading and paragraphs, or `None` when hidden or blank.
    pub fn introduction(&self) -> Option<(String, Vec<String>)> {
        if !self.show_introduction.unwrap_or(true) {
            return None;
        }
        let intro = self.introduction.clone().unwrap_or_default();
        let heading = intro
            .heading
            .unwrap_or_else(|| DEFAULT_INTRO_HEADING.to_string());
        let paragraphs = intro
            .paragraphs
            .unwrap_or_else(|| DEFAULT_INTRO_PARAGRAPHS.iter().map(|p| p.to_string()).collect())
            .into_iter()
            .map(|paragraph| paragraph.trim().to_string())
            .filter(|paragraph| !paragraph.is_empty())
            .collect::<Vec<_>>();
        if heading.trim().is_empty() && paragraphs.is_empty() {
            None
        } else {
            Some((heading, paragraphs))
        }
    }

    pub fn submit_label(&self) -> &str {
        self.submit
            .as_ref()
            .and_then(|submit| submit.label.as_deref())
            .filter(|label| !label.trim().is_empty())
            .unwrap_or(DEFAULT_SUBMIT_LABEL)
    }

    pub fn success_message(&self) -> &str {
        self.submit
            .as_ref()
            .and_then(|submit| submit.success_message.as_deref())
            .filter(|message| !message.trim().is_empty())
            .unwrap_or(DEFAULT_SUBMIT_SUCCESS_MESSAGE)
    }
}

/// Top-level questionnaire definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FormSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "PageSettings::is_empty")]
    pub page: PageSettings,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    /// Unrecognised top-level entries, written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FormSpec {
    pub fn from_questions(questions: Vec<QuestionSpec>) -> Self {
        Self {
            questions,
            ..Self::default()
        }
    }

    pub fn question(&self, key: &str) -> Option<&QuestionSpec> {
        self.questions.iter().find(|question| question.key == key)
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.questions.iter().position(|question| question.key == key)
    }

    /// Page title, then form label, then the default title.
    pub fn title(&self) -> &str {
        self.page
            .title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .or(self.label.as_deref())
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(DEFAULT_PAGE_TITLE)
    }
}

/// How the document was laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentShape {
    /// A bare JSON array of questions.
    QuestionList,
    /// An object with a `questions` array and optional page settings.
    Form,
}

/// A schema document as stored, remembering its original shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FormDocument {
    pub spec: FormSpec,
    pub shape: DocumentShape,
}

impl FormDocument {
    pub fn new(spec: FormSpec) -> Self {
        Self {
            spec,
            shape: DocumentShape::Form,
        }
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.is_array() {
            let questions: Vec<QuestionSpec> = serde_json::from_value(value)?;
            Ok(Self {
                spec: FormSpec::from_questions(questions),
                shape: DocumentShape::QuestionList,
            })
        } else {
            Ok(Self {
                spec: serde_json::from_value(value)?,
                shape: DocumentShape::Form,
            })
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self.shape {
            DocumentShape::QuestionList => serde_json::to_value(&self.spec.questions),
            DocumentShape::Form => serde_json::to_value(&self.spec),
        }
    }

    /// Two-space indented JSON with a trailing newline.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        let mut text = serde_json::to_string_pretty(&self.to_value()?)?;
        text.push('\n');
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_question_list_round_trips_as_list() {
        let raw = json!([{ "key": "q1", "label": "Name", "type": "text" }]);
        let document = FormDocument::from_value(raw.clone()).expect("document");
        assert_eq!(document.shape, DocumentShape::QuestionList);
        assert_eq!(document.to_value().unwrap(), raw);
    }

    #[test]
    fn unknown_top_level_entries_are_preserved() {
        let raw = json!({
            "label": "Demo",
            "questions": [],
            "meta": { "owner": "team" },
            "risks": [{ "key": "r1" }]
        });
        let document = FormDocument::from_value(raw).expect("document");
        let written = document.to_value().unwrap();
        assert_eq!(written["meta"]["owner"], "team");
        assert_eq!(written["risks"][0]["key"], "r1");
        assert!(written.get("page").is_none());
    }

    #[test]
    fn page_defaults_apply_when_settings_are_missing() {
        let spec = FormSpec::default();
        assert_eq!(spec.title(), DEFAULT_PAGE_TITLE);
        let (heading, paragraphs) = spec.page.introduction().expect("intro");
        assert_eq!(heading, DEFAULT_INTRO_HEADING);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(spec.page.submit_label(), DEFAULT_SUBMIT_LABEL);
    }

    #[test]
    fn hidden_introduction_yields_none() {
        let page = PageSettings {
            show_introduction: Some(false),
            ..PageSettings::default()
        };
        assert!(page.introduction().is_none());
    }
}
