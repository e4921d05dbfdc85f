use std::convert::Infallible;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
    answers::{AnswerMap, AnswerValue},
    spec::{
        form::FormSpec,
        question::{QuestionSpec, QuestionType},
    },
    visibility::{is_visible, resolve_visibility},
};

/// Supplies answers while the renderer walks a form.
pub trait Responder {
    type Error;

    /// Returns the answer for a visible question. `None` clears it.
    fn answer(
        &mut self,
        question: &QuestionSpec,
        current: Option<&AnswerValue>,
    ) -> Result<Option<AnswerValue>, Self::Error>;
}

/// Keeps whatever answer is already recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAnswers;

impl Responder for KeepAnswers {
    type Error = Infallible;

    fn answer(
        &mut self,
        _question: &QuestionSpec,
        current: Option<&AnswerValue>,
    ) -> Result<Option<AnswerValue>, Self::Error> {
        Ok(current.cloned())
    }
}

/// Walks the form in document order and collects the final answers.
///
/// Each question is evaluated against the answers gathered so far. Hidden
/// questions and statements lose any recorded answer; visible questions are
/// handed to the responder.
pub fn render<R: Responder>(
    spec: &FormSpec,
    initial_answers: &AnswerMap,
    responder: &mut R,
) -> Result<AnswerMap, R::Error> {
    let mut answers = initial_answers.clone();

    for question in &spec.questions {
        if !is_visible(question, &answers) {
            if answers.remove(&question.key).is_some() {
                debug!(question = %question.key, "cleared answer of hidden question");
            }
            continue;
        }
        if question.kind == QuestionType::Statement {
            answers.remove(&question.key);
            continue;
        }

        let current = answers.get(&question.key).cloned();
        match responder.answer(question, current.as_ref())? {
            Some(value) => {
                answers.insert(question.key.clone(), value);
            }
            None => {
                answers.remove(&question.key);
            }
        }
    }

    Ok(answers)
}

/// Re-evaluates the form without asking for anything new.
pub fn refresh(spec: &FormSpec, answers: &AnswerMap) -> AnswerMap {
    match render(spec, answers, &mut KeepAnswers) {
        Ok(answers) => answers,
        Err(never) => match never {},
    }
}

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// A visible question still lacks an answer.
    NeedInput,
    /// Every visible question is answered.
    Complete,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::NeedInput => "need_input",
            RenderStatus::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderProgress {
    pub answered: usize,
    pub total: usize,
}

/// Describes a single question for render outputs.
#[derive(Debug, Clone)]
pub struct RenderQuestion {
    pub key: String,
    pub label: String,
    pub help: Option<String>,
    pub kind: QuestionType,
    pub options: Vec<String>,
    pub visible: bool,
    pub current_value: Option<AnswerValue>,
    pub default: Option<AnswerValue>,
}

/// Collected payload used by both text and JSON renderers.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub title: String,
    pub introduction: Option<(String, Vec<String>)>,
    pub status: RenderStatus,
    pub next_question_key: Option<String>,
    pub progress: RenderProgress,
    pub questions: Vec<RenderQuestion>,
    pub submit_label: String,
}

/// Build the renderer payload from the form and the current answers.
pub fn build_render_payload(spec: &FormSpec, answers: &AnswerMap) -> RenderPayload {
    let answers = refresh(spec, answers);
    let visibility = resolve_visibility(spec, &answers);

    let questions = spec
        .questions
        .iter()
        .map(|question| RenderQuestion {
            key: question.key.clone(),
            label: question.display_label().to_string(),
            help: question.help.clone(),
            kind: question.kind,
            options: question.options.clone(),
            visible: visibility.get(&question.key).copied().unwrap_or(true),
            current_value: answers.get(&question.key).cloned(),
            default: question.default.clone(),
        })
        .collect::<Vec<_>>();

    let askable = questions
        .iter()
        .filter(|question| question.visible && question.kind != QuestionType::Statement)
        .collect::<Vec<_>>();
    let total = askable.len();
    let answered = askable
        .iter()
        .filter(|question| question.current_value.is_some())
        .count();
    let next_question_key = askable
        .iter()
        .find(|question| question.current_value.is_none())
        .map(|question| question.key.clone());

    let status = if next_question_key.is_some() {
        RenderStatus::NeedInput
    } else {
        RenderStatus::Complete
    };

    RenderPayload {
        title: spec.title().to_string(),
        introduction: spec.page.introduction(),
        status,
        next_question_key,
        progress: RenderProgress { answered, total },
        questions,
        submit_label: spec.page.submit_label().to_string(),
    }
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    let questions = payload
        .questions
        .iter()
        .map(|question| {
            let mut map = Map::new();
            map.insert("key".into(), Value::String(question.key.clone()));
            map.insert("label".into(), Value::String(question.label.clone()));
            map.insert(
                "help".into(),
                question
                    .help
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            map.insert("type".into(), Value::String(question.kind.as_str().into()));
            if !question.options.is_empty() {
                map.insert("options".into(), json!(question.options));
            }
            if let Some(current_value) = &question.current_value {
                map.insert("current_value".into(), json!(current_value));
            }
            if let Some(default) = &question.default {
                map.insert("default".into(), json!(default));
            }
            map.insert("visible".into(), Value::Bool(question.visible));
            Value::Object(map)
        })
        .collect::<Vec<_>>();

    json!({
        "title": payload.title,
        "status": payload.status.as_str(),
        "next_question_key": payload.next_question_key,
        "progress": {
            "answered": payload.progress.answered,
            "total": payload.progress.total,
        },
        "questions": questions,
        "submit_label": payload.submit_label,
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Form: {}", payload.title));
    lines.push(format!(
        "Status: {} ({}/{})",
        payload.status.as_str(),
        payload.progress.answered,
        payload.progress.total
    ));

    match &payload.next_question_key {
        Some(next) => lines.push(format!("Next question: {}", next)),
        None => lines.push("All visible questions are answered.".to_string()),
    }

    lines.push("Visible questions:".to_string());
    for question in payload.questions.iter().filter(|question| question.visible) {
        let mut entry = format!(" - {} ({})", question.key, question.label);
        if let Some(current_value) = &question.current_value {
            entry.push_str(&format!(" = {}", current_value.display()));
        }
        lines.push(entry);
    }

    let hidden = payload
        .questions
        .iter()
        .filter(|question| !question.visible)
        .map(|question| question.key.as_str())
        .collect::<Vec<_>>();
    if !hidden.is_empty() {
        lines.push(format!("Hidden questions: {}", hidden.join(", ")));
    }

    lines.join("\n")
}
