//! Completed questionnaire records.

use chrono::{DateTime, Utc};
use form_spec::{AnswerMap, FormSpec, prune_hidden_answers};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::Result;
use crate::backend::{SchemaStore, open_store};
use crate::config::EditorConfig;

/// One stored submission, written as `<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: String,
    pub form_key: String,
    pub submitted_at: DateTime<Utc>,
    pub answers: AnswerMap,
}

impl SubmissionRecord {
    pub fn new(form_key: impl Into<String>, answers: AnswerMap, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            form_key: form_key.into(),
            submitted_at: now,
            answers,
        }
    }
}

/// Where a submission was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub id: String,
    pub location: String,
}

/// Expands `{submission_id}` and the form placeholders in `template`.
pub fn submission_path(template: &str, form_key: &str, submission_id: &str) -> String {
    ["{form_key}", "{questionnaire}", "{form}"]
        .iter()
        .fold(template.to_string(), |path, placeholder| {
            path.replace(placeholder, form_key)
        })
        .replace("{submission_id}", submission_id)
}

/// Stores `answers` for the configured form. Answers to questions hidden by
/// `spec` are dropped first.
pub fn submit_answers(
    config: &EditorConfig,
    spec: &FormSpec,
    answers: &AnswerMap,
) -> Result<SubmissionOutcome> {
    let store = open_store(config)?;
    submit_to(store.as_ref(), config, spec, answers, Utc::now())
}

pub(crate) fn submit_to(
    store: &dyn SchemaStore,
    config: &EditorConfig,
    spec: &FormSpec,
    answers: &AnswerMap,
    now: DateTime<Utc>,
) -> Result<SubmissionOutcome> {
    let record = SubmissionRecord::new(&config.form_key, prune_hidden_answers(spec, answers), now);
    let path = submission_path(&config.submissions_path, &config.form_key, &record.id);
    let outcome = store.save_submission(&path, &record)?;
    info!(id = %outcome.id, location = %outcome.location, "stored submission");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::TimeZone;
    use form_spec::{AnswerValue, Clause, Operator, QuestionSpec, QuestionType};
    use tempfile::TempDir;

    use super::*;
    use crate::local::LocalStore;

    #[test]
    fn paths_expand_form_and_id_placeholders() {
        assert_eq!(
            submission_path("{form_key}/submissions/{submission_id}.json", "intake", "ab12"),
            "intake/submissions/ab12.json"
        );
        assert_eq!(
            submission_path("responses/{questionnaire}-{submission_id}.json", "hr", "x"),
            "responses/hr-x.json"
        );
    }

    #[test]
    fn record_ids_are_unique_hex() {
        let now = Utc::now();
        let first = SubmissionRecord::new("intake", AnswerMap::new(), now);
        let second = SubmissionRecord::new("intake", AnswerMap::new(), now);
        assert_eq!(first.id.len(), 32);
        assert!(first.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn hidden_answers_are_not_stored() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStore::new(dir.path().join("form_schema.json"));
        let config = EditorConfig {
            form_key: "intake".to_string(),
            ..EditorConfig::default()
        };
        let spec = FormSpec::from_questions(vec![
            QuestionSpec::new("uses_ai", QuestionType::Bool),
            QuestionSpec::new("ai_detail", QuestionType::Text)
                .with_rule(Clause::new("uses_ai", Operator::IsTrue, None)),
        ]);
        let answers = AnswerMap::from([
            ("uses_ai".to_string(), AnswerValue::Flag(false)),
            ("ai_detail".to_string(), AnswerValue::from("chatbot")),
        ]);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let outcome = submit_to(&store, &config, &spec, &answers, now).expect("submit");
        let written = dir
            .path()
            .join("intake/submissions")
            .join(format!("{}.json", outcome.id));
        assert_eq!(outcome.location, written.display().to_string());

        let record: SubmissionRecord =
            serde_json::from_str(&fs::read_to_string(&written).expect("read")).expect("json");
        assert_eq!(record.form_key, "intake");
        assert_eq!(record.submitted_at, now);
        assert_eq!(record.answers.len(), 1);
        assert!(!record.answers.contains_key("ai_detail"));
    }
}
