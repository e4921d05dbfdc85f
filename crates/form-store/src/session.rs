//! In-memory editing session over a stored schema.
//!
//! The session owns the working copy of the document. Every mutation is
//! applied to a clone and only kept when the result still validates, so a
//! failed edit or a failed save never corrupts the working copy. Publishing
//! refuses to overwrite a stored document that changed after it was loaded.

use chrono::{DateTime, Utc};
use form_spec::{
    AnswerMap, DocumentShape, FormDocument, FormSpec, PageSettings, QuestionSpec, RenderPayload,
    build_render_payload, validate_spec,
};
use tracing::{debug, info, warn};

use crate::auth::verify_password;
use crate::backend::{DraftOutcome, PublishOutcome, SchemaStore, open_store};
use crate::config::EditorConfig;
use crate::{Result, StoreError};

pub const DRAFT_BRANCH_PREFIX: &str = "draft/form-editor-";

/// Branch name used for drafts created at `now`.
pub fn draft_branch_name(now: DateTime<Utc>) -> String {
    format!("{}{}", DRAFT_BRANCH_PREFIX, now.format("%Y%m%d%H%M%S"))
}

pub struct EditorSession {
    store: Box<dyn SchemaStore>,
    password_hash: Option<String>,
    unlocked: bool,
    document: FormDocument,
    /// Revision of the stored document the working copy is based on.
    revision: Option<String>,
    draft_branch: Option<String>,
}

impl EditorSession {
    /// Opens the configured store and loads the current document.
    pub fn open(config: &EditorConfig) -> Result<Self> {
        let store = open_store(config)?;
        Self::with_store(store, config.editor_password_hash.clone())
    }

    /// Starts a session over `store`. A store with nothing saved yet starts
    /// from an empty form.
    pub fn with_store(store: Box<dyn SchemaStore>, password_hash: Option<String>) -> Result<Self> {
        let (document, revision) = load_document(store.as_ref())?;
        Ok(Self {
            store,
            password_hash,
            unlocked: false,
            document,
            revision,
            draft_branch: None,
        })
    }

    /// Discards the working copy and loads the latest stored document.
    pub fn reload(&mut self) -> Result<()> {
        let (document, revision) = load_document(self.store.as_ref())?;
        self.document = document;
        self.revision = revision;
        Ok(())
    }

    pub fn unlock(&mut self, password: &str) -> Result<()> {
        let Some(hash) = self.password_hash.as_deref() else {
            return Err(StoreError::Auth(
                "editor password is not configured".to_string(),
            ));
        };
        if !verify_password(password, hash) {
            return Err(StoreError::Auth("incorrect password".to_string()));
        }
        self.unlocked = true;
        Ok(())
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn document(&self) -> &FormDocument {
        &self.document
    }

    pub fn spec(&self) -> &FormSpec {
        &self.document.spec
    }

    pub fn store(&self) -> &dyn SchemaStore {
        self.store.as_ref()
    }

    /// Draft branch reused by later `save_draft` calls, if one was created.
    pub fn draft_branch(&self) -> Option<&str> {
        self.draft_branch.as_deref()
    }

    /// Swaps in a whole document, such as a schema edited outside the session.
    pub fn replace_document(&mut self, document: FormDocument) -> Result<()> {
        self.ensure_unlocked()?;
        validate_spec(&document.spec)?;
        self.document = document;
        Ok(())
    }

    pub fn add_question(&mut self, question: QuestionSpec) -> Result<()> {
        self.edit(|spec| {
            if spec.question(&question.key).is_some() {
                return Err(StoreError::DuplicateQuestion(question.key.clone()));
            }
            debug!(question = %question.key, "adding question");
            spec.questions.push(question);
            Ok(())
        })
    }

    /// Replaces the question stored under `key`. The replacement may carry a new key.
    pub fn update_question(&mut self, key: &str, question: QuestionSpec) -> Result<()> {
        self.edit(|spec| {
            let index = spec
                .position(key)
                .ok_or_else(|| StoreError::UnknownQuestion(key.to_string()))?;
            if question.key != key && spec.question(&question.key).is_some() {
                return Err(StoreError::DuplicateQuestion(question.key.clone()));
            }
            spec.questions[index] = question;
            Ok(())
        })
    }

    /// Removes a question. Fails when a later rule still references it.
    pub fn remove_question(&mut self, key: &str) -> Result<QuestionSpec> {
        let mut removed = None;
        self.edit(|spec| {
            let index = spec
                .position(key)
                .ok_or_else(|| StoreError::UnknownQuestion(key.to_string()))?;
            removed = Some(spec.questions.remove(index));
            Ok(())
        })?;
        removed.ok_or_else(|| StoreError::UnknownQuestion(key.to_string()))
    }

    /// Replaces the page presentation settings. A bare question list becomes
    /// a form object so the settings are kept on save.
    pub fn update_page(&mut self, page: PageSettings) -> Result<()> {
        self.edit(|spec| {
            spec.page = page;
            Ok(())
        })?;
        if !self.document.spec.page.is_empty() {
            self.document.shape = DocumentShape::Form;
        }
        Ok(())
    }

    /// Moves a question to `index`, clamped to the end of the list.
    pub fn move_question(&mut self, key: &str, index: usize) -> Result<()> {
        self.edit(|spec| {
            let from = spec
                .position(key)
                .ok_or_else(|| StoreError::UnknownQuestion(key.to_string()))?;
            let question = spec.questions.remove(from);
            let to = index.min(spec.questions.len());
            spec.questions.insert(to, question);
            Ok(())
        })
    }

    pub fn publish(&mut self) -> Result<PublishOutcome> {
        self.ensure_unlocked()?;
        validate_spec(&self.document.spec)?;
        let latest = self.store.revision()?;
        if latest != self.revision {
            warn!(
                loaded = ?self.revision,
                latest = ?latest,
                "stored schema changed since it was loaded"
            );
            return Err(StoreError::Conflict);
        }
        let outcome = self.store.publish(&self.document)?;
        self.revision = match &outcome {
            PublishOutcome::Remote {
                content_sha: Some(sha),
                ..
            } => Some(sha.clone()),
            _ => self.store.revision()?,
        };
        self.draft_branch = None;
        info!(?outcome, "schema published");
        Ok(outcome)
    }

    pub fn save_draft(&mut self) -> Result<DraftOutcome> {
        self.save_draft_at(Utc::now())
    }

    fn save_draft_at(&mut self, now: DateTime<Utc>) -> Result<DraftOutcome> {
        self.ensure_unlocked()?;
        validate_spec(&self.document.spec)?;
        let branch = self
            .draft_branch
            .clone()
            .unwrap_or_else(|| draft_branch_name(now));
        let outcome = self.store.save_draft(&self.document, &branch)?;
        self.draft_branch = Some(outcome.branch.clone());
        info!(branch = %outcome.branch, pr = ?outcome.pull_request_url, "draft saved");
        Ok(outcome)
    }

    /// Render payload for previewing the working copy with `answers`.
    pub fn preview(&self, answers: &AnswerMap) -> RenderPayload {
        build_render_payload(&self.document.spec, answers)
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.unlocked {
            Ok(())
        } else {
            Err(StoreError::Locked)
        }
    }

    fn edit<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut FormSpec) -> Result<()>,
    {
        self.ensure_unlocked()?;
        let mut spec = self.document.spec.clone();
        change(&mut spec)?;
        validate_spec(&spec)?;
        self.document.spec = spec;
        Ok(())
    }
}

fn load_document(store: &dyn SchemaStore) -> Result<(FormDocument, Option<String>)> {
    match store.load()? {
        Some(stored) => Ok((stored.document, stored.revision)),
        None => {
            debug!(store = %store.describe(), "starting from an empty form");
            Ok((FormDocument::new(FormSpec::default()), None))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::TimeZone;
    use form_spec::{AnswerValue, Clause, Operator, QuestionType, RenderStatus, RuleValue};

    use super::*;
    use crate::auth::hash_password;
    use crate::backend::StoredDocument;
    use crate::submission::{SubmissionOutcome, SubmissionRecord};

    #[derive(Default)]
    struct Recorded {
        published: Vec<FormDocument>,
        drafts: Vec<(String, FormDocument)>,
        submissions: Vec<(String, SubmissionRecord)>,
        revision: Option<String>,
    }

    struct MemoryStore {
        initial: Option<FormDocument>,
        drafts_supported: bool,
        recorded: Rc<RefCell<Recorded>>,
    }

    impl SchemaStore for MemoryStore {
        fn describe(&self) -> String {
            "memory".to_string()
        }

        fn load(&self) -> Result<Option<StoredDocument>> {
            let recorded = self.recorded.borrow();
            let document = recorded
                .published
                .last()
                .cloned()
                .or_else(|| self.initial.clone());
            Ok(document.map(|document| StoredDocument {
                document,
                revision: recorded.revision.clone(),
            }))
        }

        fn revision(&self) -> Result<Option<String>> {
            Ok(self.recorded.borrow().revision.clone())
        }

        fn publish(&self, document: &FormDocument) -> Result<PublishOutcome> {
            let mut recorded = self.recorded.borrow_mut();
            recorded.published.push(document.clone());
            let revision = format!("rev-{}", recorded.published.len());
            recorded.revision = Some(revision);
            Ok(PublishOutcome::Remote {
                branch: "main".to_string(),
                commit_sha: Some("c0ffee".to_string()),
                content_sha: None,
            })
        }

        fn save_draft(&self, document: &FormDocument, branch: &str) -> Result<DraftOutcome> {
            if !self.drafts_supported {
                return Err(StoreError::DraftUnsupported);
            }
            self.recorded
                .borrow_mut()
                .drafts
                .push((branch.to_string(), document.clone()));
            Ok(DraftOutcome {
                branch: branch.to_string(),
                pull_request_url: Some("https://github.com/acme/forms/pull/7".to_string()),
                pull_request_number: Some(7),
            })
        }

        fn save_submission(
            &self,
            path: &str,
            record: &SubmissionRecord,
        ) -> Result<SubmissionOutcome> {
            self.recorded
                .borrow_mut()
                .submissions
                .push((path.to_string(), record.clone()));
            Ok(SubmissionOutcome {
                id: record.id.clone(),
                location: path.to_string(),
            })
        }
    }

    fn industry_form() -> FormDocument {
        FormDocument::new(FormSpec::from_questions(vec![
            QuestionSpec::new("q_industry", QuestionType::Single)
                .with_options(["Tech", "Retail"]),
            QuestionSpec::new("q_employee_management", QuestionType::Bool).with_rule(Clause::new(
                "q_industry",
                Operator::Equals,
                Some(RuleValue::One("Tech".to_string())),
            )),
        ]))
    }

    fn session(drafts_supported: bool) -> (EditorSession, Rc<RefCell<Recorded>>) {
        let recorded = Rc::new(RefCell::new(Recorded {
            revision: Some("rev-0".to_string()),
            ..Recorded::default()
        }));
        let store = MemoryStore {
            initial: Some(industry_form()),
            drafts_supported,
            recorded: Rc::clone(&recorded),
        };
        let session = EditorSession::with_store(Box::new(store), Some(hash_password("pw")))
            .expect("session");
        (session, recorded)
    }

    fn unlocked(drafts_supported: bool) -> (EditorSession, Rc<RefCell<Recorded>>) {
        let (mut session, recorded) = session(drafts_supported);
        session.unlock("pw").expect("unlock");
        (session, recorded)
    }

    #[test]
    fn mutations_require_unlock() {
        let (mut session, _) = session(true);
        let err = session
            .add_question(QuestionSpec::new("q_notes", QuestionType::Text))
            .expect_err("locked");
        assert!(matches!(err, StoreError::Locked));
        assert!(matches!(session.publish(), Err(StoreError::Locked)));
    }

    #[test]
    fn wrong_or_missing_password_is_rejected() {
        let (mut session, _) = session(true);
        let err = session.unlock("nope").expect_err("wrong password");
        assert!(err.to_string().contains("incorrect password"));
        assert!(!session.is_unlocked());

        let store = MemoryStore {
            initial: None,
            drafts_supported: false,
            recorded: Rc::default(),
        };
        let mut session = EditorSession::with_store(Box::new(store), None).expect("session");
        let err = session.unlock("pw").expect_err("no hash");
        assert!(err.to_string().contains("not configured"));
        assert!(session.spec().questions.is_empty());
    }

    #[test]
    fn duplicate_and_forward_references_leave_working_copy_untouched() {
        let (mut session, _) = unlocked(true);
        let before = session.document().clone();

        let err = session
            .add_question(QuestionSpec::new("q_industry", QuestionType::Text))
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::DuplicateQuestion(_)));

        let err = session.move_question("q_employee_management", 0).expect_err("forward");
        assert!(matches!(err, StoreError::Schema(_)));

        let err = session.remove_question("q_industry").expect_err("still referenced");
        assert!(matches!(err, StoreError::Schema(_)));

        assert_eq!(session.document(), &before);
    }

    #[test]
    fn add_update_move_and_remove_questions() {
        let (mut session, _) = unlocked(true);
        session
            .add_question(QuestionSpec::new("q_notes", QuestionType::Text))
            .expect("add");
        session.move_question("q_notes", 0).expect("move");
        assert_eq!(session.spec().questions[0].key, "q_notes");

        let mut renamed = QuestionSpec::new("q_comments", QuestionType::Text);
        renamed.label = "Comments".to_string();
        session.update_question("q_notes", renamed).expect("update");
        assert_eq!(session.spec().questions[0].label, "Comments");

        let removed = session.remove_question("q_comments").expect("remove");
        assert_eq!(removed.key, "q_comments");
        assert_eq!(session.spec().questions.len(), 2);

        assert!(matches!(
            session.remove_question("missing"),
            Err(StoreError::UnknownQuestion(_))
        ));
    }

    #[test]
    fn replacing_the_document_keeps_its_shape() {
        let (mut session, recorded) = unlocked(true);
        let document = FormDocument::from_json(
            r#"[{"key": "q_name", "label": "Name", "type": "text"}]"#,
        )
        .expect("document");
        session.replace_document(document.clone()).expect("replace");
        session.publish().expect("publish");
        assert_eq!(recorded.borrow().published[0], document);

        let broken = FormDocument::from_json(
            r#"[{"key": "a", "type": "text", "show_if": {"field": "b", "operator": "equals", "value": "x"}}]"#,
        )
        .expect("parses");
        assert!(session.replace_document(broken).is_err());
        assert_eq!(session.document(), &document);
    }

    #[test]
    fn drafts_reuse_their_branch_until_publish() {
        let (mut session, recorded) = unlocked(true);
        let first_time = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 5).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();

        let first = session.save_draft_at(first_time).expect("draft");
        assert_eq!(first.branch, "draft/form-editor-20240301093005");
        let second = session.save_draft_at(later).expect("draft again");
        assert_eq!(second.branch, first.branch);
        assert_eq!(recorded.borrow().drafts.len(), 2);

        session.publish().expect("publish");
        assert!(session.draft_branch().is_none());
        assert_eq!(recorded.borrow().published.len(), 1);

        let third = session.save_draft_at(later).expect("fresh draft");
        assert_eq!(third.branch, "draft/form-editor-20240302100000");
    }

    #[test]
    fn publish_refuses_when_the_store_changed_after_load() {
        let (mut session, recorded) = unlocked(true);
        session
            .add_question(QuestionSpec::new("q_notes", QuestionType::Text))
            .expect("add");
        recorded.borrow_mut().revision = Some("edited-elsewhere".to_string());

        let err = session.publish().expect_err("conflict");
        assert!(matches!(err, StoreError::Conflict));
        assert!(err.to_string().contains("changed upstream"));
        assert!(recorded.borrow().published.is_empty());
        assert_eq!(session.spec().questions.len(), 3);

        session.reload().expect("reload");
        assert_eq!(session.spec().questions.len(), 2);
        session.publish().expect("publish after reload");
        assert_eq!(recorded.borrow().published.len(), 1);
    }

    #[test]
    fn consecutive_publishes_track_the_new_revision() {
        let (mut session, recorded) = unlocked(true);
        session.publish().expect("first");
        session
            .add_question(QuestionSpec::new("q_notes", QuestionType::Text))
            .expect("add");
        session.publish().expect("second");
        assert_eq!(recorded.borrow().published.len(), 2);
        assert_eq!(recorded.borrow().revision.as_deref(), Some("rev-2"));
    }

    #[test]
    fn page_settings_survive_publishing_a_question_list() {
        let recorded = Rc::new(RefCell::new(Recorded::default()));
        let store = MemoryStore {
            initial: Some(
                FormDocument::from_json(r#"[{"key": "q_name", "type": "text"}]"#)
                    .expect("document"),
            ),
            drafts_supported: false,
            recorded: Rc::clone(&recorded),
        };
        let mut session =
            EditorSession::with_store(Box::new(store), Some(hash_password("pw"))).expect("session");
        let page = PageSettings {
            title: Some("Vendor intake".to_string()),
            ..PageSettings::default()
        };
        assert!(matches!(
            session.update_page(page.clone()),
            Err(StoreError::Locked)
        ));

        session.unlock("pw").expect("unlock");
        session.update_page(page).expect("update page");
        assert_eq!(session.spec().title(), "Vendor intake");
        assert_eq!(session.document().shape, DocumentShape::Form);

        session.publish().expect("publish");
        let written = recorded.borrow().published[0].to_value().expect("value");
        assert_eq!(written["page"]["title"], "Vendor intake");
        assert_eq!(written["questions"][0]["key"], "q_name");
    }

    #[test]
    fn submissions_go_through_the_session_store() {
        let (session, recorded) = session(true);
        let config = EditorConfig {
            form_key: "intake".to_string(),
            ..EditorConfig::default()
        };
        let answers = AnswerMap::from([("q_industry".to_string(), AnswerValue::from("Retail"))]);
        let outcome = crate::submission::submit_to(
            session.store(),
            &config,
            session.spec(),
            &answers,
            Utc::now(),
        )
        .expect("submit");

        let recorded = recorded.borrow();
        let (path, record) = &recorded.submissions[0];
        assert_eq!(path, &format!("intake/submissions/{}.json", outcome.id));
        assert_eq!(record.answers, answers);
    }

    #[test]
    fn drafts_without_github_report_unsupported() {
        let (mut session, _) = unlocked(false);
        assert!(matches!(
            session.save_draft(),
            Err(StoreError::DraftUnsupported)
        ));
        assert!(session.draft_branch().is_none());
    }

    #[test]
    fn preview_reflects_visibility() {
        let (session, _) = session(true);
        let mut answers = AnswerMap::new();
        answers.insert("q_industry".into(), AnswerValue::from("Retail"));
        answers.insert("q_employee_management".into(), AnswerValue::from(true));

        let payload = session.preview(&answers);
        assert_eq!(payload.status, RenderStatus::Complete);
        assert_eq!(payload.progress.total, 1);
        let hidden = payload
            .questions
            .iter()
            .find(|question| question.key == "q_employee_management")
            .expect("question");
        assert!(!hidden.visible);
        assert!(hidden.current_value.is_none());
    }
}
