use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use form_spec::{FormDocument, validate_spec};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::backend::{DraftOutcome, PublishOutcome, SchemaStore, StoredDocument};
use crate::submission::{SubmissionOutcome, SubmissionRecord};
use crate::{Result, StoreError};

/// Schema stored in a single JSON file on disk.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
    /// Base directory for submission records.
    root: PathBuf,
}

impl LocalStore {
    /// Submissions default to the schema file's directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let root = parent_dir(&path);
        Self { path, root }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&self.path, err)),
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn content_revision(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Writes beside the target and renames, so readers never see a partial file.
fn write_staged(path: &Path, text: &str) -> Result<()> {
    let parent = parent_dir(path);
    fs::create_dir_all(&parent).map_err(|err| io_error(path, err))?;
    let mut staged = NamedTempFile::new_in(&parent).map_err(|err| io_error(path, err))?;
    staged
        .write_all(text.as_bytes())
        .map_err(|err| io_error(path, err))?;
    staged
        .persist(path)
        .map_err(|err| io_error(path, err.error))?;
    Ok(())
}

impl SchemaStore for LocalStore {
    fn describe(&self) -> String {
        format!("local file {}", self.path.display())
    }

    fn load(&self) -> Result<Option<StoredDocument>> {
        let Some(text) = self.read()? else {
            debug!(path = %self.path.display(), "schema file does not exist yet");
            return Ok(None);
        };
        let document = FormDocument::from_json(&text)?;
        validate_spec(&document.spec)?;
        Ok(Some(StoredDocument {
            document,
            revision: Some(content_revision(&text)),
        }))
    }

    fn revision(&self) -> Result<Option<String>> {
        Ok(self.read()?.map(|text| content_revision(&text)))
    }

    fn publish(&self, document: &FormDocument) -> Result<PublishOutcome> {
        validate_spec(&document.spec)?;
        write_staged(&self.path, &document.to_json_pretty()?)?;
        info!(
            path = %self.path.display(),
            questions = document.spec.questions.len(),
            "published schema"
        );
        Ok(PublishOutcome::Local {
            path: self.path.clone(),
        })
    }

    fn save_draft(&self, _document: &FormDocument, _branch: &str) -> Result<DraftOutcome> {
        Err(StoreError::DraftUnsupported)
    }

    fn save_submission(&self, path: &str, record: &SubmissionRecord) -> Result<SubmissionOutcome> {
        let target = self.root.join(path);
        let mut text = serde_json::to_string_pretty(record)?;
        text.push('\n');
        write_staged(&target, &text)?;
        Ok(SubmissionOutcome {
            id: record.id.clone(),
            location: target.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use form_spec::{Clause, FormSpec, Operator, QuestionSpec, QuestionType};
    use tempfile::TempDir;

    fn sample_document() -> FormDocument {
        FormDocument::new(FormSpec::from_questions(vec![
            QuestionSpec::new("uses_ai", QuestionType::Bool),
            QuestionSpec::new("ai_kind", QuestionType::Multiselect)
                .with_options(["Chatbot", "Scoring"])
                .with_rule(Clause::new("uses_ai", Operator::IsTrue, None)),
        ]))
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStore::new(dir.path().join("form_schema.json"));
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn publish_then_load_returns_the_same_document() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStore::new(dir.path().join("nested").join("form_schema.json"));
        let document = sample_document();

        let outcome = store.publish(&document).expect("publish");
        assert_eq!(
            outcome,
            PublishOutcome::Local {
                path: store.path().to_path_buf()
            }
        );
        let text = fs::read_to_string(store.path()).expect("read");
        assert!(text.ends_with('\n'));
        let stored = store.load().expect("load").expect("stored");
        assert_eq!(stored.document, document);
        assert_eq!(stored.revision, Some(content_revision(&text)));
    }

    #[test]
    fn revision_tracks_file_content() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStore::new(dir.path().join("form_schema.json"));
        assert_eq!(store.revision().expect("revision"), None);

        store.publish(&sample_document()).expect("publish");
        let first = store.revision().expect("revision").expect("present");
        fs::write(store.path(), "[]\n").expect("external edit");
        let second = store.revision().expect("revision").expect("present");
        assert_ne!(first, second);
    }

    #[test]
    fn invalid_documents_are_not_written() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStore::new(dir.path().join("form_schema.json"));
        let document = FormDocument::new(FormSpec::from_questions(vec![
            QuestionSpec::new("a", QuestionType::Text),
            QuestionSpec::new("a", QuestionType::Text),
        ]));

        let err = store.publish(&document).expect_err("duplicate keys");
        assert!(matches!(err, StoreError::Schema(_)));
        assert!(!store.path().exists());
    }

    #[test]
    fn drafts_are_not_supported_locally() {
        let store = LocalStore::new("form_schema.json");
        let err = store
            .save_draft(&sample_document(), "draft/x")
            .expect_err("unsupported");
        assert!(matches!(err, StoreError::DraftUnsupported));
    }
}
