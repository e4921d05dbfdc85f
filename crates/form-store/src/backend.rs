use std::path::PathBuf;

use form_spec::FormDocument;
use tracing::info;

use crate::forms::local_form_path;
use crate::submission::{SubmissionOutcome, SubmissionRecord};
use crate::{EditorConfig, GitHubStore, LocalStore, Result};

/// A loaded document and the revision of the stored file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub document: FormDocument,
    /// Blob SHA on GitHub, content digest on disk.
    pub revision: Option<String>,
}

/// Where a published schema ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Local {
        path: PathBuf,
    },
    Remote {
        branch: String,
        commit_sha: Option<String>,
        content_sha: Option<String>,
    },
}

/// Result of saving a draft on a side branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOutcome {
    pub branch: String,
    pub pull_request_url: Option<String>,
    pub pull_request_number: Option<u64>,
}

/// Persistence backend for the schema document.
pub trait SchemaStore {
    /// Short human description used in logs and CLI output.
    fn describe(&self) -> String;

    /// Loads the stored document. `Ok(None)` means nothing has been saved yet.
    fn load(&self) -> Result<Option<StoredDocument>>;

    /// Current revision of the stored document, `None` when absent.
    fn revision(&self) -> Result<Option<String>>;

    /// Writes the document to its canonical location.
    fn publish(&self, document: &FormDocument) -> Result<PublishOutcome>;

    /// Writes the document to `branch` and makes sure a pull request is open.
    fn save_draft(&self, document: &FormDocument, branch: &str) -> Result<DraftOutcome>;

    /// Writes a submission record at `path`, relative to the store's root.
    fn save_submission(&self, path: &str, record: &SubmissionRecord) -> Result<SubmissionOutcome>;
}

/// Opens the GitHub store when configured, the local file otherwise.
pub fn open_store(config: &EditorConfig) -> Result<Box<dyn SchemaStore>> {
    let store: Box<dyn SchemaStore> = match &config.github {
        Some(settings) => Box::new(GitHubStore::new(settings.clone(), &config.form_key)?),
        None => Box::new(
            LocalStore::new(local_form_path(config, &config.form_key))
                .with_root(config.local_root()),
        ),
    };
    info!(store = %store.describe(), "opened schema store");
    Ok(store)
}
