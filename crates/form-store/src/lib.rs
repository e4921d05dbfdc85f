use std::path::PathBuf;

use form_spec::SchemaError;
use thiserror::Error;

pub mod auth;
pub mod backend;
pub mod config;
pub mod forms;
pub mod github;
pub mod local;
pub mod session;
pub mod submission;

pub use auth::{hash_password, verify_password};
pub use backend::{DraftOutcome, PublishOutcome, SchemaStore, StoredDocument, open_store};
pub use config::{EditorConfig, GitHubSettings, load_or_default, parse_config};
pub use forms::{LocalForm, discover_local_forms, load_local_forms};
pub use github::{GitHubClient, GitHubStore};
pub use local::LocalStore;
pub use session::EditorSession;
pub use submission::{SubmissionOutcome, SubmissionRecord, submit_answers};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub API returned {status}: {message}")]
    GitHub { status: u16, message: String },
    #[error("could not decode file content: {0}")]
    Decode(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("editor is locked; unlock it with the editor password first")]
    Locked,
    #[error("drafts require GitHub configuration")]
    DraftUnsupported,
    #[error("schema changed upstream since it was loaded; reload and retry")]
    Conflict,
    #[error("question '{0}' not found")]
    UnknownQuestion(String),
    #[error("question '{0}' already exists")]
    DuplicateQuestion(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
