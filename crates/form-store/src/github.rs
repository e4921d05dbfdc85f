//! GitHub Contents API client and the store built on it.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use form_spec::{FormDocument, validate_spec};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::backend::{DraftOutcome, PublishOutcome, SchemaStore, StoredDocument};
use crate::config::GitHubSettings;
use crate::submission::{SubmissionOutcome, SubmissionRecord};
use crate::{Result, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CLIENT_USER_AGENT: &str = concat!("form-editor/", env!("CARGO_PKG_VERSION"));

pub const PUBLISH_COMMIT_MESSAGE: &str = "chore: publish questionnaire schema";
pub const DRAFT_PR_TITLE: &str = "Draft: Update questionnaire schema";
pub const DRAFT_PR_BODY: &str = "Automated draft update from the questionnaire editor.";

pub fn draft_commit_message(branch: &str) -> String {
    format!("chore: save questionnaire draft ({})", branch)
}

pub fn submission_commit_message(submission_id: &str) -> String {
    format!("Add questionnaire submission {}", submission_id)
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default = "default_encoding")]
    encoding: String,
}

fn default_encoding() -> String {
    "base64".to_string()
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: Option<ShaRef>,
    commit: Option<ShaRef>,
}

#[derive(Debug, Deserialize)]
struct ShaRef {
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: ShaRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: Option<String>,
}

/// Decoded file text and the blob SHA it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub text: String,
    pub sha: Option<String>,
}

/// Written file details returned by [`GitHubClient::put_file`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileCommit {
    pub content_sha: Option<String>,
    pub commit_sha: Option<String>,
}

/// Thin blocking wrapper over the endpoints the editor needs.
pub struct GitHubClient {
    client: Client,
    settings: GitHubSettings,
}

impl GitHubClient {
    pub fn new(settings: GitHubSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(build_headers(&settings.token)?)
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &GitHubSettings {
        &self.settings
    }

    /// SHA of the file at `path` on `branch`, or `None` when it does not exist.
    pub fn file_sha(&self, path: &str, branch: &str) -> Result<Option<String>> {
        Ok(self.fetch_contents(path, branch)?.and_then(|file| file.sha))
    }

    /// File at `path` on `branch`, or `None` when it does not exist.
    pub fn read_file(&self, path: &str, branch: &str) -> Result<Option<RemoteFile>> {
        let Some(file) = self.fetch_contents(path, branch)? else {
            return Ok(None);
        };
        if file.encoding != "base64" {
            return Err(StoreError::Decode(format!(
                "unsupported encoding '{}'",
                file.encoding
            )));
        }
        Ok(Some(RemoteFile {
            text: decode_content(&file.content)?,
            sha: file.sha,
        }))
    }

    pub fn put_file(
        &self,
        path: &str,
        text: &str,
        sha: Option<&str>,
        message: &str,
        branch: &str,
    ) -> Result<FileCommit> {
        let body = put_file_body(text, sha, message, branch);
        let response = self.client.put(contents_url(&self.settings, path)).json(&body).send()?;
        let written: PutResponse = check(response)?.json()?;
        debug!(%path, %branch, "wrote file through contents API");
        Ok(FileCommit {
            content_sha: written.content.and_then(|content| content.sha),
            commit_sha: written.commit.and_then(|commit| commit.sha),
        })
    }

    /// Creates `branch` from the head of the base branch unless it already exists.
    pub fn create_branch(&self, branch: &str) -> Result<()> {
        let ref_url = ref_url(&self.settings, branch);
        let existing = self.client.get(&ref_url).send()?;
        if existing.status().is_success() {
            debug!(%branch, "branch already exists");
            return Ok(());
        }
        if existing.status() != StatusCode::NOT_FOUND {
            check(existing)?;
        }

        let base = self.client.get(ref_url_for_base(&self.settings)).send()?;
        let base: GitRef = check(base)?.json()?;
        let base_sha = base.object.sha.ok_or_else(|| StoreError::GitHub {
            status: 0,
            message: "unable to determine base branch SHA".to_string(),
        })?;

        let created = self
            .client
            .post(format!(
                "{}/repos/{}/git/refs",
                self.settings.api_base(),
                self.settings.repo
            ))
            .json(&json!({ "ref": format!("refs/heads/{}", branch), "sha": base_sha }))
            .send()?;
        if created.status() == StatusCode::UNPROCESSABLE_ENTITY {
            // Someone else created it in the meantime.
            check(self.client.get(&ref_url).send()?)?;
            return Ok(());
        }
        check(created)?;
        info!(%branch, base = %self.settings.branch, "created draft branch");
        Ok(())
    }

    /// Returns the open pull request for `head_branch`, opening one if needed.
    pub fn ensure_pull_request(
        &self,
        head_branch: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest> {
        let pulls_url = format!(
            "{}/repos/{}/pulls",
            self.settings.api_base(),
            self.settings.repo
        );
        let head = format!("{}:{}", self.settings.owner(), head_branch);
        let response = self
            .client
            .get(&pulls_url)
            .query(&[("head", head.as_str()), ("state", "open")])
            .send()?;
        let open: Vec<PullRequest> = check(response)?.json()?;
        if let Some(existing) = open.into_iter().next() {
            debug!(number = existing.number, "reusing open pull request");
            return Ok(existing);
        }

        let response = self
            .client
            .post(&pulls_url)
            .json(&json!({
                "title": title,
                "head": head_branch,
                "base": self.settings.branch,
                "body": body,
            }))
            .send()?;
        let created: PullRequest = check(response)?.json()?;
        info!(number = created.number, "opened pull request");
        Ok(created)
    }

    fn fetch_contents(&self, path: &str, branch: &str) -> Result<Option<ContentsResponse>> {
        let response = self
            .client
            .get(contents_url(&self.settings, path))
            .query(&[("ref", branch)])
            .send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(response)?.json()?))
    }
}

fn build_headers(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|err| StoreError::Config(format!("invalid GitHub token: {}", err)))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    Ok(headers)
}

/// Turns a non-success response into [`StoreError::GitHub`].
fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().unwrap_or_default();
    Err(StoreError::GitHub {
        status: status.as_u16(),
        message: error_message(&text),
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn contents_url(settings: &GitHubSettings, path: &str) -> String {
    format!(
        "{}/repos/{}/contents/{}",
        settings.api_base(),
        settings.repo,
        path.trim_start_matches('/')
    )
}

fn ref_url(settings: &GitHubSettings, branch: &str) -> String {
    format!(
        "{}/repos/{}/git/ref/heads/{}",
        settings.api_base(),
        settings.repo,
        branch
    )
}

fn ref_url_for_base(settings: &GitHubSettings) -> String {
    ref_url(settings, &settings.branch)
}

fn put_file_body(text: &str, sha: Option<&str>, message: &str, branch: &str) -> Value {
    let mut body = json!({
        "message": message,
        "branch": branch,
        "content": STANDARD.encode(text.as_bytes()),
    });
    if let Some(sha) = sha {
        body["sha"] = Value::String(sha.to_string());
    }
    body
}

/// The contents API wraps base64 at 60 columns.
fn decode_content(content: &str) -> Result<String> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|err| StoreError::Decode(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| StoreError::Decode(err.to_string()))
}

/// Schema stored as a file in a GitHub repository.
pub struct GitHubStore {
    client: GitHubClient,
    path: String,
}

impl GitHubStore {
    pub fn new(settings: GitHubSettings, form_key: &str) -> Result<Self> {
        let path = settings.resolved_path(form_key);
        Ok(Self {
            client: GitHubClient::new(settings)?,
            path,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn write(
        &self,
        document: &FormDocument,
        branch: &str,
        message: &str,
    ) -> Result<FileCommit> {
        validate_spec(&document.spec)?;
        let text = document.to_json_pretty()?;
        let sha = self.client.file_sha(&self.path, branch)?;
        self.client
            .put_file(&self.path, &text, sha.as_deref(), message, branch)
    }
}

impl SchemaStore for GitHubStore {
    fn describe(&self) -> String {
        let settings = self.client.settings();
        format!("github {}@{}:{}", settings.repo, settings.branch, self.path)
    }

    fn load(&self) -> Result<Option<StoredDocument>> {
        let branch = self.client.settings().branch.clone();
        let Some(file) = self.client.read_file(&self.path, &branch)? else {
            debug!(path = %self.path, "schema file not found in repository");
            return Ok(None);
        };
        let document = FormDocument::from_json(&file.text)?;
        validate_spec(&document.spec)?;
        Ok(Some(StoredDocument {
            document,
            revision: file.sha,
        }))
    }

    fn revision(&self) -> Result<Option<String>> {
        self.client
            .file_sha(&self.path, &self.client.settings().branch)
    }

    fn publish(&self, document: &FormDocument) -> Result<PublishOutcome> {
        let branch = self.client.settings().branch.clone();
        let commit = self.write(document, &branch, PUBLISH_COMMIT_MESSAGE)?;
        info!(path = %self.path, %branch, "published schema to GitHub");
        Ok(PublishOutcome::Remote {
            branch,
            commit_sha: commit.commit_sha,
            content_sha: commit.content_sha,
        })
    }

    fn save_draft(&self, document: &FormDocument, branch: &str) -> Result<DraftOutcome> {
        validate_spec(&document.spec)?;
        self.client.create_branch(branch)?;
        self.write(document, branch, &draft_commit_message(branch))?;
        let pull = self
            .client
            .ensure_pull_request(branch, DRAFT_PR_TITLE, DRAFT_PR_BODY)?;
        Ok(DraftOutcome {
            branch: branch.to_string(),
            pull_request_url: pull.html_url,
            pull_request_number: Some(pull.number),
        })
    }

    fn save_submission(&self, path: &str, record: &SubmissionRecord) -> Result<SubmissionOutcome> {
        let settings = self.client.settings();
        let mut text = serde_json::to_string_pretty(record)?;
        text.push('\n');
        self.client.put_file(
            path,
            &text,
            None,
            &submission_commit_message(&record.id),
            &settings.branch,
        )?;
        Ok(SubmissionOutcome {
            id: record.id.clone(),
            location: format!("{}@{}:{}", settings.repo, settings.branch, path),
        })
    }
}
