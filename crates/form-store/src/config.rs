//! Configuration loading for the form editor.
//!
//! Reads `form-editor.toml`. GitHub settings may live in a `[github]` table or
//! in flat `github_*` keys; the table wins. A token missing from the file is
//! taken from `GITHUB_TOKEN`. Without a token and repository the editor falls
//! back to local schema files: one per form under `forms_dir`, or a single
//! file pinned with `local_path`.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::{Result, StoreError};

pub const CONFIG_FILE_NAME: &str = "form-editor.toml";
pub const FORM_SCHEMA_FILENAME: &str = "form_schema.json";
pub const DEFAULT_FORM_KEY: &str = "default";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_FORMS_DIR: &str = "form_schemas";
pub const DEFAULT_SUBMISSIONS_PATH: &str = "{form_key}/submissions/{submission_id}.json";
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    editor_password_hash: Option<String>,
    local_path: Option<PathBuf>,
    forms_dir: Option<PathBuf>,
    form_key: Option<String>,
    submissions_path: Option<String>,
    github: RawGitHub,
    github_token: Option<String>,
    github_repo: Option<String>,
    github_file_path: Option<String>,
    github_branch: Option<String>,
    github_api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawGitHub {
    token: Option<String>,
    repo: Option<String>,
    path: Option<String>,
    branch: Option<String>,
    api_url: Option<String>,
}

/// Resolved editor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    /// Hex SHA-256 digest of the editor password. `None` keeps the editor locked.
    pub editor_password_hash: Option<String>,
    /// Pins every form to this one schema file when GitHub is not configured.
    pub local_path: Option<PathBuf>,
    /// Directory holding `<form_key>/form_schema.json` for each local form.
    pub forms_dir: PathBuf,
    /// Selected form; substituted into templated remote paths.
    pub form_key: String,
    /// Submission location template with `{submission_id}` and optionally
    /// `{form_key}`. Relative to the repository root, or to [`Self::local_root`].
    pub submissions_path: String,
    pub github: Option<GitHubSettings>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            editor_password_hash: None,
            local_path: None,
            forms_dir: PathBuf::from(DEFAULT_FORMS_DIR),
            form_key: DEFAULT_FORM_KEY.to_string(),
            submissions_path: DEFAULT_SUBMISSIONS_PATH.to_string(),
            github: None,
        }
    }
}

impl EditorConfig {
    /// Directory containing `forms_dir`; the legacy schema file and local
    /// submissions live here.
    pub fn local_root(&self) -> PathBuf {
        match self.forms_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Repository coordinates for GitHub-backed persistence.
#[derive(Clone, PartialEq)]
pub struct GitHubSettings {
    pub token: String,
    /// `owner/name`.
    pub repo: String,
    /// File path, possibly templated with `{form_key}`.
    pub path: String,
    /// Base branch that publishing writes to and drafts branch from.
    pub branch: String,
    pub api_url: String,
}

impl std::fmt::Debug for GitHubSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSettings")
            .field("token", &"<redacted>")
            .field("repo", &self.repo)
            .field("path", &self.path)
            .field("branch", &self.branch)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl GitHubSettings {
    pub fn owner(&self) -> &str {
        self.repo.split('/').next().unwrap_or(&self.repo)
    }

    pub fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    pub fn resolved_path(&self, form_key: &str) -> String {
        resolve_remote_path(&self.path, form_key)
    }
}

/// Expands a remote path template for `form_key`.
///
/// `{form_key}`, `{questionnaire}` and `{form}` are substituted. A path that
/// is not a `.json` file is treated as a directory holding one folder per form.
pub fn resolve_remote_path(base_path: &str, form_key: &str) -> String {
    for placeholder in ["{form_key}", "{questionnaire}", "{form}"] {
        if base_path.contains(placeholder) {
            return base_path.replace(placeholder, form_key);
        }
    }
    if base_path.ends_with(".json") {
        return base_path.to_string();
    }
    format!(
        "{}/{}/{}",
        base_path.trim_end_matches('/'),
        form_key,
        FORM_SCHEMA_FILENAME
    )
}

const REPO_PATTERN: &str = r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$";

fn is_valid_repo(repo: &str) -> Result<bool> {
    let pattern = Regex::new(REPO_PATTERN)
        .map_err(|err| StoreError::Config(format!("invalid repository pattern: {}", err)))?;
    Ok(pattern.is_match(repo))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn resolve(raw: RawConfig, env_token: Option<String>) -> Result<EditorConfig> {
    let token = non_empty(raw.github.token)
        .or(non_empty(raw.github_token))
        .or(non_empty(env_token));
    let repo = non_empty(raw.github.repo).or(non_empty(raw.github_repo));
    let path = non_empty(raw.github.path)
        .or(non_empty(raw.github_file_path))
        .unwrap_or_else(|| FORM_SCHEMA_FILENAME.to_string());
    let branch = non_empty(raw.github.branch)
        .or(non_empty(raw.github_branch))
        .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
    let api_url = non_empty(raw.github.api_url)
        .or(non_empty(raw.github_api_url))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let github = match (token, repo) {
        (Some(token), Some(repo)) => {
            if !is_valid_repo(&repo)? {
                return Err(StoreError::Config(format!(
                    "github repo '{}' must look like owner/name",
                    repo
                )));
            }
            Some(GitHubSettings {
                token,
                repo,
                path,
                branch,
                api_url,
            })
        }
        (None, Some(repo)) => {
            debug!(%repo, "github repo configured without a token; using local storage");
            None
        }
        _ => None,
    };

    let submissions_path =
        non_empty(raw.submissions_path).unwrap_or_else(|| DEFAULT_SUBMISSIONS_PATH.to_string());
    if !submissions_path.contains("{submission_id}") {
        return Err(StoreError::Config(format!(
            "submissions_path '{}' must contain {{submission_id}}",
            submissions_path
        )));
    }

    let defaults = EditorConfig::default();
    Ok(EditorConfig {
        editor_password_hash: non_empty(raw.editor_password_hash),
        local_path: raw.local_path,
        forms_dir: raw.forms_dir.unwrap_or(defaults.forms_dir),
        form_key: non_empty(raw.form_key).unwrap_or(defaults.form_key),
        submissions_path,
        github,
    })
}

/// Parse a config file from a string.
pub fn parse_config(contents: &str) -> Result<EditorConfig> {
    let raw: RawConfig = toml::from_str(contents)
        .map_err(|err| StoreError::Config(format!("invalid TOML: {}", err)))?;
    resolve(raw, std::env::var(TOKEN_ENV_VAR).ok())
}

/// Load and parse a config file.
pub fn load_config(path: &Path) -> Result<EditorConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}

/// Look for `form-editor.toml` in `dir`.
pub fn discover_config(dir: &Path) -> Option<PathBuf> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path.display());
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path.display());
        None
    }
}

/// Load config from `dir`, or the defaults (plus `GITHUB_TOKEN`) when absent.
pub fn load_or_default(dir: &Path) -> Result<EditorConfig> {
    match discover_config(dir) {
        Some(path) => load_config(&path),
        None => parse_config(""),
    }
}
