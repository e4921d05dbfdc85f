//! Questionnaires kept on disk, one directory per form.
//!
//! The layout is `<forms_dir>/<form_key>/form_schema.json`. A lone
//! `form_schema.json` beside the forms directory is picked up as the
//! `default` form when no per-form directories exist.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use form_spec::FormDocument;
use tracing::debug;

use crate::config::{DEFAULT_FORM_KEY, EditorConfig, FORM_SCHEMA_FILENAME};
use crate::{Result, StoreError};

/// A form found on disk together with its parsed document.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalForm {
    pub key: String,
    pub path: PathBuf,
    pub document: FormDocument,
}

impl LocalForm {
    /// Form label, falling back to the page title and then the key.
    pub fn title(&self) -> &str {
        let spec = &self.document.spec;
        spec.label
            .as_deref()
            .or(spec.page.title.as_deref())
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(&self.key)
    }
}

pub fn legacy_schema_path(config: &EditorConfig) -> PathBuf {
    config.local_root().join(FORM_SCHEMA_FILENAME)
}

/// Maps each locally stored form key to its schema file, sorted by key.
pub fn discover_local_forms(config: &EditorConfig) -> Result<BTreeMap<String, PathBuf>> {
    let mut forms = BTreeMap::new();
    if config.forms_dir.is_dir() {
        let entries = fs::read_dir(&config.forms_dir)
            .map_err(|source| io_error(&config.forms_dir, source))?;
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&config.forms_dir, source))?;
            let schema_path = entry.path().join(FORM_SCHEMA_FILENAME);
            if !schema_path.is_file() {
                continue;
            }
            if let Some(key) = entry.file_name().to_str() {
                forms.insert(key.to_string(), schema_path);
            }
        }
    }
    if let Some(pinned) = &config.local_path
        && pinned.is_file()
    {
        forms
            .entry(config.form_key.clone())
            .or_insert_with(|| pinned.clone());
    }
    let legacy = legacy_schema_path(config);
    if forms.is_empty() && legacy.is_file() {
        forms.insert(DEFAULT_FORM_KEY.to_string(), legacy);
    }
    debug!(count = forms.len(), dir = %config.forms_dir.display(), "discovered local forms");
    Ok(forms)
}

/// Schema file for `form_key`. New forms get their own directory.
pub fn local_form_path(config: &EditorConfig, form_key: &str) -> PathBuf {
    if let Some(pinned) = &config.local_path {
        return pinned.clone();
    }
    let candidate = config.forms_dir.join(form_key).join(FORM_SCHEMA_FILENAME);
    if candidate.is_file() {
        return candidate;
    }
    let legacy = legacy_schema_path(config);
    if form_key == DEFAULT_FORM_KEY && legacy.is_file() {
        return legacy;
    }
    candidate
}

/// Loads every discovered form.
pub fn load_local_forms(config: &EditorConfig) -> Result<Vec<LocalForm>> {
    discover_local_forms(config)?
        .into_iter()
        .map(|(key, path)| {
            let text = fs::read_to_string(&path).map_err(|source| io_error(&path, source))?;
            let document = FormDocument::from_json(&text)?;
            Ok(LocalForm {
                key,
                path,
                document,
            })
        })
        .collect()
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}
