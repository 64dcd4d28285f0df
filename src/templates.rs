//! Message template provider.
//!
//! Human-facing strings (welcome messages, mention replies, error texts)
//! live as `*.md` files in a template directory, one template per file,
//! keyed by file stem. They are loaded once at startup; a missing
//! directory is a startup error, exactly like a missing credential.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::Path;

use minijinja::Environment;
use serde::Serialize;

use crate::error::TemplateError;

/// Loads and renders message templates.
pub struct TemplateManager {
    env: Environment<'static>,
    keys: BTreeSet<String>,
}

impl TemplateManager {
    /// Loads every `*.md` file under `dir` as a template.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing, a file cannot be
    /// read, or a template fails to parse.
    pub fn load(dir: &Path) -> Result<Self, TemplateError> {
        if !dir.is_dir() {
            return Err(TemplateError::DirectoryMissing {
                path: dir.to_path_buf(),
            });
        }

        let mut env = Environment::new();
        let mut keys = BTreeSet::new();

        let entries = std::fs::read_dir(dir).map_err(|e| TemplateError::ReadError {
            path: dir.to_path_buf(),
            source: e,
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| TemplateError::ReadError {
                path: dir.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();

            if path.extension().and_then(OsStr::to_str) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(OsStr::to_str) else {
                continue;
            };

            let source = std::fs::read_to_string(&path).map_err(|e| TemplateError::ReadError {
                path: path.clone(),
                source: e,
            })?;

            env.add_template_owned(stem.to_string(), source.trim().to_string())
                .map_err(|e| TemplateError::InvalidTemplate {
                    key: stem.to_string(),
                    source: e,
                })?;
            keys.insert(stem.to_string());
        }

        tracing::debug!(count = keys.len(), "message templates loaded");
        Ok(Self { env, keys })
    }

    /// Renders the template under `key` with the given substitutions.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::NotFound`] for an absent key, or a render
    /// error if substitution fails.
    pub fn get<C: Serialize>(&self, key: &str, context: C) -> Result<String, TemplateError> {
        let template = self
            .env
            .get_template(key)
            .map_err(|_| TemplateError::NotFound {
                key: key.to_string(),
            })?;

        template.render(context).map_err(|e| TemplateError::RenderError {
            key: key.to_string(),
            source: e,
        })
    }

    /// Whether a template is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// The registered template keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}
