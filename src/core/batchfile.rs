//! Batch document loading.
//!
//! A batch is one JSON document naming the repository selection, the
//! placeholder definitions, and the action template. Specs are accepted
//! inline, as `@path`, or as `-` for stdin.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::action::ActionSpec;
use crate::error::{Error, Result};
use crate::gateway::Repository;
use crate::placeholder::{self, PlaceholderDefinition};

/// Repository entry: either `"owner/name"` shorthand or a full object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RepositoryRef {
    Name(String),
    Detailed(Repository),
}

impl RepositoryRef {
    fn into_repository(self) -> Repository {
        match self {
            RepositoryRef::Name(full_name) => Repository::new(full_name),
            RepositoryRef::Detailed(repo) => repo,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBatchFile {
    repositories: Vec<RepositoryRef>,
    #[serde(default)]
    placeholders: Vec<PlaceholderDefinition>,
    action: ActionSpec,
}

/// A parsed and validated batch document.
#[derive(Debug)]
pub struct BatchFile {
    pub repositories: Vec<Repository>,
    pub placeholders: Vec<PlaceholderDefinition>,
    pub action: ActionSpec,
}

/// Reads a spec from a string, a file (`@path`), or stdin (`-`).
pub fn read_spec_to_string(spec: &str) -> Result<String> {
    use std::io::IsTerminal;

    if spec.trim() == "-" {
        let mut buf = String::new();
        let mut stdin = std::io::stdin();
        if stdin.is_terminal() {
            return Err(Error::validation_invalid_argument(
                "batch",
                "Cannot read batch spec from stdin when stdin is a TTY",
                None,
                None,
            ));
        }
        stdin
            .read_to_string(&mut buf)
            .map_err(|e| Error::internal_io(e.to_string(), Some("read stdin".to_string())))?;
        return Ok(buf);
    }

    if let Some(path) = spec.strip_prefix('@') {
        if path.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                "batch",
                "Invalid batch spec '@' (missing file path)",
                None,
                None,
            ));
        }
        return std::fs::read_to_string(Path::new(path))
            .map_err(|e| Error::internal_io(e.to_string(), Some(format!("read {}", path))));
    }

    Ok(spec.to_string())
}

/// Parses and validates raw JSON into a usable batch.
pub fn parse(raw: &str) -> Result<BatchFile> {
    let parsed: RawBatchFile = serde_json::from_str(raw).map_err(|e| {
        Error::config_invalid_json(e, Some("parse batch spec".to_string()))
            .with_hint("A batch spec needs 'repositories' and 'action' keys")
    })?;

    let batch = BatchFile {
        repositories: parsed
            .repositories
            .into_iter()
            .map(RepositoryRef::into_repository)
            .collect(),
        placeholders: parsed.placeholders,
        action: parsed.action,
    };

    batch.validate()?;
    Ok(batch)
}

/// Loads a batch from a spec argument (`@file`, `-`, or inline JSON).
pub fn load(spec: &str) -> Result<BatchFile> {
    let raw = read_spec_to_string(spec)?;
    parse(&raw)
}

impl BatchFile {
    pub fn validate(&self) -> Result<()> {
        if self.repositories.is_empty() {
            return Err(Error::validation_missing_argument(vec![
                "repositories".to_string(),
            ]));
        }
        for (index, repo) in self.repositories.iter().enumerate() {
            if !repo.full_name.contains('/') {
                return Err(Error::validation_invalid_argument(
                    format!("repositories[{}]", index),
                    "Repository names must be in 'owner/name' form",
                    Some(repo.full_name.clone()),
                    None,
                ));
            }
        }
        placeholder::validate_definitions(&self.placeholders)?;
        self.action.validate()
    }
}
