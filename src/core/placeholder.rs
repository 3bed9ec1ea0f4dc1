//! Placeholder definitions and per-repository resolution.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::extract::{self, Extraction, StrategyConfig};
use crate::gateway::{ContentGateway, Repository};

/// Built-in placeholder names, always present in a resolved set.
pub struct BuiltinVars;

impl BuiltinVars {
    pub const REPO_NAME: &'static str = "repo_name";
    pub const REPO_FULL_NAME: &'static str = "repo_full_name";
    pub const REPO_DEFAULT_BRANCH: &'static str = "repo_default_branch";
    pub const TIMESTAMP: &'static str = "timestamp";
    /// Injected during action rendering, after the file path renders.
    pub const FILE_PATH: &'static str = "file_path";
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("name regex"))
}

/// One user-defined placeholder: where to read, and how to extract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderDefinition {
    pub name: String,
    pub source_file_path: String,
    #[serde(default)]
    pub branch_hint: Option<String>,
    pub strategy: StrategyConfig,
}

/// Validates a whole definition list: name syntax, uniqueness (built-ins
/// included), non-empty source paths, and each strategy's own config.
pub fn validate_definitions(definitions: &[PlaceholderDefinition]) -> Result<()> {
    let reserved = [
        BuiltinVars::REPO_NAME,
        BuiltinVars::REPO_FULL_NAME,
        BuiltinVars::REPO_DEFAULT_BRANCH,
        BuiltinVars::TIMESTAMP,
        BuiltinVars::FILE_PATH,
    ];

    let mut seen: Vec<&str> = Vec::with_capacity(definitions.len());
    for (index, definition) in definitions.iter().enumerate() {
        let field = format!("placeholders[{}]", index);

        if !name_re().is_match(&definition.name) {
            return Err(Error::validation_invalid_argument(
                field,
                "Placeholder names may only contain letters, digits, and underscores",
                Some(definition.name.clone()),
                None,
            ));
        }
        if reserved.contains(&definition.name.as_str()) {
            return Err(Error::validation_invalid_argument(
                field,
                format!("'{}' is a built-in placeholder name", definition.name),
                Some(definition.name.clone()),
                None,
            ));
        }
        if seen.contains(&definition.name.as_str()) {
            return Err(Error::validation_invalid_argument(
                field,
                format!("Duplicate placeholder name '{}'", definition.name),
                Some(definition.name.clone()),
                None,
            ));
        }
        seen.push(&definition.name);

        if definition.source_file_path.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                field,
                "sourceFilePath cannot be empty",
                None,
                None,
            ));
        }

        definition.strategy.validate(&field)?;
    }

    Ok(())
}

/// Name→value snapshot for one repository. `None` records a value that
/// resolved to null or matched nothing; it renders as the empty string.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPlaceholders {
    values: HashMap<String, Option<String>>,
}

impl ResolvedPlaceholders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the built-in placeholders for a repository.
    pub fn builtins(repo: &Repository, default_branch: &str, timestamp: &str) -> Self {
        let mut resolved = Self::new();
        resolved.insert(BuiltinVars::REPO_NAME, Some(repo.name().to_string()));
        resolved.insert(BuiltinVars::REPO_FULL_NAME, Some(repo.full_name.clone()));
        resolved.insert(
            BuiltinVars::REPO_DEFAULT_BRANCH,
            Some(default_branch.to_string()),
        );
        resolved.insert(BuiltinVars::TIMESTAMP, Some(timestamp.to_string()));
        resolved
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Option<String>> {
        self.values.get(name)
    }

    pub fn values(&self) -> &HashMap<String, Option<String>> {
        &self.values
    }

    pub fn render(&self, template: &str) -> String {
        crate::utils::template::render(template, &self.values)
    }
}

/// Resolves all definitions for one repository, in declaration order.
///
/// A fetch failure is fatal for the repository: the whole action is skipped,
/// not just the one placeholder. A strategy that matches nothing is not — the
/// name resolves to `None` and substitutes as the empty string.
pub fn resolve(
    gateway: &dyn ContentGateway,
    repo: &Repository,
    default_branch: &str,
    timestamp: &str,
    definitions: &[PlaceholderDefinition],
) -> Result<ResolvedPlaceholders> {
    let mut resolved = ResolvedPlaceholders::builtins(repo, default_branch, timestamp);

    for definition in definitions {
        let branch = definition.branch_hint.as_deref().unwrap_or(default_branch);

        let file = gateway
            .fetch(&repo.full_name, &definition.source_file_path, branch)
            .map_err(|e| {
                Error::placeholder_unresolved(
                    &definition.name,
                    &definition.source_file_path,
                    e.to_string(),
                )
            })?;

        let extraction = extract::extract(
            &file.content,
            &definition.strategy,
            &definition.source_file_path,
        )
        .map_err(|e| {
            Error::placeholder_unresolved(
                &definition.name,
                &definition.source_file_path,
                e.to_string(),
            )
        })?;

        match extraction {
            Extraction::Value(value) => resolved.insert(definition.name.as_str(), Some(value)),
            Extraction::Null | Extraction::NotFound => {
                resolved.insert(definition.name.as_str(), None)
            }
        }
    }

    Ok(resolved)
}
