//! Placeholder extraction strategies.
//!
//! Each strategy is a pure function over a document already fetched by the
//! caller. Strategies never touch the network.

use regex::Regex;
use serde::Deserialize;
use serde_json_path::JsonPath;

use crate::error::{Error, Result};

/// Strategy configuration, validated once when the batch is constructed so a
/// malformed definition fails fast instead of per repository.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StrategyConfig {
    #[serde(rename_all = "camelCase")]
    Regex {
        pattern: String,
        #[serde(default = "default_group_index")]
        group_index: usize,
    },
    #[serde(rename_all = "camelCase")]
    JsonPath { expression: String },
    #[serde(rename_all = "camelCase")]
    YamlPath { candidate_paths: Vec<String> },
}

fn default_group_index() -> usize {
    1
}

/// Outcome of applying a strategy to a document.
///
/// `Null` records a path that resolved to an explicit null; `NotFound` records
/// a pattern or path that selected nothing. Both substitute as the empty
/// string downstream, but are kept distinct for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Value(String),
    Null,
    NotFound,
}

impl StrategyConfig {
    /// Checks the configuration itself, independent of any document.
    pub fn validate(&self, field: &str) -> Result<()> {
        match self {
            StrategyConfig::Regex {
                pattern,
                group_index,
            } => {
                let compiled = Regex::new(pattern).map_err(|e| {
                    Error::validation_invalid_argument(
                        field,
                        format!("Invalid regex pattern: {}", e),
                        Some(pattern.clone()),
                        None,
                    )
                })?;
                if *group_index >= compiled.captures_len() {
                    return Err(Error::validation_invalid_argument(
                        field,
                        format!(
                            "Group index {} is out of bounds for pattern with {} group(s)",
                            group_index,
                            compiled.captures_len() - 1
                        ),
                        Some(pattern.clone()),
                        None,
                    ));
                }
                Ok(())
            }
            StrategyConfig::JsonPath { expression } => {
                JsonPath::parse(expression).map_err(|e| {
                    Error::validation_invalid_argument(
                        field,
                        format!("Invalid JSON path expression: {}", e),
                        Some(expression.clone()),
                        None,
                    )
                })?;
                Ok(())
            }
            StrategyConfig::YamlPath { candidate_paths } => {
                if candidate_paths.is_empty() {
                    return Err(Error::validation_invalid_argument(
                        field,
                        "candidatePaths must list at least one path",
                        None,
                        None,
                    ));
                }
                if let Some(empty) = candidate_paths.iter().find(|p| p.trim().is_empty()) {
                    return Err(Error::validation_invalid_argument(
                        field,
                        "candidatePaths entries cannot be empty",
                        Some(empty.clone()),
                        None,
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Applies a strategy to document text.
///
/// Errors only for unparseable documents; "nothing matched" is data, not an
/// error. `source` names the document in error details.
pub fn extract(document: &str, config: &StrategyConfig, source: &str) -> Result<Extraction> {
    match config {
        StrategyConfig::Regex {
            pattern,
            group_index,
        } => extract_regex(document, pattern, *group_index),
        StrategyConfig::JsonPath { expression } => extract_json_path(document, expression, source),
        StrategyConfig::YamlPath { candidate_paths } => {
            extract_yaml_path(document, candidate_paths, source)
        }
    }
}

fn extract_regex(document: &str, pattern: &str, group_index: usize) -> Result<Extraction> {
    let compiled = Regex::new(pattern).map_err(|e| {
        Error::validation_invalid_argument(
            "pattern",
            format!("Invalid regex pattern: {}", e),
            Some(pattern.to_string()),
            None,
        )
    })?;

    let Some(captures) = compiled.captures(document) else {
        return Ok(Extraction::NotFound);
    };

    // A group that exists in the pattern but did not participate in the match
    // is also NotFound.
    match captures.get(group_index) {
        Some(group) => Ok(Extraction::Value(group.as_str().to_string())),
        None => Ok(Extraction::NotFound),
    }
}

fn extract_json_path(document: &str, expression: &str, source: &str) -> Result<Extraction> {
    let parsed: serde_json::Value = serde_json::from_str(document)
        .map_err(|e| Error::malformed_document(source, "json", e.to_string()))?;

    let path = JsonPath::parse(expression).map_err(|e| {
        Error::validation_invalid_argument(
            "expression",
            format!("Invalid JSON path expression: {}", e),
            Some(expression.to_string()),
            None,
        )
    })?;

    let nodes = path.query(&parsed).all();
    match nodes.first() {
        None => Ok(Extraction::Null),
        Some(serde_json::Value::Null) => Ok(Extraction::Null),
        Some(serde_json::Value::String(s)) => Ok(Extraction::Value(s.clone())),
        Some(other) => Ok(Extraction::Value(other.to_string())),
    }
}

fn extract_yaml_path(document: &str, candidate_paths: &[String], source: &str) -> Result<Extraction> {
    let parsed: serde_yml::Value = serde_yml::from_str(document)
        .map_err(|e| Error::malformed_document(source, "yaml", e.to_string()))?;

    for path in candidate_paths {
        // The first path whose full segment chain resolves wins, even when it
        // resolves to an explicit null.
        if let Some(node) = descend(&parsed, path) {
            return Ok(yaml_node_to_extraction(node));
        }
    }

    Ok(Extraction::NotFound)
}

fn descend<'a>(root: &'a serde_yml::Value, path: &str) -> Option<&'a serde_yml::Value> {
    let mut current = root;
    for segment in path.split('.') {
        let next = match current.get(segment) {
            Some(v) => Some(v),
            // Dot segments double as sequence indices: "servers.0.host".
            None => segment.parse::<usize>().ok().and_then(|i| current.get(i)),
        };
        current = next?;
    }
    Some(current)
}

fn yaml_node_to_extraction(node: &serde_yml::Value) -> Extraction {
    match node {
        serde_yml::Value::Null => Extraction::Null,
        serde_yml::Value::String(s) => Extraction::Value(s.clone()),
        serde_yml::Value::Bool(b) => Extraction::Value(b.to_string()),
        serde_yml::Value::Number(n) => Extraction::Value(n.to_string()),
        other => {
            let rendered = serde_yml::to_string(other)
                .map(|s| s.trim_end().to_string())
                .unwrap_or_default();
            Extraction::Value(rendered)
        }
    }
}
