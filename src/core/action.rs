//! Action templates and their per-repository rendered form.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::placeholder::{BuiltinVars, ResolvedPlaceholders};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Remove,
    Update,
    Add,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Remove => "remove",
            ActionKind::Update => "update",
            ActionKind::Add => "add",
        }
    }
}

/// Search-and-replace content mutation for `update` actions: the file's
/// current content is fetched, rewritten, and written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReplace {
    pub search: String,
    pub replace_with: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(default = "default_true")]
    pub replace_all: bool,
}

fn default_true() -> bool {
    true
}

/// One file mutation, shared as a template across every repository in a batch
/// and rendered fresh per repository.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    pub kind: ActionKind,
    pub file_path: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub search_replace: Option<SearchReplace>,
    #[serde(default = "default_branch_name")]
    pub branch_name: String,
    #[serde(default)]
    pub base_branch: Option<String>,
    pub commit_message: String,
    pub pr_title: String,
    #[serde(default)]
    pub pr_body: String,
}

fn default_branch_name() -> String {
    "reposweep-{{timestamp}}".to_string()
}

impl ActionSpec {
    pub fn validate(&self) -> Result<()> {
        if self.file_path.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                "action.filePath",
                "filePath cannot be empty",
                None,
                None,
            ));
        }
        if self.branch_name.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                "action.branchName",
                "branchName cannot be empty",
                None,
                None,
            ));
        }
        if self.commit_message.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                "action.commitMessage",
                "commitMessage cannot be empty",
                None,
                None,
            ));
        }
        if self.pr_title.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                "action.prTitle",
                "prTitle cannot be empty",
                None,
                None,
            ));
        }

        match self.kind {
            ActionKind::Remove => {
                if self.content.is_some() || self.search_replace.is_some() {
                    return Err(Error::validation_invalid_argument(
                        "action.content",
                        "A remove action takes no content",
                        None,
                        None,
                    ));
                }
            }
            ActionKind::Update => match (&self.content, &self.search_replace) {
                (Some(_), Some(_)) => {
                    return Err(Error::validation_invalid_argument(
                        "action.content",
                        "An update action takes either content or searchReplace, not both",
                        None,
                        None,
                    ));
                }
                (None, None) => {
                    return Err(Error::validation_missing_argument(vec![
                        "action.content or action.searchReplace".to_string(),
                    ]));
                }
                (None, Some(sr)) if sr.regex => {
                    // Patterns containing placeholder tokens can only be
                    // checked after rendering, per repository.
                    if !contains_any_token(&sr.search) {
                        Regex::new(&sr.search).map_err(|e| {
                            Error::validation_invalid_argument(
                                "action.searchReplace.search",
                                format!("Invalid regex pattern: {}", e),
                                Some(sr.search.clone()),
                                None,
                            )
                        })?;
                    }
                }
                _ => {}
            },
            ActionKind::Add => {
                if self.content.is_none() {
                    return Err(Error::validation_missing_argument(vec![
                        "action.content".to_string(),
                    ]));
                }
                if self.search_replace.is_some() {
                    return Err(Error::validation_invalid_argument(
                        "action.searchReplace",
                        "An add action takes content, not searchReplace",
                        None,
                        None,
                    ));
                }
            }
        }

        Ok(())
    }

    /// Renders every templated field against one repository's snapshot.
    ///
    /// Two-phase: the file path renders first and becomes the built-in
    /// `file_path` placeholder, so branch names and commit/PR messages can
    /// reference the concrete path being changed.
    pub fn render(&self, placeholders: &ResolvedPlaceholders) -> RenderedAction {
        let file_path = placeholders.render(&self.file_path);

        let mut with_path = placeholders.clone();
        with_path.insert(BuiltinVars::FILE_PATH, Some(file_path.clone()));

        RenderedAction {
            kind: self.kind,
            file_path,
            content: self.content.as_deref().map(|c| with_path.render(c)),
            search_replace: self.search_replace.as_ref().map(|sr| SearchReplace {
                search: with_path.render(&sr.search),
                replace_with: with_path.render(&sr.replace_with),
                regex: sr.regex,
                replace_all: sr.replace_all,
            }),
            branch_name: with_path.render(&self.branch_name),
            base_branch: self
                .base_branch
                .as_deref()
                .map(|b| with_path.render(b))
                .filter(|b| !b.trim().is_empty()),
            commit_message: with_path.render(&self.commit_message),
            pr_title: with_path.render(&self.pr_title),
            pr_body: with_path.render(&self.pr_body),
        }
    }
}

/// An ActionSpec instantiated for one repository. Never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedAction {
    pub kind: ActionKind,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_replace: Option<SearchReplace>,
    pub branch_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    pub commit_message: String,
    pub pr_title: String,
    pub pr_body: String,
}

fn contains_any_token(template: &str) -> bool {
    template.contains("{{")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Repository;

    fn spec(kind: ActionKind) -> ActionSpec {
        ActionSpec {
            kind,
            file_path: "cfg/{{env}}.yaml".to_string(),
            content: match kind {
                ActionKind::Remove => None,
                _ => Some("port: {{port}}".to_string()),
            },
            search_replace: None,
            branch_name: "sweep/{{env}}".to_string(),
            base_branch: None,
            commit_message: "Update {{file_path}}".to_string(),
            pr_title: "Update {{env}} config".to_string(),
            pr_body: "Automated change to {{file_path}}".to_string(),
        }
    }

    fn placeholders() -> ResolvedPlaceholders {
        let repo = Repository::new("o/r");
        let mut resolved = ResolvedPlaceholders::builtins(&repo, "main", "ts");
        resolved.insert("env", Some("prod".to_string()));
        resolved.insert("port", Some("8080".to_string()));
        resolved
    }

    #[test]
    fn renders_all_fields_from_one_snapshot() {
        let rendered = spec(ActionKind::Update).render(&placeholders());

        assert_eq!(rendered.file_path, "cfg/prod.yaml");
        assert_eq!(rendered.content.as_deref(), Some("port: 8080"));
        assert_eq!(rendered.branch_name, "sweep/prod");
        assert_eq!(rendered.pr_title, "Update prod config");
    }

    #[test]
    fn file_path_token_resolves_to_rendered_path() {
        let rendered = spec(ActionKind::Update).render(&placeholders());

        assert_eq!(rendered.commit_message, "Update cfg/prod.yaml");
        assert_eq!(rendered.pr_body, "Automated change to cfg/prod.yaml");
    }

    #[test]
    fn rendered_base_branch_empty_becomes_none() {
        let mut action = spec(ActionKind::Update);
        action.base_branch = Some("{{unset}}".to_string());
        let mut vars = placeholders();
        vars.insert("unset", None);

        let rendered = action.render(&vars);
        assert_eq!(rendered.base_branch, None);
    }

    #[test]
    fn validate_accepts_update_with_content() {
        assert!(spec(ActionKind::Update).validate().is_ok());
    }

    #[test]
    fn validate_rejects_remove_with_content() {
        let mut action = spec(ActionKind::Remove);
        action.content = Some("x".to_string());
        assert!(action.validate().is_err());
    }

    #[test]
    fn validate_rejects_update_with_both_content_modes() {
        let mut action = spec(ActionKind::Update);
        action.search_replace = Some(SearchReplace {
            search: "a".to_string(),
            replace_with: "b".to_string(),
            regex: false,
            replace_all: true,
        });
        assert!(action.validate().is_err());
    }

    #[test]
    fn validate_rejects_update_with_neither_content_mode() {
        let mut action = spec(ActionKind::Update);
        action.content = None;
        assert!(action.validate().is_err());
    }

    #[test]
    fn validate_rejects_add_without_content() {
        let mut action = spec(ActionKind::Add);
        action.content = None;
        assert!(action.validate().is_err());
    }

    #[test]
    fn validate_rejects_invalid_literal_search_regex() {
        let mut action = spec(ActionKind::Update);
        action.content = None;
        action.search_replace = Some(SearchReplace {
            search: "(unclosed".to_string(),
            replace_with: "x".to_string(),
            regex: true,
            replace_all: true,
        });
        assert!(action.validate().is_err());
    }

    #[test]
    fn validate_defers_templated_search_regex() {
        // Patterns containing placeholder tokens can only be checked after
        // rendering, per repository.
        let mut action = spec(ActionKind::Update);
        action.content = None;
        action.search_replace = Some(SearchReplace {
            search: "version: {{ver}}".to_string(),
            replace_with: "version: 2".to_string(),
            regex: true,
            replace_all: true,
        });
        assert!(action.validate().is_ok());
    }

    #[test]
    fn branch_name_defaults_to_timestamped_template() {
        let raw = r#"{
            "kind": "add",
            "filePath": "NOTICE",
            "content": "hello",
            "commitMessage": "Add NOTICE",
            "prTitle": "Add NOTICE"
        }"#;
        let action: ActionSpec = serde_json::from_str(raw).unwrap();
        assert_eq!(action.branch_name, "reposweep-{{timestamp}}");
        assert_eq!(action.pr_body, "");
    }
}
