//! Per-repository mutation pipeline.
//!
//! Each repository runs the same state machine: resolve placeholders, render
//! the action, ensure the working branch, apply the file operation, open the
//! pull request. Every run terminates in exactly one [`RepositoryOutcome`];
//! nothing here aborts the batch.

use regex::Regex;
use serde::Serialize;

use crate::action::{ActionKind, ActionSpec, RenderedAction, SearchReplace};
use crate::gateway::{ForgeGateway, Repository};
use crate::log_status;
use crate::placeholder::{self, PlaceholderDefinition};

/// Pipeline stage at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PlaceholderExtraction,
    BranchCreation,
    FileOperation,
    PullRequestCreation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Skipped,
    Failed,
}

/// What the file operation did to the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChange {
    Created,
    Updated,
    Deleted,
}

/// The authoritative per-repository record shown to the user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryOutcome {
    pub repository_full_name: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_change: Option<FileChange>,
}

impl RepositoryOutcome {
    fn new(repo: &str, status: OutcomeStatus) -> Self {
        Self {
            repository_full_name: repo.to_string(),
            status,
            pull_request_url: None,
            error: None,
            stage: None,
            file_change: None,
        }
    }

    pub fn success(repo: &str, pull_request_url: String, file_change: FileChange) -> Self {
        let mut outcome = Self::new(repo, OutcomeStatus::Success);
        outcome.pull_request_url = Some(pull_request_url);
        outcome.file_change = Some(file_change);
        outcome
    }

    pub fn skipped(repo: &str, stage: Stage, error: impl Into<String>) -> Self {
        let mut outcome = Self::new(repo, OutcomeStatus::Skipped);
        outcome.stage = Some(stage);
        outcome.error = Some(error.into());
        outcome
    }

    pub fn failed(repo: &str, stage: Stage, error: impl Into<String>) -> Self {
        let mut outcome = Self::new(repo, OutcomeStatus::Failed);
        outcome.stage = Some(stage);
        outcome.error = Some(error.into());
        outcome
    }

    /// Failure caught at the pipeline boundary with no stage attribution.
    pub fn failed_unattributed(repo: &str, error: impl Into<String>) -> Self {
        let mut outcome = Self::new(repo, OutcomeStatus::Failed);
        outcome.error = Some(error.into());
        outcome
    }

    fn with_file_change(mut self, change: FileChange) -> Self {
        self.file_change = Some(change);
        self
    }
}

/// Immutable inputs shared by every repository in a batch.
pub struct PipelineContext<'a> {
    pub gateway: &'a dyn ForgeGateway,
    pub definitions: &'a [PlaceholderDefinition],
    pub action: &'a ActionSpec,
    /// Batch-wide timestamp, exposed as the `{{timestamp}}` placeholder.
    pub timestamp: &'a str,
}

/// Runs the full state machine for one repository.
pub fn run_repository(ctx: &PipelineContext, repo: &Repository) -> RepositoryOutcome {
    let full_name = repo.full_name.as_str();

    let prepared = match prepare(ctx, repo) {
        Ok(prepared) => prepared,
        Err(outcome) => return *outcome,
    };
    let Prepared {
        rendered,
        working_branch,
        base_branch,
    } = prepared;

    if let Err(e) = ctx
        .gateway
        .ensure(full_name, &working_branch, &base_branch)
    {
        return RepositoryOutcome::failed(full_name, Stage::BranchCreation, e.to_string());
    }

    let file_change =
        match apply_file_operation(ctx, full_name, &rendered, &working_branch, &base_branch) {
            Ok(change) => change,
            Err(message) => {
                return RepositoryOutcome::failed(full_name, Stage::FileOperation, message)
            }
        };

    match ctx.gateway.create(
        full_name,
        &working_branch,
        &base_branch,
        &rendered.pr_title,
        &rendered.pr_body,
    ) {
        Ok(url) => {
            log_status!("pipeline", "{}: opened {}", full_name, url);
            RepositoryOutcome::success(full_name, url, file_change)
        }
        // The committed mutation stays; the branch remains for manual recovery.
        Err(e) => RepositoryOutcome::failed(full_name, Stage::PullRequestCreation, e.to_string())
            .with_file_change(file_change),
    }
}

/// What a dry run would do for one repository.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryPlan {
    pub repository_full_name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<RenderedAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolves and renders without mutating anything remote. Placeholder source
/// files are still fetched; branch, file, and PR operations are not performed.
pub fn plan_repository(ctx: &PipelineContext, repo: &Repository) -> RepositoryPlan {
    match prepare(ctx, repo) {
        Ok(Prepared {
            rendered,
            working_branch,
            base_branch,
        }) => RepositoryPlan {
            repository_full_name: repo.full_name.clone(),
            status: "planned".to_string(),
            action: Some(rendered),
            working_branch: Some(working_branch),
            base_branch: Some(base_branch),
            error: None,
        },
        Err(outcome) => RepositoryPlan {
            repository_full_name: repo.full_name.clone(),
            status: "skipped".to_string(),
            action: None,
            working_branch: None,
            base_branch: None,
            error: outcome.error,
        },
    }
}

struct Prepared {
    rendered: RenderedAction,
    working_branch: String,
    base_branch: String,
}

/// Shared front half of run and plan: default branch, placeholder resolution,
/// rendering, and branch-name fallback.
fn prepare(ctx: &PipelineContext, repo: &Repository) -> Result<Prepared, Box<RepositoryOutcome>> {
    let full_name = repo.full_name.as_str();

    // The default branch is needed before extraction: placeholder fetches
    // fall back to it when no branch hint is given.
    let default_branch = match &repo.default_branch {
        Some(branch) => branch.clone(),
        None => match ctx.gateway.default_branch(full_name) {
            Ok(branch) => branch,
            Err(e) => {
                return Err(Box::new(RepositoryOutcome::failed(
                    full_name,
                    Stage::BranchCreation,
                    e.to_string(),
                )))
            }
        },
    };

    let resolved = match placeholder::resolve(
        ctx.gateway,
        repo,
        &default_branch,
        ctx.timestamp,
        ctx.definitions,
    ) {
        Ok(resolved) => resolved,
        Err(e) => {
            log_status!("pipeline", "{}: skipped ({})", full_name, e);
            return Err(Box::new(RepositoryOutcome::skipped(
                full_name,
                Stage::PlaceholderExtraction,
                e.to_string(),
            )));
        }
    };

    let rendered = ctx.action.render(&resolved);

    if rendered.file_path.trim().is_empty() {
        return Err(Box::new(RepositoryOutcome::failed(
            full_name,
            Stage::FileOperation,
            "Rendered file path is empty",
        )));
    }

    let working_branch = if rendered.branch_name.trim().is_empty() {
        format!("reposweep-{}", ctx.timestamp)
    } else {
        rendered.branch_name.clone()
    };
    let base_branch = rendered
        .base_branch
        .clone()
        .unwrap_or_else(|| default_branch.clone());

    Ok(Prepared {
        rendered,
        working_branch,
        base_branch,
    })
}

fn apply_file_operation(
    ctx: &PipelineContext,
    repo: &str,
    rendered: &RenderedAction,
    working_branch: &str,
    base_branch: &str,
) -> Result<FileChange, String> {
    let gateway = ctx.gateway;
    let path = rendered.file_path.as_str();
    let message = rendered.commit_message.as_str();

    match rendered.kind {
        ActionKind::Remove => {
            let file = gateway.fetch(repo, path, working_branch).map_err(|e| {
                if e.is_not_found() {
                    format!(
                        "Cannot remove '{}': not found on branch '{}'",
                        path, working_branch
                    )
                } else {
                    e.to_string()
                }
            })?;
            gateway
                .delete(repo, path, message, working_branch, &file.sha)
                .map_err(|e| e.to_string())?;
            Ok(FileChange::Deleted)
        }
        ActionKind::Update => {
            if let Some(sr) = &rendered.search_replace {
                update_via_search_replace(
                    ctx,
                    repo,
                    path,
                    message,
                    sr,
                    working_branch,
                    base_branch,
                )
            } else {
                let content = rendered.content.as_deref().unwrap_or_default();
                // Absence is not an error for update: the write becomes a create.
                let sha = match gateway.fetch(repo, path, working_branch) {
                    Ok(file) => Some(file.sha),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => return Err(e.to_string()),
                };
                let written = gateway
                    .write(repo, path, content, message, working_branch, sha.as_deref())
                    .map_err(|e| e.to_string())?;
                Ok(if written.was_create {
                    FileChange::Created
                } else {
                    FileChange::Updated
                })
            }
        }
        ActionKind::Add => {
            let content = rendered.content.as_deref().unwrap_or_default();
            // No prior SHA: an existing path surfaces the gateway's conflict.
            gateway
                .write(repo, path, content, message, working_branch, None)
                .map_err(|e| e.to_string())?;
            Ok(FileChange::Created)
        }
    }
}

fn update_via_search_replace(
    ctx: &PipelineContext,
    repo: &str,
    path: &str,
    message: &str,
    sr: &SearchReplace,
    working_branch: &str,
    base_branch: &str,
) -> Result<FileChange, String> {
    let gateway = ctx.gateway;

    // Prefer the working branch's copy; fall back to the base branch when a
    // pre-existing working branch lacks the file.
    let (current, sha) = match gateway.fetch(repo, path, working_branch) {
        Ok(file) => (file.content, Some(file.sha)),
        Err(e) if e.is_not_found() => match gateway.fetch(repo, path, base_branch) {
            Ok(file) => (file.content, None),
            Err(e2) if e2.is_not_found() => {
                return Err(format!(
                    "File '{}' not found on '{}' or '{}' for search/replace",
                    path, working_branch, base_branch
                ));
            }
            Err(e2) => return Err(e2.to_string()),
        },
        Err(e) => return Err(e.to_string()),
    };

    let next = apply_search_replace(&current, sr)?;
    let written = gateway
        .write(repo, path, &next, message, working_branch, sha.as_deref())
        .map_err(|e| e.to_string())?;

    Ok(if written.was_create {
        FileChange::Created
    } else {
        FileChange::Updated
    })
}

fn apply_search_replace(content: &str, sr: &SearchReplace) -> Result<String, String> {
    if sr.regex {
        let compiled = Regex::new(&sr.search)
            .map_err(|e| format!("Invalid rendered search pattern: {}", e))?;
        let limit = if sr.replace_all { 0 } else { 1 };
        Ok(compiled
            .replacen(content, limit, sr.replace_with.as_str())
            .into_owned())
    } else if sr.replace_all {
        Ok(content.replace(&sr.search, &sr.replace_with))
    } else {
        Ok(content.replacen(&sr.search, &sr.replace_with, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::StrategyConfig;
    use crate::placeholder::PlaceholderDefinition;
    use crate::core::testutil::InMemoryForge;

    fn update_action() -> ActionSpec {
        ActionSpec {
            kind: ActionKind::Update,
            file_path: "cfg/{{env}}.yaml".to_string(),
            content: Some("port: {{port}}".to_string()),
            search_replace: None,
            branch_name: "sweep/config".to_string(),
            base_branch: None,
            commit_message: "Update {{file_path}}".to_string(),
            pr_title: "Update {{env}} config".to_string(),
            pr_body: "Automated".to_string(),
        }
    }

    fn yaml_definitions() -> Vec<PlaceholderDefinition> {
        vec![
            PlaceholderDefinition {
                name: "env".to_string(),
                source_file_path: "deploy.yaml".to_string(),
                branch_hint: None,
                strategy: StrategyConfig::YamlPath {
                    candidate_paths: vec!["environment".to_string()],
                },
            },
            PlaceholderDefinition {
                name: "port".to_string(),
                source_file_path: "deploy.yaml".to_string(),
                branch_hint: None,
                strategy: StrategyConfig::YamlPath {
                    candidate_paths: vec!["service.port".to_string()],
                },
            },
        ]
    }

    fn ctx<'a>(
        forge: &'a InMemoryForge,
        definitions: &'a [PlaceholderDefinition],
        action: &'a ActionSpec,
    ) -> PipelineContext<'a> {
        PipelineContext {
            gateway: forge,
            definitions,
            action,
            timestamp: "20260807-120000",
        }
    }

    fn seed_deploy_yaml(forge: &InMemoryForge, repo: &str) {
        forge.put_file(
            repo,
            "main",
            "deploy.yaml",
            "environment: prod\nservice:\n  port: 8080\n",
        );
    }

    #[test]
    fn update_end_to_end_creates_branch_file_and_pr() {
        let forge = InMemoryForge::new("main");
        seed_deploy_yaml(&forge, "o/r");

        let definitions = yaml_definitions();
        let action = update_action();
        let outcome = run_repository(&ctx(&forge, &definitions, &action), &Repository::new("o/r"));

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.file_change, Some(FileChange::Created));
        assert!(outcome.pull_request_url.as_deref().unwrap().len() > 0);

        assert!(forge.has_branch("o/r", "sweep/config"));
        assert_eq!(
            forge.file_content("o/r", "sweep/config", "cfg/prod.yaml"),
            Some("port: 8080".to_string())
        );

        let prs = forge.prs();
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].head, "sweep/config");
        assert_eq!(prs[0].base, "main");
        assert_eq!(prs[0].title, "Update prod config");
        assert_eq!(prs[0].body, "Automated");
    }

    #[test]
    fn update_overwrites_existing_file_with_sha() {
        let forge = InMemoryForge::new("main");
        seed_deploy_yaml(&forge, "o/r");
        forge.put_file("o/r", "main", "cfg/prod.yaml", "port: 1\n");

        let definitions = yaml_definitions();
        let action = update_action();
        let outcome = run_repository(&ctx(&forge, &definitions, &action), &Repository::new("o/r"));

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.file_change, Some(FileChange::Updated));
        assert_eq!(
            forge.file_content("o/r", "sweep/config", "cfg/prod.yaml"),
            Some("port: 8080".to_string())
        );
    }

    #[test]
    fn rerun_reuses_branch_and_existing_pr() {
        let forge = InMemoryForge::new("main");
        seed_deploy_yaml(&forge, "o/r");

        let definitions = yaml_definitions();
        let action = update_action();
        let first = run_repository(&ctx(&forge, &definitions, &action), &Repository::new("o/r"));
        let second = run_repository(&ctx(&forge, &definitions, &action), &Repository::new("o/r"));

        assert_eq!(first.status, OutcomeStatus::Success);
        assert_eq!(second.status, OutcomeStatus::Success);
        assert_eq!(first.pull_request_url, second.pull_request_url);
        assert_eq!(forge.prs().len(), 1);
    }

    #[test]
    fn placeholder_fetch_failure_skips_before_any_mutation() {
        let forge = InMemoryForge::new("main");
        // deploy.yaml missing entirely.

        let definitions = yaml_definitions();
        let action = update_action();
        let outcome = run_repository(&ctx(&forge, &definitions, &action), &Repository::new("o/r"));

        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.stage, Some(Stage::PlaceholderExtraction));
        assert!(!forge.has_branch("o/r", "sweep/config"));
        assert_eq!(forge.prs().len(), 0);
        assert_eq!(forge.write_count(), 0);
    }

    #[test]
    fn branch_denial_fails_at_branch_creation() {
        let forge = InMemoryForge::new("main");
        seed_deploy_yaml(&forge, "o/r");
        forge.fail_branches_for("o/r");

        let definitions = yaml_definitions();
        let action = update_action();
        let outcome = run_repository(&ctx(&forge, &definitions, &action), &Repository::new("o/r"));

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.stage, Some(Stage::BranchCreation));
        assert_eq!(forge.write_count(), 0);
    }

    #[test]
    fn remove_missing_file_fails_without_pr() {
        let forge = InMemoryForge::new("main");

        let action = ActionSpec {
            kind: ActionKind::Remove,
            file_path: "obsolete.txt".to_string(),
            content: None,
            search_replace: None,
            branch_name: "sweep/remove".to_string(),
            base_branch: None,
            commit_message: "Remove obsolete.txt".to_string(),
            pr_title: "Remove obsolete file".to_string(),
            pr_body: String::new(),
        };
        let outcome = run_repository(&ctx(&forge, &[], &action), &Repository::new("o/r"));

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.stage, Some(Stage::FileOperation));
        // The branch persists per the idempotent-branch policy; no PR opened.
        assert!(forge.has_branch("o/r", "sweep/remove"));
        assert_eq!(forge.prs().len(), 0);
    }

    #[test]
    fn remove_deletes_existing_file() {
        let forge = InMemoryForge::new("main");
        forge.put_file("o/r", "main", "obsolete.txt", "bye");

        let action = ActionSpec {
            kind: ActionKind::Remove,
            file_path: "obsolete.txt".to_string(),
            content: None,
            search_replace: None,
            branch_name: "sweep/remove".to_string(),
            base_branch: None,
            commit_message: "Remove obsolete.txt".to_string(),
            pr_title: "Remove obsolete file".to_string(),
            pr_body: String::new(),
        };
        let outcome = run_repository(&ctx(&forge, &[], &action), &Repository::new("o/r"));

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.file_change, Some(FileChange::Deleted));
        assert_eq!(forge.file_content("o/r", "sweep/remove", "obsolete.txt"), None);
        // Base branch untouched.
        assert_eq!(
            forge.file_content("o/r", "main", "obsolete.txt"),
            Some("bye".to_string())
        );
    }

    #[test]
    fn add_conflicts_when_path_exists() {
        let forge = InMemoryForge::new("main");
        forge.put_file("o/r", "main", "NOTICE", "already here");

        let action = ActionSpec {
            kind: ActionKind::Add,
            file_path: "NOTICE".to_string(),
            content: Some("new".to_string()),
            search_replace: None,
            branch_name: "sweep/add".to_string(),
            base_branch: None,
            commit_message: "Add NOTICE".to_string(),
            pr_title: "Add NOTICE".to_string(),
            pr_body: String::new(),
        };
        let outcome = run_repository(&ctx(&forge, &[], &action), &Repository::new("o/r"));

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.stage, Some(Stage::FileOperation));
        // Not silently overwritten.
        assert_eq!(
            forge.file_content("o/r", "sweep/add", "NOTICE"),
            Some("already here".to_string())
        );
    }

    #[test]
    fn pr_failure_keeps_committed_file_change() {
        let forge = InMemoryForge::new("main");
        seed_deploy_yaml(&forge, "o/r");
        forge.fail_prs_for("o/r");

        let definitions = yaml_definitions();
        let action = update_action();
        let outcome = run_repository(&ctx(&forge, &definitions, &action), &Repository::new("o/r"));

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.stage, Some(Stage::PullRequestCreation));
        assert_eq!(outcome.file_change, Some(FileChange::Created));
        // No rollback: the mutation is still on the working branch.
        assert_eq!(
            forge.file_content("o/r", "sweep/config", "cfg/prod.yaml"),
            Some("port: 8080".to_string())
        );
    }

    #[test]
    fn search_replace_rewrites_existing_content() {
        let forge = InMemoryForge::new("main");
        forge.put_file("o/r", "main", "README.md", "badge v1 and badge v1");

        let action = ActionSpec {
            kind: ActionKind::Update,
            file_path: "README.md".to_string(),
            content: None,
            search_replace: Some(SearchReplace {
                search: "badge v1".to_string(),
                replace_with: "badge v2".to_string(),
                regex: false,
                replace_all: true,
            }),
            branch_name: "sweep/badges".to_string(),
            base_branch: None,
            commit_message: "Refresh badges".to_string(),
            pr_title: "Refresh badges".to_string(),
            pr_body: String::new(),
        };
        let outcome = run_repository(&ctx(&forge, &[], &action), &Repository::new("o/r"));

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(
            forge.file_content("o/r", "sweep/badges", "README.md"),
            Some("badge v2 and badge v2".to_string())
        );
    }

    #[test]
    fn search_replace_first_occurrence_only() {
        let sr = SearchReplace {
            search: "a".to_string(),
            replace_with: "b".to_string(),
            regex: false,
            replace_all: false,
        };
        assert_eq!(apply_search_replace("a a a", &sr).unwrap(), "b a a");
    }

    #[test]
    fn search_replace_regex_with_backreference() {
        let sr = SearchReplace {
            search: r"version (\d+)".to_string(),
            replace_with: "release $1".to_string(),
            regex: true,
            replace_all: true,
        };
        assert_eq!(
            apply_search_replace("version 3", &sr).unwrap(),
            "release 3"
        );
    }

    #[test]
    fn search_replace_missing_file_fails() {
        let forge = InMemoryForge::new("main");

        let action = ActionSpec {
            kind: ActionKind::Update,
            file_path: "README.md".to_string(),
            content: None,
            search_replace: Some(SearchReplace {
                search: "x".to_string(),
                replace_with: "y".to_string(),
                regex: false,
                replace_all: true,
            }),
            branch_name: "sweep/sr".to_string(),
            base_branch: None,
            commit_message: "msg".to_string(),
            pr_title: "title".to_string(),
            pr_body: String::new(),
        };
        let outcome = run_repository(&ctx(&forge, &[], &action), &Repository::new("o/r"));

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.stage, Some(Stage::FileOperation));
    }

    #[test]
    fn empty_rendered_branch_falls_back_to_timestamp_name() {
        let forge = InMemoryForge::new("main");
        forge.put_file("o/r", "main", "NOTICE.src", "x");

        let action = ActionSpec {
            kind: ActionKind::Add,
            file_path: "NOTICE".to_string(),
            content: Some("text".to_string()),
            search_replace: None,
            branch_name: "{{unknown_branch}}".to_string(),
            base_branch: None,
            commit_message: "Add NOTICE".to_string(),
            pr_title: "Add NOTICE".to_string(),
            pr_body: String::new(),
        };
        // {{unknown_branch}} is not defined anywhere, so it stays verbatim and
        // is a usable branch name; make it render empty via a definition.
        let definitions = vec![PlaceholderDefinition {
            name: "unknown_branch".to_string(),
            source_file_path: "NOTICE.src".to_string(),
            branch_hint: None,
            strategy: StrategyConfig::Regex {
                pattern: "nope-(x)".to_string(),
                group_index: 1,
            },
        }];
        let outcome = run_repository(&ctx(&forge, &definitions, &action), &Repository::new("o/r"));

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert!(forge.has_branch("o/r", "reposweep-20260807-120000"));
    }

    #[test]
    fn plan_renders_without_mutating() {
        let forge = InMemoryForge::new("main");
        seed_deploy_yaml(&forge, "o/r");

        let definitions = yaml_definitions();
        let action = update_action();
        let plan = plan_repository(&ctx(&forge, &definitions, &action), &Repository::new("o/r"));

        assert_eq!(plan.status, "planned");
        let rendered = plan.action.unwrap();
        assert_eq!(rendered.file_path, "cfg/prod.yaml");
        assert_eq!(rendered.content.as_deref(), Some("port: 8080"));
        assert_eq!(plan.base_branch.as_deref(), Some("main"));

        assert_eq!(forge.write_count(), 0);
        assert_eq!(forge.prs().len(), 0);
        assert!(!forge.has_branch("o/r", "sweep/config"));
    }

    #[test]
    fn plan_reports_skip_reason() {
        let forge = InMemoryForge::new("main");

        let definitions = yaml_definitions();
        let action = update_action();
        let plan = plan_repository(&ctx(&forge, &definitions, &action), &Repository::new("o/r"));

        assert_eq!(plan.status, "skipped");
        assert!(plan.error.is_some());
        assert!(plan.action.is_none());
    }
}
