//! Batch execution across the selected repository set.
//!
//! One pipeline run per repository, failures isolated, outcomes reported in
//! selection order regardless of execution order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use serde::Serialize;

use crate::action::ActionSpec;
use crate::error::{Error, Result};
use crate::gateway::{ForgeGateway, Repository};
use crate::log_status;
use crate::pipeline::{self, PipelineContext, OutcomeStatus, RepositoryOutcome, RepositoryPlan};
use crate::placeholder::{self, PlaceholderDefinition};

/// Execution knobs for one batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Number of repositories processed at once. 1 = sequential.
    pub parallelism: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { parallelism: 1 }
    }
}

/// Invoked once per completed repository, in completion order.
pub type ProgressHook<'a> = &'a (dyn Fn(&RepositoryOutcome) + Sync);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The aggregate record of a batch run; outcomes match the input order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub outcomes: Vec<RepositoryOutcome>,
    pub summary: BatchSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPlan {
    pub plans: Vec<RepositoryPlan>,
    pub summary: PlanSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub total: usize,
    pub planned: usize,
    pub skipped: usize,
}

fn validate_inputs(
    repositories: &[Repository],
    definitions: &[PlaceholderDefinition],
    action: &ActionSpec,
) -> Result<()> {
    if repositories.is_empty() {
        return Err(Error::validation_missing_argument(vec![
            "repositories".to_string(),
        ]));
    }
    for (index, repo) in repositories.iter().enumerate() {
        if !repo.full_name.contains('/') || repo.full_name.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                format!("repositories[{}]", index),
                "Repository names must be in 'owner/name' form",
                Some(repo.full_name.clone()),
                None,
            ));
        }
    }
    placeholder::validate_definitions(definitions)?;
    action.validate()
}

fn batch_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Runs the batch to completion and returns the ordered report.
///
/// Validation failures of the batch inputs themselves error out before any
/// repository is touched; per-repository failures never do.
pub fn run(
    gateway: &dyn ForgeGateway,
    repositories: &[Repository],
    definitions: &[PlaceholderDefinition],
    action: &ActionSpec,
    options: &BatchOptions,
    progress: Option<ProgressHook>,
) -> Result<BatchReport> {
    validate_inputs(repositories, definitions, action)?;

    let timestamp = batch_timestamp();
    let ctx = PipelineContext {
        gateway,
        definitions,
        action,
        timestamp: &timestamp,
    };

    log_status!(
        "batch",
        "Processing {} repositories ({} at a time)",
        repositories.len(),
        options.parallelism.max(1)
    );

    let outcomes = if options.parallelism > 1 && repositories.len() > 1 {
        run_parallel(&ctx, repositories, options.parallelism, progress)
    } else {
        run_sequential(&ctx, repositories, progress)
    };

    let summary = summarize(&outcomes);
    log_status!(
        "batch",
        "Done: {} succeeded, {} skipped, {} failed",
        summary.succeeded,
        summary.skipped,
        summary.failed
    );

    Ok(BatchReport { outcomes, summary })
}

/// Dry run: resolves and renders every repository, mutating nothing.
pub fn plan(
    gateway: &dyn ForgeGateway,
    repositories: &[Repository],
    definitions: &[PlaceholderDefinition],
    action: &ActionSpec,
) -> Result<BatchPlan> {
    validate_inputs(repositories, definitions, action)?;

    let timestamp = batch_timestamp();
    let ctx = PipelineContext {
        gateway,
        definitions,
        action,
        timestamp: &timestamp,
    };

    let plans: Vec<RepositoryPlan> = repositories
        .iter()
        .map(|repo| pipeline::plan_repository(&ctx, repo))
        .collect();

    let planned = plans.iter().filter(|p| p.status == "planned").count();
    let summary = PlanSummary {
        total: plans.len(),
        planned,
        skipped: plans.len() - planned,
    };

    Ok(BatchPlan { plans, summary })
}

fn run_sequential(
    ctx: &PipelineContext,
    repositories: &[Repository],
    progress: Option<ProgressHook>,
) -> Vec<RepositoryOutcome> {
    let mut outcomes = Vec::with_capacity(repositories.len());
    for repo in repositories {
        let outcome = run_isolated(ctx, repo);
        if let Some(hook) = progress {
            hook(&outcome);
        }
        outcomes.push(outcome);
    }
    outcomes
}

fn run_parallel(
    ctx: &PipelineContext,
    repositories: &[Repository],
    parallelism: usize,
    progress: Option<ProgressHook>,
) -> Vec<RepositoryOutcome> {
    let worker_count = parallelism.min(repositories.len());
    let next_index = AtomicUsize::new(0);
    let (sender, receiver) = mpsc::channel::<(usize, RepositoryOutcome)>();

    let mut slots: Vec<Option<RepositoryOutcome>> = Vec::with_capacity(repositories.len());
    slots.resize_with(repositories.len(), || None);

    thread::scope(|scope| {
        for _ in 0..worker_count {
            let sender = sender.clone();
            let next_index = &next_index;
            scope.spawn(move || loop {
                let index = next_index.fetch_add(1, Ordering::SeqCst);
                if index >= repositories.len() {
                    break;
                }
                let outcome = run_isolated(ctx, &repositories[index]);
                if sender.send((index, outcome)).is_err() {
                    break;
                }
            });
        }
        drop(sender);

        // Receive on the coordinating thread so the progress hook fires in
        // completion order while outcomes land back in input order.
        for (index, outcome) in receiver {
            if let Some(hook) = progress {
                hook(&outcome);
            }
            slots[index] = Some(outcome);
        }
    });

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                RepositoryOutcome::failed_unattributed(
                    &repositories[index].full_name,
                    "Worker produced no outcome",
                )
            })
        })
        .collect()
}

/// The pipeline boundary: a panic inside one repository's run becomes a
/// failed outcome for that repository instead of aborting the batch.
fn run_isolated(ctx: &PipelineContext, repo: &Repository) -> RepositoryOutcome {
    match catch_unwind(AssertUnwindSafe(|| pipeline::run_repository(ctx, repo))) {
        Ok(outcome) => outcome,
        Err(panic) => {
            let detail = panic_message(panic);
            log_status!("batch", "{}: pipeline panicked: {}", repo.full_name, detail);
            RepositoryOutcome::failed_unattributed(
                &repo.full_name,
                format!("Pipeline panicked: {}", detail),
            )
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn summarize(outcomes: &[RepositoryOutcome]) -> BatchSummary {
    BatchSummary {
        total: outcomes.len(),
        succeeded: outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Success)
            .count(),
        skipped: outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Skipped)
            .count(),
        failed: outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::extract::StrategyConfig;
    use crate::pipeline::Stage;
    use crate::core::testutil::InMemoryForge;
    use std::sync::Mutex;

    fn action() -> ActionSpec {
        ActionSpec {
            kind: ActionKind::Update,
            file_path: "cfg/app.yaml".to_string(),
            content: Some("env: {{env}}".to_string()),
            search_replace: None,
            branch_name: "sweep/app".to_string(),
            base_branch: None,
            commit_message: "Update {{file_path}}".to_string(),
            pr_title: "Update app config".to_string(),
            pr_body: String::new(),
        }
    }

    fn definitions() -> Vec<PlaceholderDefinition> {
        vec![PlaceholderDefinition {
            name: "env".to_string(),
            source_file_path: "deploy.yaml".to_string(),
            branch_hint: None,
            strategy: StrategyConfig::YamlPath {
                candidate_paths: vec!["environment".to_string()],
            },
        }]
    }

    fn repos(names: &[&str]) -> Vec<Repository> {
        names.iter().map(|n| Repository::new(*n)).collect()
    }

    #[test]
    fn one_repository_failure_does_not_abort_the_batch() {
        let forge = InMemoryForge::new("main");
        forge.put_file("o/one", "main", "deploy.yaml", "environment: a\n");
        // o/two has no deploy.yaml: placeholder fetch fails, repository skipped.
        forge.put_file("o/three", "main", "deploy.yaml", "environment: c\n");

        let repositories = repos(&["o/one", "o/two", "o/three"]);
        let report = run(
            &forge,
            &repositories,
            &definitions(),
            &action(),
            &BatchOptions::default(),
            None,
        )
        .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.outcomes[0].status, OutcomeStatus::Success);
        assert_eq!(report.outcomes[1].status, OutcomeStatus::Skipped);
        assert_eq!(report.outcomes[1].stage, Some(Stage::PlaceholderExtraction));
        assert_eq!(report.outcomes[2].status, OutcomeStatus::Success);

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.summary.failed, 0);
    }

    #[test]
    fn outcomes_follow_input_order() {
        let forge = InMemoryForge::new("main");
        let names = ["o/c", "o/a", "o/b"];
        for name in names {
            forge.put_file(name, "main", "deploy.yaml", "environment: x\n");
        }

        let repositories = repos(&names);
        let report = run(
            &forge,
            &repositories,
            &definitions(),
            &action(),
            &BatchOptions::default(),
            None,
        )
        .unwrap();

        let reported: Vec<&str> = report
            .outcomes
            .iter()
            .map(|o| o.repository_full_name.as_str())
            .collect();
        assert_eq!(reported, names);
    }

    #[test]
    fn parallel_run_keeps_input_order() {
        let forge = InMemoryForge::new("main");
        let names: Vec<String> = (0..8).map(|i| format!("o/repo-{}", i)).collect();
        for name in &names {
            forge.put_file(name, "main", "deploy.yaml", "environment: x\n");
        }

        let repositories: Vec<Repository> =
            names.iter().map(|n| Repository::new(n.clone())).collect();
        let report = run(
            &forge,
            &repositories,
            &definitions(),
            &action(),
            &BatchOptions { parallelism: 4 },
            None,
        )
        .unwrap();

        let reported: Vec<&str> = report
            .outcomes
            .iter()
            .map(|o| o.repository_full_name.as_str())
            .collect();
        let expected: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(reported, expected);
        assert_eq!(report.summary.succeeded, 8);
    }

    #[test]
    fn panic_in_pipeline_becomes_failed_outcome() {
        let forge = InMemoryForge::new("main");
        forge.put_file("o/one", "main", "deploy.yaml", "environment: a\n");
        forge.put_file("o/two", "main", "deploy.yaml", "environment: b\n");
        forge.panic_on_fetch("cfg/app.yaml");

        // Both repositories hit the injected panic at the update fetch.
        let repositories = repos(&["o/one", "o/two"]);
        let report = run(
            &forge,
            &repositories,
            &definitions(),
            &action(),
            &BatchOptions::default(),
            None,
        )
        .unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].status, OutcomeStatus::Failed);
        assert_eq!(report.outcomes[0].stage, None);
        assert_eq!(report.outcomes[1].status, OutcomeStatus::Failed);
    }

    #[test]
    fn progress_hook_fires_once_per_repository() {
        let forge = InMemoryForge::new("main");
        forge.put_file("o/one", "main", "deploy.yaml", "environment: a\n");
        forge.put_file("o/two", "main", "deploy.yaml", "environment: b\n");

        let seen: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let hook = |outcome: &RepositoryOutcome| {
            seen.lock().unwrap().push(outcome.repository_full_name.clone());
        };

        let repositories = repos(&["o/one", "o/two"]);
        run(
            &forge,
            &repositories,
            &definitions(),
            &action(),
            &BatchOptions::default(),
            Some(&hook),
        )
        .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn rejects_empty_repository_selection() {
        let forge = InMemoryForge::new("main");
        let err = run(
            &forge,
            &[],
            &definitions(),
            &action(),
            &BatchOptions::default(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ValidationMissingArgument);
    }

    #[test]
    fn rejects_malformed_repository_name() {
        let forge = InMemoryForge::new("main");
        let repositories = repos(&["not-a-full-name"]);
        let err = run(
            &forge,
            &repositories,
            &definitions(),
            &action(),
            &BatchOptions::default(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ValidationInvalidArgument);
    }

    #[test]
    fn rejects_invalid_action_before_touching_repositories() {
        let forge = InMemoryForge::new("main");
        let mut bad_action = action();
        bad_action.content = None;

        let repositories = repos(&["o/one"]);
        let err = run(
            &forge,
            &repositories,
            &definitions(),
            &bad_action,
            &BatchOptions::default(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ValidationMissingArgument);
        assert_eq!(forge.write_count(), 0);
    }

    #[test]
    fn plan_covers_every_repository_without_writes() {
        let forge = InMemoryForge::new("main");
        forge.put_file("o/one", "main", "deploy.yaml", "environment: a\n");
        // o/two missing the source file: planned as skipped.

        let repositories = repos(&["o/one", "o/two"]);
        let result = plan(&forge, &repositories, &definitions(), &action()).unwrap();

        assert_eq!(result.plans.len(), 2);
        assert_eq!(result.summary.planned, 1);
        assert_eq!(result.summary.skipped, 1);
        assert_eq!(forge.write_count(), 0);
        assert_eq!(forge.prs().len(), 0);
    }
}
