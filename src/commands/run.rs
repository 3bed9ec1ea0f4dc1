use clap::Args;
use serde::Serialize;

use reposweep::batch::{self, BatchOptions, BatchPlan, BatchReport};
use reposweep::batchfile;
use reposweep::forge::GitHubForge;
use reposweep::pipeline::{OutcomeStatus, RepositoryOutcome};

use super::CmdResult;

#[derive(Args)]
pub struct RunArgs {
    /// Batch spec (inline JSON, @file, or - for stdin)
    pub batch: String,

    /// Repositories processed at once (1 = sequential)
    #[arg(long, default_value_t = 1)]
    pub parallel: usize,

    /// Resolve placeholders and render actions without mutating the forge
    #[arg(long)]
    pub dry_run: bool,

    /// Forge API base URL, for GitHub Enterprise hosts
    #[arg(long)]
    pub base_url: Option<String>,

    /// Environment variable holding the forge token
    #[arg(long, default_value = "GITHUB_TOKEN")]
    pub token_env: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub command: String,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<BatchReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<BatchPlan>,
}

pub fn run(args: RunArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<RunOutput> {
    let batch_file = batchfile::load(&args.batch)?;

    let token = std::env::var(&args.token_env).map_err(|_| {
        reposweep::Error::validation_missing_argument(vec![args.token_env.clone()]).with_hint(
            format!(
                "Export a personal-access token: {}=<token>",
                args.token_env
            ),
        )
    })?;
    let forge = GitHubForge::new(token, args.base_url.clone())?;

    if args.dry_run {
        let plan = batch::plan(
            &forge,
            &batch_file.repositories,
            &batch_file.placeholders,
            &batch_file.action,
        )?;
        return Ok((
            RunOutput {
                command: "run".to_string(),
                dry_run: true,
                report: None,
                plan: Some(plan),
            },
            0,
        ));
    }

    let options = BatchOptions {
        parallelism: args.parallel.max(1),
    };
    let progress = |outcome: &RepositoryOutcome| {
        let line = match outcome.status {
            OutcomeStatus::Success => format!(
                "[run] {}: {}",
                outcome.repository_full_name,
                outcome.pull_request_url.as_deref().unwrap_or("done")
            ),
            OutcomeStatus::Skipped => format!(
                "[run] {}: skipped ({})",
                outcome.repository_full_name,
                outcome.error.as_deref().unwrap_or("no detail")
            ),
            OutcomeStatus::Failed => format!(
                "[run] {}: failed ({})",
                outcome.repository_full_name,
                outcome.error.as_deref().unwrap_or("no detail")
            ),
        };
        crate::tty::status(&line);
    };

    let report = batch::run(
        &forge,
        &batch_file.repositories,
        &batch_file.placeholders,
        &batch_file.action,
        &options,
        Some(&progress),
    )?;

    let exit_code = if report.summary.failed > 0 { 20 } else { 0 };
    Ok((
        RunOutput {
            command: "run".to_string(),
            dry_run: false,
            report: Some(report),
            plan: None,
        },
        exit_code,
    ))
}
