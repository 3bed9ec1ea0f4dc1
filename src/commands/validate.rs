use clap::Args;
use serde::Serialize;

use reposweep::batchfile;

use super::CmdResult;

#[derive(Args)]
pub struct ValidateArgs {
    /// Batch spec (inline JSON, @file, or - for stdin)
    pub batch: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateOutput {
    pub command: String,
    pub repositories: usize,
    pub placeholders: usize,
    pub action_kind: String,
}

pub fn run(args: ValidateArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<ValidateOutput> {
    let batch_file = batchfile::load(&args.batch)?;

    Ok((
        ValidateOutput {
            command: "validate".to_string(),
            repositories: batch_file.repositories.len(),
            placeholders: batch_file.placeholders.len(),
            action_kind: batch_file.action.kind.as_str().to_string(),
        },
        0,
    ))
}
