pub type CmdResult<T> = reposweep::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

pub mod run;
pub mod validate;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (reposweep::Result<serde_json::Value>, i32) {
    crate::tty::status("reposweep is working...");

    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Validate(args) => dispatch!(args, global, validate),
    }
}
