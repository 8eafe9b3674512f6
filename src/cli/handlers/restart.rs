use anyhow::Result;
use clap::Parser;

use crate::{cli::handlers::commons, core::project::Project};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Restarts executors, e.g. to apply a changed config."
)]
struct RestartArgs {
    /// Only this executor. Defaults to all of them.
    executor: Option<String>,
}

pub fn handle(args: Vec<String>, project: &mut Project) -> Result<i32> {
    let restart_args = RestartArgs::try_parse_from(&args)?;
    let executor = commons::executor_name(restart_args.executor);
    Ok(project.restart(executor.as_deref())?)
}
