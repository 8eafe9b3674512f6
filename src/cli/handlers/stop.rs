use anyhow::Result;
use clap::Parser;

use crate::{cli::handlers::commons, core::project::Project};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Stops executors, copying container-side changes back first."
)]
struct StopArgs {
    /// Only this executor. Defaults to all of them.
    executor: Option<String>,
}

pub fn handle(args: Vec<String>, project: &mut Project) -> Result<i32> {
    let stop_args = StopArgs::try_parse_from(&args)?;
    let executor = commons::executor_name(stop_args.executor);
    Ok(project.stop(executor.as_deref())?)
}
