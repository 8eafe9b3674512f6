use anyhow::Result;
use clap::Parser;

use crate::{cli::handlers::commons, core::project::Project};

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Starts executors.")]
struct StartArgs {
    /// Only this executor. Defaults to all of them.
    executor: Option<String>,
}

pub fn handle(args: Vec<String>, project: &mut Project) -> Result<i32> {
    let start_args = StartArgs::try_parse_from(&args)?;
    let executor = commons::executor_name(start_args.executor);
    Ok(project.start(executor.as_deref())?)
}
