use anyhow::Result;
use clap::Parser;

use crate::{cli::handlers::commons, core::project::Project};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Pulls or builds executor images, restarting executors that are running."
)]
struct InitArgs {
    /// Only this executor. Defaults to all of them.
    executor: Option<String>,
}

pub fn handle(args: Vec<String>, project: &mut Project) -> Result<i32> {
    let init_args = InitArgs::try_parse_from(&args)?;
    let executor = commons::executor_name(init_args.executor);
    Ok(project.update(executor.as_deref())?)
}
