use anyhow::Result;
use clap::Parser;

use crate::{cli::handlers::commons, core::project::Project};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Opens an interactive shell in an executor."
)]
struct ShellArgs {
    /// The executor, as `name` or `@name`. Defaults to the default executor.
    executor: Option<String>,
}

pub fn handle(args: Vec<String>, project: &mut Project) -> Result<i32> {
    let shell_args = ShellArgs::try_parse_from(&args)?;
    let executor = commons::executor_name(shell_args.executor);
    Ok(project.shell(executor.as_deref())?)
}
