use anyhow::Result;
use clap::Parser;

use crate::core::project::Project;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Runs a command defined in the project config."
)]
struct ExecArgs {
    /// The command to run. Defaults to the project's default command.
    command: Option<String>,
}

/// Runs a user command and returns its exit code.
pub fn handle(args: Vec<String>, project: &mut Project) -> Result<i32> {
    let exec_args = ExecArgs::try_parse_from(&args)?;
    Ok(project.exec(exec_args.command.as_deref())?)
}
