// src/cli/handlers/raw.rs

use anyhow::Result;

use crate::{core::project::Project, error::BrockError, executors::CommandLine};

/// Handles `@executor cmd...`: runs the words after the executor on that
/// executor, argument for argument.
pub fn handle(args: Vec<String>, project: &mut Project) -> Result<i32> {
    let (executor, command) = split_raw_args(args)?;
    log::debug!("Raw command on '{}': {}", executor, command);
    Ok(project.exec_raw(&command, Some(executor.as_str()), None)?)
}

/// `["@ci", "make", "-j4"]` → (`ci`, argv `make -j4`).
fn split_raw_args(args: Vec<String>) -> Result<(String, CommandLine), BrockError> {
    let mut args = args.into_iter();
    let executor = args
        .next()
        .map(|first| first.trim_start_matches('@').to_string())
        .unwrap_or_default();
    if executor.is_empty() {
        return Err(BrockError::usage(t!("raw.error.missing_executor")));
    }

    let argv: Vec<String> = args.collect();
    if argv.is_empty() {
        return Err(BrockError::usage(format!(
            t!("raw.error.missing_command"),
            executor = executor
        )));
    }
    Ok((executor, CommandLine::Argv(argv)))
}
