use anyhow::Result;
use clap::Parser;
use colored::*;

use crate::core::project::Project;

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Shows the state of every executor.")]
struct StatusArgs {}

pub fn handle(args: Vec<String>, project: &mut Project) -> Result<i32> {
    let _status_args = StatusArgs::try_parse_from(&args)?;

    let report = project.status()?;
    if report.is_empty() {
        println!("{}", t!("status.info.no_executors").dimmed());
        return Ok(0);
    }
    for (name, status) in report {
        println!("{}: {}", name.cyan().bold(), status);
    }
    Ok(0)
}
