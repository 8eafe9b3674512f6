// src/cli/handlers/list.rs

use anyhow::Result;
use clap::Parser;
use colored::*;

use crate::core::project::Project;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Lists the commands and executors of the project."
)]
struct ListArgs {}

pub fn handle(args: Vec<String>, project: &mut Project) -> Result<i32> {
    let _list_args = ListArgs::try_parse_from(&args)?;

    println!(
        "\n--- {} '{}' ---",
        t!("list.header.project"),
        project.name().yellow()
    );
    if let Some(help) = project.help() {
        println!("{}", help.trim_end());
    }

    println!("\n{}", t!("list.header.commands").bold());
    let default_command = project.default_command();
    let mut any_command = false;
    for command in project.commands() {
        any_command = true;
        println!(
            "  {:<20} {}{}",
            command.name().cyan(),
            command.help().unwrap_or(""),
            default_marker(Some(command.name()) == default_command)
        );
        for option in command.options() {
            println!(
                "      {:<16} {}",
                option.usage().dimmed(),
                option.help.as_deref().unwrap_or("")
            );
        }
    }
    if !any_command {
        println!("  {}", t!("list.info.no_commands").dimmed());
    }

    println!("\n{}", t!("list.header.executors").bold());
    let default_executor = project.default_executor();
    for (name, kind, help) in project.executors() {
        println!(
            "  {:<20} {:<8} {}{}",
            name.cyan(),
            kind.to_string().dimmed(),
            help.unwrap_or(""),
            default_marker(Some(name) == default_executor)
        );
    }
    Ok(0)
}

fn default_marker(is_default: bool) -> ColoredString {
    if is_default {
        format!(" {}", t!("list.label.default")).green()
    } else {
        "".normal()
    }
}
