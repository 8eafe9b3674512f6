use anyhow::Result;

use crate::{cli::handlers, core::project::Project};

/// Defines a built-in action, its aliases and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &mut Project) -> Result<i32>,
}

/// Built-in actions. Every other first word is a user command.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "status",
        aliases: &[],
        handler: handlers::status::handle,
    },
    CommandDefinition {
        name: "init",
        aliases: &[],
        handler: handlers::init::handle,
    },
    CommandDefinition {
        name: "start",
        aliases: &[],
        handler: handlers::start::handle,
    },
    CommandDefinition {
        name: "stop",
        aliases: &[],
        handler: handlers::stop::handle,
    },
    CommandDefinition {
        name: "restart",
        aliases: &[],
        handler: handlers::restart::handle,
    },
    CommandDefinition {
        name: "exec",
        aliases: &[],
        handler: handlers::exec::handle,
    },
    CommandDefinition {
        name: "shell",
        aliases: &[],
        handler: handlers::shell::handle,
    },
    CommandDefinition {
        name: "list",
        aliases: &["ls"],
        handler: handlers::list::handle,
    },
];

/// Finds an action in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Where an argument list is routed.
enum Route {
    Action(&'static CommandDefinition),
    Raw,
    UserCommand,
}

fn route(args: &[String]) -> Route {
    match args.first() {
        Some(first) if first.starts_with('@') => Route::Raw,
        Some(first) => match find_command(first) {
            Some(command) => Route::Action(command),
            None => Route::UserCommand,
        },
        None => Route::UserCommand,
    }
}

/// Routes the arguments after the global flags and returns the exit code.
///
/// - `@executor cmd...` runs `cmd` on that executor.
/// - A built-in action gets the remaining arguments.
/// - Anything else (including nothing) runs a user command.
pub fn dispatch(args: Vec<String>, project: &mut Project) -> Result<i32> {
    log::debug!("Dispatching args: {:?}", args);

    match route(&args) {
        Route::Raw => handlers::raw::handle(args, project),
        Route::Action(command) => {
            let rest = args.into_iter().skip(1).collect();
            (command.handler)(rest, project)
        }
        Route::UserCommand => handlers::exec::handle(args, project),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_routing() {
        assert!(matches!(route(&args(&[])), Route::UserCommand));
        assert!(matches!(route(&args(&["build"])), Route::UserCommand));
        assert!(matches!(route(&args(&["@ci", "make"])), Route::Raw));
        assert!(matches!(route(&args(&["ls"])), Route::Action(c) if c.name == "list"));
        assert!(matches!(route(&args(&["init", "ci"])), Route::Action(c) if c.name == "init"));
        assert!(matches!(route(&args(&["shell", "@ci"])), Route::Action(c) if c.name == "shell"));
    }
}
