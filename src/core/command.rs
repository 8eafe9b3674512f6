// src/core/command.rs

//! User defined commands and their steps.
//!
//! A `Command` never holds a handle to the orchestrator. Everything it needs
//! at run time (running another command, running a step on an executor,
//! asking an executor for its shell) goes through the `CommandContext` it is
//! handed in `exec`.

use crate::{
    core::config_resolver::ConfigError,
    error::BrockError,
    executors::CommandLine,
    models::{CommandOption, CommandSpec, Shell, StepSpec},
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // `@executor rest`, a bare `@executor`, or just `rest`.
    static ref STEP_LINE_RE: Regex = Regex::new(r"(?s)^(?:@([\w-]+)(?:\s+|$))?(.*)$").unwrap();
}

/// What a command needs from whoever runs it.
pub trait CommandContext {
    /// Runs another command by name.
    fn exec_command(&mut self, name: &str) -> Result<i32, BrockError>;
    /// Runs one command line on an executor (`None` = the default executor).
    fn exec_raw(
        &mut self,
        command: &CommandLine,
        executor: Option<&str>,
        chdir: Option<&str>,
    ) -> Result<i32, BrockError>;
    /// The default shell of an executor (`None` = the default executor).
    fn executor_shell(&self, executor: Option<&str>) -> Result<Option<Shell>, BrockError>;
}

#[derive(Debug, Clone, PartialEq)]
enum StepBody {
    Line(String),
    Script { shell: Option<Shell>, script: String },
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    executor: Option<String>,
    body: StepBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    help: Option<String>,
    steps: Vec<Step>,
    depends_on: Vec<String>,
    chdir: Option<String>,
    default_executor: Option<String>,
    options: Vec<CommandOption>,
}

/// Splits `"@ci make test"` into `(Some("ci"), "make test")`.
pub fn parse_step_line(line: &str) -> (Option<&str>, &str) {
    match STEP_LINE_RE.captures(line) {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str()),
            caps.get(2).map_or(line, |m| m.as_str()),
        ),
        None => (None, line),
    }
}

impl Command {
    pub fn from_spec(spec: &CommandSpec) -> Self {
        let steps = spec
            .steps
            .iter()
            .map(|step| match step {
                StepSpec::Line(line) => {
                    let (executor, rest) = parse_step_line(line);
                    Step {
                        executor: executor.map(str::to_string),
                        body: StepBody::Line(rest.to_string()),
                    }
                }
                StepSpec::Script {
                    executor,
                    shell,
                    script,
                } => Step {
                    executor: executor.clone(),
                    body: StepBody::Script {
                        shell: *shell,
                        script: script.clone(),
                    },
                },
            })
            .collect();

        Self {
            name: spec.name.clone(),
            help: spec.help.clone(),
            steps,
            depends_on: spec.depends_on.clone(),
            chdir: spec.chdir.clone(),
            default_executor: spec.default_executor.clone(),
            options: spec.options.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// The executor steps run on when they do not name one.
    pub fn default_executor(&self) -> Option<&str> {
        self.default_executor.as_deref()
    }

    pub fn options(&self) -> &[CommandOption] {
        &self.options
    }

    /// Runs dependencies, then steps, stopping at the first non-zero exit code.
    ///
    /// Returns the code of the last thing that ran (0 for a command with nothing to do).
    pub fn exec(&self, ctx: &mut dyn CommandContext) -> Result<i32, BrockError> {
        for dependency in &self.depends_on {
            let code = ctx.exec_command(dependency)?;
            if code != 0 {
                return Ok(code);
            }
        }

        let mut code = 0;
        for step in &self.steps {
            let executor = step
                .executor
                .as_deref()
                .or(self.default_executor.as_deref());

            let command = match &step.body {
                StepBody::Line(line) => CommandLine::Raw(line.clone()),
                StepBody::Script { shell, script } => {
                    let shell = match shell {
                        Some(shell) => *shell,
                        None => ctx.executor_shell(executor)?.ok_or_else(|| {
                            ConfigError::ShellNotSpecified(
                                executor.unwrap_or("<default>").to_string(),
                            )
                        })?,
                    };
                    CommandLine::Argv(shell.wrap(script))
                }
            };

            code = ctx.exec_raw(&command, executor, self.chdir.as_deref())?;
            if code != 0 {
                return Ok(code);
            }
        }
        Ok(code)
    }
}
