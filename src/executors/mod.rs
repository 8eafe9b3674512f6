// src/executors/mod.rs

//! # Executors
//!
//! An executor is a place where a command can run: the local machine, a
//! container managed through the engine, or a remote host over ssh. The
//! orchestrator only talks to them through the `Executor` trait.
//!
//! Lifecycle operations (`status`, `start`, `stop`, `restart`, `update`) have
//! default bodies that fail with `Unsupported`; each variant states explicitly
//! which of them it handles, even when handling means doing nothing.

pub mod container;
pub mod host;
pub mod remote;
pub mod rsync;

use crate::{
    CancellationToken,
    core::{config_resolver::ConfigError, console::Console},
    models::{BackendSpec, Config, ExecutorSpec, Shell},
    system::{
        docker::{DockerCli, EngineError},
        process::{self, ProcessError},
        ssh::{OpenSshClient, RemoteError},
    },
};
use std::fmt;
use thiserror::Error;

pub use container::ContainerExecutor;
pub use host::HostExecutor;
pub use remote::{DialoguerPrompt, RemoteShellExecutor};

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Docker engine is not running")]
    EngineNotRunning,
    #[error("Failed to {operation}: {source}")]
    Engine {
        operation: String,
        #[source]
        source: EngineError,
    },
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Process(ProcessError),
    #[error("Executor '{executor}' doesn't support {operation}")]
    Unsupported {
        executor: String,
        operation: &'static str,
    },
    #[error("Failed to read credentials: {0}")]
    Prompt(String),
    #[error("Failed to rsync data {direction} executor '{executor}' (exit code {code})")]
    SyncFailed {
        executor: String,
        direction: &'static str,
        code: i32,
    },
    #[error("Execution interrupted")]
    Interrupted,
}

impl ExecutorError {
    /// Wraps an engine failure with the operation that caused it.
    pub fn engine(operation: impl Into<String>, source: EngineError) -> Self {
        match source {
            EngineError::Unreachable => Self::EngineNotRunning,
            EngineError::Interrupted => Self::Interrupted,
            source => Self::Engine {
                operation: operation.into(),
                source,
            },
        }
    }

    pub fn unsupported(executor: &str, operation: &'static str) -> Self {
        Self::Unsupported {
            executor: executor.to_string(),
            operation,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl From<ProcessError> for ExecutorError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::Cancelled => Self::Interrupted,
            other => Self::Process(other),
        }
    }
}

/// A command as handed to an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// A line as the user wrote it; executors split it themselves.
    Raw(String),
    /// A ready argv, e.g. a wrapped script step.
    Argv(Vec<String>),
}

impl CommandLine {
    /// Splits a raw line with POSIX quoting rules.
    pub fn to_argv(&self) -> Result<Vec<String>, ProcessError> {
        match self {
            Self::Raw(line) => process::split_command_line(line),
            Self::Argv(argv) if argv.is_empty() => Err(ProcessError::EmptyCommand),
            Self::Argv(argv) => Ok(argv.clone()),
        }
    }

    /// A single line for shells on the other end; argv items holding
    /// whitespace, quotes or backslashes are double-quoted and escaped.
    pub fn to_line(&self) -> String {
        match self {
            Self::Raw(line) => line.clone(),
            Self::Argv(argv) => argv
                .iter()
                .map(|arg| quote_arg(arg))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if !arg.chars().any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\')) {
        return arg.to_string();
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// What kind of backend an executor drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Host,
    Container,
    Remote,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Host => "host",
            Self::Container => "docker",
            Self::Remote => "ssh",
        })
    }
}

/// Process-wide collaborators every executor receives at construction.
#[derive(Debug, Clone, Default)]
pub struct Runtime {
    pub console: Console,
    /// Set by the Ctrl+C handler.
    pub cancel: Option<CancellationToken>,
}

impl Runtime {
    pub fn new(console: Console, cancel: CancellationToken) -> Self {
        Self {
            console,
            cancel: Some(cancel),
        }
    }
}

pub trait Executor {
    fn name(&self) -> &str;
    fn kind(&self) -> ExecutorKind;
    fn help(&self) -> Option<&str>;
    /// Dialect used for script steps that do not name one.
    fn default_shell(&self) -> Option<Shell>;

    /// Runs `command`, in `chdir` relative to the base directory when given.
    /// A non-zero exit code is a result, not an error.
    fn exec(&mut self, command: &CommandLine, chdir: Option<&str>) -> Result<i32, ExecutorError>;

    /// Opens an interactive session.
    fn shell(&mut self) -> Result<i32, ExecutorError>;

    /// Makes the execution environment mirror the host workspace.
    fn sync_in(&mut self) -> Result<(), ExecutorError>;

    /// Copies changes made in the execution environment back to the host.
    fn sync_out(&mut self) -> Result<(), ExecutorError>;

    fn status(&mut self) -> Result<String, ExecutorError> {
        Err(ExecutorError::unsupported(self.name(), "status"))
    }

    fn start(&mut self) -> Result<i32, ExecutorError> {
        Err(ExecutorError::unsupported(self.name(), "start"))
    }

    fn stop(&mut self) -> Result<(), ExecutorError> {
        Err(ExecutorError::unsupported(self.name(), "stop"))
    }

    fn restart(&mut self) -> Result<i32, ExecutorError> {
        Err(ExecutorError::unsupported(self.name(), "restart"))
    }

    fn update(&mut self) -> Result<i32, ExecutorError> {
        Err(ExecutorError::unsupported(self.name(), "update"))
    }

    /// Called once when brock exits, on every path.
    fn on_exit(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }
}

/// Builds the executor a config entry describes, wired to the real engine and ssh client.
pub fn build_executor(
    spec: &ExecutorSpec,
    config: &Config,
    runtime: &Runtime,
) -> Result<Box<dyn Executor>, ConfigError> {
    log::debug!("Building executor '{}'", spec.name);
    match &spec.backend {
        BackendSpec::Container(container) => Ok(Box::new(ContainerExecutor::new(
            spec,
            container,
            config,
            runtime,
            Box::new(DockerCli::new(runtime.console)),
        )?)),
        BackendSpec::Remote(remote) => Ok(Box::new(RemoteShellExecutor::new(
            spec,
            remote,
            runtime,
            Box::new(OpenSshClient::new()),
            Box::new(DialoguerPrompt),
        ))),
    }
}
