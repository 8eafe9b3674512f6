// src/core/project.rs

//! # Project
//!
//! The orchestrator of one invocation. It owns every executor and command the
//! configuration declares and decides:
//!
//! - which executor and command are the defaults,
//! - which executor a step runs on,
//! - when the workspace has to be synced. Moving from one executor to another
//!   flushes the previous one (`sync_out`) and refreshes the next (`sync_in`);
//!   consecutive steps on the same executor cause no sync traffic.

use crate::{
    core::{
        command::{Command, CommandContext},
        config_resolver::ConfigError,
        console::Console,
    },
    error::BrockError,
    executors::{self, CommandLine, Executor, ExecutorError, ExecutorKind, HostExecutor, Runtime},
    models::{Config, Shell},
};

pub struct Project {
    name: String,
    help: Option<String>,
    /// The host executor is always first.
    executors: Vec<Box<dyn Executor>>,
    commands: Vec<Command>,
    default_executor: Option<String>,
    default_command: Option<String>,
    /// Last executor that received a `sync_in`.
    previous_executor: Option<String>,
    /// Commands currently being executed, outermost first.
    active: Vec<String>,
    console: Console,
}

impl Project {
    /// Builds the project with real executors for every declared backend.
    pub fn from_config(config: &Config, runtime: &Runtime) -> Result<Self, ConfigError> {
        let executors = config
            .executors
            .iter()
            .map(|spec| executors::build_executor(spec, config, runtime))
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_executors(config, runtime, executors)
    }

    /// Builds the project around already constructed executors. A host
    /// executor is added in front of them.
    pub fn with_executors(
        config: &Config,
        runtime: &Runtime,
        declared: Vec<Box<dyn Executor>>,
    ) -> Result<Self, ConfigError> {
        let mut executors: Vec<Box<dyn Executor>> = Vec::with_capacity(declared.len() + 1);
        executors.push(Box::new(HostExecutor::new(config, runtime)));
        executors.extend(declared);

        let default_executor = match &config.default_executor {
            Some(name) => {
                if !executors.iter().any(|e| e.name() == name) {
                    return Err(ConfigError::UnknownExecutor(name.clone()));
                }
                Some(name.clone())
            }
            // Host plus exactly one declared executor: that one. Only host: host.
            None => match executors.as_slice() {
                [host] => Some(host.name().to_string()),
                [_, only] => Some(only.name().to_string()),
                _ => None,
            },
        };

        let commands: Vec<Command> = config.commands.iter().map(Command::from_spec).collect();
        for command in &commands {
            if let Some(name) = command.default_executor() {
                if !executors.iter().any(|e| e.name() == name) {
                    return Err(ConfigError::UnknownExecutor(name.to_string()));
                }
            }
        }
        if let Some(name) = &config.default_command {
            if !commands.iter().any(|c| c.name() == name) {
                return Err(ConfigError::UnknownCommand(name.clone()));
            }
        }

        log::debug!(
            "Project '{}': {} executor(s), {} command(s), default executor {:?}",
            config.project,
            executors.len(),
            commands.len(),
            default_executor
        );

        Ok(Self {
            name: config.project.clone(),
            help: config.help.clone(),
            executors,
            commands,
            default_executor,
            default_command: config.default_command.clone(),
            previous_executor: None,
            active: Vec::new(),
            console: runtime.console,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn default_command(&self) -> Option<&str> {
        self.default_command.as_deref()
    }

    pub fn default_executor(&self) -> Option<&str> {
        self.default_executor.as_deref()
    }

    /// Every command in declaration order.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// `(name, kind, help)` of every executor, host first.
    pub fn executors(&self) -> impl Iterator<Item = (&str, ExecutorKind, Option<&str>)> {
        self.executors.iter().map(|e| (e.name(), e.kind(), e.help()))
    }

    fn executor(&self, name: Option<&str>) -> Result<&dyn Executor, ConfigError> {
        let name = match name {
            Some(name) => name,
            None => self
                .default_executor
                .as_deref()
                .ok_or(ConfigError::NoDefaultExecutor)?,
        };
        self.executors
            .iter()
            .find(|e| e.name() == name)
            .map(|e| &**e)
            .ok_or_else(|| ConfigError::UnknownExecutor(name.to_string()))
    }

    fn executor_mut(&mut self, name: Option<&str>) -> Result<&mut Box<dyn Executor>, ConfigError> {
        let name = name
            .map(str::to_string)
            .or_else(|| self.default_executor.clone())
            .ok_or(ConfigError::NoDefaultExecutor)?;
        self.executors
            .iter_mut()
            .find(|e| e.name() == name)
            .ok_or(ConfigError::UnknownExecutor(name))
    }

    /// The executors a lifecycle action applies to: the named one or all of them.
    fn targets(&self, name: Option<&str>) -> Result<Vec<String>, ConfigError> {
        match name {
            Some(name) => Ok(vec![self.executor(Some(name))?.name().to_string()]),
            None => Ok(self.executors.iter().map(|e| e.name().to_string()).collect()),
        }
    }

    /// Runs a user command, or the default one when `name` is `None`.
    pub fn exec(&mut self, name: Option<&str>) -> Result<i32, BrockError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self
                .default_command
                .clone()
                .ok_or_else(|| BrockError::usage("No default command defined"))?,
        };

        if self.active.contains(&name) {
            let mut chain = self.active.clone();
            chain.push(name);
            return Err(ConfigError::DependencyCycle(chain.join(" -> ")).into());
        }

        let command = self
            .commands
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownCommand(name.clone()))?;

        self.console.extra_info(&format!("Running command '{}'", name));
        self.active.push(name);
        let result = command.exec(self);
        self.active.pop();
        result
    }

    /// Runs one command line on an executor, syncing the workspace when the
    /// executor differs from the one that ran last.
    pub fn exec_raw(
        &mut self,
        command: &CommandLine,
        executor: Option<&str>,
        chdir: Option<&str>,
    ) -> Result<i32, BrockError> {
        let name = self.executor(executor)?.name().to_string();

        if self.previous_executor.as_deref() != Some(name.as_str()) {
            if let Some(previous) = self.previous_executor.take() {
                log::debug!("Switching executor '{}' -> '{}'", previous, name);
                self.executor_mut(Some(previous.as_str()))?.sync_out()?;
            }
            self.executor_mut(Some(name.as_str()))?.sync_in()?;
            self.previous_executor = Some(name.clone());
        }

        Ok(self.executor_mut(Some(name.as_str()))?.exec(command, chdir)?)
    }

    /// Opens an interactive session on an executor.
    pub fn shell(&mut self, executor: Option<&str>) -> Result<i32, BrockError> {
        Ok(self.executor_mut(executor)?.shell()?)
    }

    /// `(name, status)` of every executor except the host.
    pub fn status(&mut self) -> Result<Vec<(String, String)>, BrockError> {
        let mut report = Vec::new();
        for executor in self.executors.iter_mut() {
            if executor.kind() == ExecutorKind::Host {
                continue;
            }
            let status = executor.status()?;
            report.push((executor.name().to_string(), status));
        }
        Ok(report)
    }

    pub fn start(&mut self, executor: Option<&str>) -> Result<i32, BrockError> {
        self.fan_out(executor, |e| e.start())
    }

    pub fn stop(&mut self, executor: Option<&str>) -> Result<i32, BrockError> {
        self.fan_out(executor, |e| e.stop().map(|_| 0))
    }

    pub fn restart(&mut self, executor: Option<&str>) -> Result<i32, BrockError> {
        self.fan_out(executor, |e| e.restart())
    }

    /// Pulls or rebuilds images.
    pub fn update(&mut self, executor: Option<&str>) -> Result<i32, BrockError> {
        self.fan_out(executor, |e| e.update())
    }

    /// Applies `action` to the targets in order; the first non-zero code wins.
    fn fan_out<F>(&mut self, executor: Option<&str>, mut action: F) -> Result<i32, BrockError>
    where
        F: FnMut(&mut dyn Executor) -> Result<i32, ExecutorError>,
    {
        for name in self.targets(executor)? {
            let executor = self.executor_mut(Some(name.as_str()))?;
            let code = action(&mut **executor)?;
            if code != 0 {
                return Ok(code);
            }
        }
        Ok(0)
    }

    /// Gives every executor its exit hook. All hooks run; the first failure is returned.
    pub fn on_exit(&mut self) -> Result<(), BrockError> {
        let mut first_error = None;
        for executor in self.executors.iter_mut() {
            if let Err(e) = executor.on_exit() {
                log::warn!("Exit hook of executor '{}' failed: {}", executor.name(), e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl CommandContext for Project {
    fn exec_command(&mut self, name: &str) -> Result<i32, BrockError> {
        self.exec(Some(name))
    }

    fn exec_raw(
        &mut self,
        command: &CommandLine,
        executor: Option<&str>,
        chdir: Option<&str>,
    ) -> Result<i32, BrockError> {
        Project::exec_raw(self, command, executor, chdir)
    }

    fn executor_shell(&self, executor: Option<&str>) -> Result<Option<Shell>, BrockError> {
        Ok(self.executor(executor)?.default_shell())
    }
}
