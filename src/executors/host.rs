// src/executors/host.rs

use super::{CommandLine, Executor, ExecutorError, ExecutorKind, Runtime};
use crate::{
    CancellationToken,
    constants::HOST_EXECUTOR_NAME,
    core::console::Console,
    models::{Config, Shell},
    system::process,
};
use std::path::{Path, PathBuf};

/// Runs commands as local processes.
#[derive(Debug)]
pub struct HostExecutor {
    base_dir: PathBuf,
    work_dir_rel: String,
    console: Console,
    cancel: Option<CancellationToken>,
}

impl HostExecutor {
    pub fn new(config: &Config, runtime: &Runtime) -> Self {
        Self::with_dirs(&config.base_dir, &config.work_dir_rel, runtime)
    }

    pub fn with_dirs(base_dir: &Path, work_dir_rel: &str, runtime: &Runtime) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            work_dir_rel: work_dir_rel.to_string(),
            console: runtime.console,
            cancel: runtime.cancel.clone(),
        }
    }

    /// `chdir` is relative to the base directory; without one commands run
    /// where brock was invoked.
    fn cwd(&self, chdir: Option<&str>) -> PathBuf {
        match chdir {
            Some(dir) => self.base_dir.join(dir),
            None if self.work_dir_rel == "." => self.base_dir.clone(),
            None => self.base_dir.join(&self.work_dir_rel),
        }
    }
}

impl Executor for HostExecutor {
    fn name(&self) -> &str {
        HOST_EXECUTOR_NAME
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Host
    }

    fn help(&self) -> Option<&str> {
        Some("Execute command on host computer")
    }

    fn default_shell(&self) -> Option<Shell> {
        if cfg!(target_os = "windows") {
            Some(Shell::Cmd)
        } else {
            Some(Shell::Sh)
        }
    }

    fn exec(&mut self, command: &CommandLine, chdir: Option<&str>) -> Result<i32, ExecutorError> {
        self.console
            .extra_info(&format!("Executing command on host: {}", command));
        let cwd = self.cwd(chdir);
        self.console
            .debug(&format!("Work dir: {}", dunce::simplified(&cwd).display()));

        let code = match command {
            CommandLine::Raw(line) => {
                process::run_line(line, &cwd, &self.console, self.cancel.as_ref())?
            }
            CommandLine::Argv(argv) => {
                process::run_argv(argv, &cwd, &self.console, self.cancel.as_ref())?
            }
        };
        self.console.debug(&format!("Exit code: {}", code));
        Ok(code)
    }

    fn shell(&mut self) -> Result<i32, ExecutorError> {
        Err(ExecutorError::unsupported(self.name(), "shell access"))
    }

    fn sync_in(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn sync_out(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn status(&mut self) -> Result<String, ExecutorError> {
        Ok("Idle".to_string())
    }

    fn start(&mut self) -> Result<i32, ExecutorError> {
        Ok(0)
    }

    fn stop(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn restart(&mut self) -> Result<i32, ExecutorError> {
        Ok(0)
    }

    fn update(&mut self) -> Result<i32, ExecutorError> {
        Ok(0)
    }
}
