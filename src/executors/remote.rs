// src/executors/remote.rs

use super::{CommandLine, Executor, ExecutorError, ExecutorKind, Runtime};
use crate::{
    core::console::Console,
    models::{ExecutorSpec, RemoteSpec, Shell},
    system::ssh::{RemoteShell, Session},
};
use dialoguer::{Input, Password, theme::ColorfulTheme};

/// Asks the user for credentials the config does not carry.
pub trait CredentialPrompt {
    fn username(&self, host: &str) -> Result<String, ExecutorError>;
    /// An empty answer means key-based authentication.
    fn password(&self, host: &str, username: &str) -> Result<String, ExecutorError>;
}

/// Terminal prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialoguerPrompt;

impl CredentialPrompt for DialoguerPrompt {
    fn username(&self, host: &str) -> Result<String, ExecutorError> {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Enter username for {}", host))
            .interact_text()
            .map_err(|e| ExecutorError::Prompt(e.to_string()))
    }

    fn password(&self, host: &str, username: &str) -> Result<String, ExecutorError> {
        Password::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Enter password for {}@{}", username, host))
            .allow_empty_password(true)
            .interact()
            .map_err(|e| ExecutorError::Prompt(e.to_string()))
    }
}

/// Runs each command over a fresh ssh connection.
pub struct RemoteShellExecutor {
    name: String,
    help: Option<String>,
    host: String,
    username: Option<String>,
    /// `Some("")` after an empty prompt answer: key auth, don't ask again.
    password: Option<String>,
    console: Console,
    client: Box<dyn RemoteShell>,
    prompt: Box<dyn CredentialPrompt>,
}

impl RemoteShellExecutor {
    pub fn new(
        spec: &ExecutorSpec,
        remote: &RemoteSpec,
        runtime: &Runtime,
        client: Box<dyn RemoteShell>,
        prompt: Box<dyn CredentialPrompt>,
    ) -> Self {
        Self {
            name: spec.name.clone(),
            help: spec.help.clone(),
            host: remote.host.clone(),
            username: remote.username.clone(),
            password: remote.password.clone(),
            console: runtime.console,
            client,
            prompt,
        }
    }

    /// Prompts once per missing value and keeps the answers for the rest of the run.
    fn session(&mut self) -> Result<Session, ExecutorError> {
        let username = match &self.username {
            Some(username) => username.clone(),
            None => {
                let username = self.prompt.username(&self.host)?;
                self.username = Some(username.clone());
                username
            }
        };
        let password = match &self.password {
            Some(password) => password.clone(),
            None => {
                let password = self.prompt.password(&self.host, &username)?;
                self.password = Some(password.clone());
                password
            }
        };
        let password = if password.is_empty() {
            None
        } else {
            Some(password)
        };
        Ok(Session::new(&self.host, username, password))
    }
}

/// `cd <dir>; <line>` with the directory quoted for a POSIX shell.
fn remote_line(command: &CommandLine, chdir: Option<&str>) -> String {
    let line = command.to_line();
    match chdir {
        Some(dir) => {
            let dir = shlex::try_quote(dir)
                .map(|quoted| quoted.into_owned())
                .unwrap_or_else(|_| dir.to_string());
            format!("cd {}; {}", dir, line)
        }
        None => line,
    }
}

impl Executor for RemoteShellExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Remote
    }

    fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    fn default_shell(&self) -> Option<Shell> {
        Some(Shell::Sh)
    }

    fn exec(&mut self, command: &CommandLine, chdir: Option<&str>) -> Result<i32, ExecutorError> {
        self.console.extra_info(&format!(
            "Executing command on SSH host {}: {}",
            self.host, command
        ));
        if let Some(dir) = chdir {
            self.console.debug(&format!("Work dir: {}", dir));
        }

        let session = self.session()?;
        let output = self.client.run(&session, &remote_line(command, chdir))?;

        for line in output.stdout.lines() {
            self.console.stdout(line);
        }
        for line in output.stderr.lines() {
            self.console.stderr(line);
        }
        self.console.debug(&format!("Exit code: {}", output.status));
        Ok(output.status)
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
