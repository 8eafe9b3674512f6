// src/system/ssh.rs

//! Remote command execution through the OpenSSH client.
//!
//! Every call opens a fresh connection; there is no session pooling. A
//! configured password is handed to `sshpass` through its environment
//! variable so it never appears in the process list.

use crate::system::process::{self, ProcessError};
use std::io::ErrorKind;
use std::process::Command as StdCommand;
use thiserror::Error;

/// Exit status OpenSSH reserves for its own failures.
const SSH_CONNECTION_FAILURE: i32 = 255;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Failed to connect to '{host}': {message}")]
    Connection { host: String, message: String },
    #[error("Failed to run command: {0}")]
    Command(String),
}

/// Where and as whom to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: Option<String>,
}

impl Session {
    /// Builds a session from a `host[:port]` string.
    pub fn new(host: &str, username: impl Into<String>, password: Option<String>) -> Self {
        let (host, port) = split_host_port(host);
        Self {
            host,
            port,
            username: username.into(),
            password,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

/// Runs one command line on a remote host and reports what it printed.
pub trait RemoteShell {
    fn run(&self, session: &Session, line: &str) -> Result<RemoteOutput, RemoteError>;
}

/// `RemoteShell` backed by the `ssh` (and, with a password, `sshpass`) binaries.
#[derive(Debug, Clone)]
pub struct OpenSshClient {
    ssh: String,
    sshpass: String,
}

impl Default for OpenSshClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenSshClient {
    pub fn new() -> Self {
        Self {
            ssh: "ssh".to_string(),
            sshpass: "sshpass".to_string(),
        }
    }

    fn build_command(&self, session: &Session, line: &str) -> StdCommand {
        let ssh_args = ssh_args(session, line);
        match &session.password {
            Some(password) => {
                let mut command = StdCommand::new(&self.sshpass);
                command
                    .arg("-e")
                    .arg(&self.ssh)
                    .args(&ssh_args)
                    .env("SSHPASS", password);
                command
            }
            None => {
                let mut command = StdCommand::new(&self.ssh);
                command.args(&ssh_args);
                command
            }
        }
    }
}

impl RemoteShell for OpenSshClient {
    fn run(&self, session: &Session, line: &str) -> Result<RemoteOutput, RemoteError> {
        log::debug!("ssh {}@{}: {}", session.username, session.host, line);

        let captured = process::capture(&mut self.build_command(session, line)).map_err(|e| {
            match e {
                ProcessError::CommandFailed(program, io) if io.kind() == ErrorKind::NotFound => {
                    RemoteError::Command(format!("'{}' is not installed", program))
                }
                other => RemoteError::Command(other.to_string()),
            }
        })?;

        if captured.code == SSH_CONNECTION_FAILURE {
            return Err(RemoteError::Connection {
                host: session.host.clone(),
                message: captured.stderr.trim().to_string(),
            });
        }

        Ok(RemoteOutput {
            stdout: captured.stdout,
            stderr: captured.stderr,
            status: captured.code,
        })
    }
}

/// Arguments for `ssh`, without the program name.
fn ssh_args(session: &Session, line: &str) -> Vec<String> {
    let mut args = vec!["-T".to_string()];
    if session.password.is_none() {
        args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
    }
    if let Some(port) = session.port {
        args.extend(["-p".to_string(), port.to_string()]);
    }
    args.push("--".to_string());
    args.push(format!("{}@{}", session.username, session.host));
    args.push(line.to_string());
    args
}

/// `build.local:2222` → (`build.local`, 2222). Bare IPv6 addresses keep their colons.
fn split_host_port(host: &str) -> (String, Option<u16>) {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') => match port.parse::<u16>() {
            Ok(port) => (name.to_string(), Some(port)),
            Err(_) => (host.to_string(), None),
        },
        _ => (host.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("build.local"), ("build.local".to_string(), None));
        assert_eq!(
            split_host_port("build.local:2222"),
            ("build.local".to_string(), Some(2222))
        );
        assert_eq!(split_host_port("fe80::1"), ("fe80::1".to_string(), None));
    }

    #[test]
    fn test_ssh_args_with_port_and_key_auth() {
        let session = Session::new("10.0.0.5:2200", "ci", None);
        assert_eq!(
            ssh_args(&session, "cd src; make"),
            vec!["-T", "-o", "BatchMode=yes", "-p", "2200", "--", "ci@10.0.0.5", "cd src; make"]
        );
    }

    #[test]
    fn test_password_goes_through_sshpass_env() {
        let client = OpenSshClient::new();
        let session = Session::new("h", "u", Some("secret".to_string()));

        let command = client.build_command(&session, "ls");

        assert_eq!(command.get_program(), "sshpass");
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["-e", "ssh", "-T", "--", "u@h", "ls"]);
        assert!(!args.iter().any(|a| a.contains("secret")));
        let envs: Vec<_> = command.get_envs().collect();
        assert!(envs.iter().any(|(k, v)| k.to_str() == Some("SSHPASS") && v.is_some()));
    }
}
