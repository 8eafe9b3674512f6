// src/system/docker.rs

//! # Container engine boundary
//!
//! `ContainerEngine` is the narrow set of engine calls the container executor
//! needs. `DockerCli` implements it by shelling out to the `docker` binary and
//! reading `--format` output, so brock works wherever the Docker CLI does
//! (Docker Desktop, a remote `DOCKER_HOST`, rootless setups).

use crate::{
    CancellationToken,
    core::console::Console,
    models::ImageRef,
    system::process::{self, Captured, ProcessError},
};
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command as StdCommand;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Docker engine is not running")]
    Unreachable,
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("{0}")]
    Api(String),
    #[error("Operation was cancelled by the user.")]
    Interrupted,
}

impl From<ProcessError> for EngineError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::CommandFailed(_, io) if io.kind() == ErrorKind::NotFound => {
                Self::Unreachable
            }
            ProcessError::Cancelled => Self::Interrupted,
            other => Self::Api(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Bind,
    Volume,
}

/// A bind mount or named volume attached to a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub kind: MountKind,
    pub source: String,
    pub target: String,
}

impl Mount {
    pub fn bind(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: MountKind::Bind,
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn volume(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: MountKind::Volume,
            source: name.into(),
            target: target.into(),
        }
    }

    fn to_arg(&self) -> String {
        let kind = match self.kind {
            MountKind::Bind => "bind",
            MountKind::Volume => "volume",
        };
        format!("type={},source={},target={}", kind, self.source, self.target)
    }
}

/// Everything needed to start a detached, auto-removed container with stdin open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub name: String,
    pub image: String,
    pub platform: Option<String>,
    pub isolation: Option<String>,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<Mount>,
    pub devices: Vec<String>,
    pub ports: Vec<String>,
    pub mac_address: Option<String>,
    pub entrypoint: Option<String>,
    pub command: Vec<String>,
}

impl RunOptions {
    /// The `docker` argv for this run, without the program name.
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["run", "--detach", "--rm", "--interactive", "--name"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(self.name.clone());

        if let Some(platform) = &self.platform {
            args.extend(["--platform".to_string(), platform.clone()]);
        }
        if let Some(isolation) = &self.isolation {
            args.extend(["--isolation".to_string(), isolation.clone()]);
        }
        for (key, value) in &self.env {
            args.extend(["--env".to_string(), format!("{}={}", key, value)]);
        }
        for mount in &self.mounts {
            args.extend(["--mount".to_string(), mount.to_arg()]);
        }
        for device in &self.devices {
            args.extend(["--device".to_string(), device.clone()]);
        }
        for port in &self.ports {
            args.extend(["--publish".to_string(), port.clone()]);
        }
        if let Some(mac) = &self.mac_address {
            args.extend(["--mac-address".to_string(), mac.clone()]);
        }
        if let Some(entrypoint) = &self.entrypoint {
            args.extend(["--entrypoint".to_string(), entrypoint.clone()]);
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// The engine operations used by container executors.
pub trait ContainerEngine {
    /// Fails with `Unreachable` when no engine answers.
    fn ping(&self) -> Result<(), EngineError>;
    fn host_os_version(&self) -> Result<String, EngineError>;
    fn image_exists(&self, image: &ImageRef) -> Result<bool, EngineError>;
    fn image_os_version(&self, image: &ImageRef) -> Result<String, EngineError>;
    fn pull_image(&self, image: &ImageRef, platform: &str) -> Result<(), EngineError>;
    fn build_image(
        &self,
        context: &Path,
        dockerfile: &Path,
        tag: &ImageRef,
        platform: &str,
    ) -> Result<(), EngineError>;
    fn container_running(&self, name: &str) -> Result<bool, EngineError>;
    fn run_container(&self, options: &RunOptions) -> Result<(), EngineError>;
    fn stop_container(&self, name: &str) -> Result<(), EngineError>;
    /// Runs `argv` inside a running container, streaming its output.
    fn exec(
        &self,
        container: &str,
        argv: &[String],
        workdir: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<i32, EngineError>;
    /// Like `exec`, with a terminal attached.
    fn exec_interactive(
        &self,
        container: &str,
        argv: &[String],
        workdir: &str,
    ) -> Result<i32, EngineError>;
    fn volume_exists(&self, name: &str) -> Result<bool, EngineError>;
    fn create_volume(&self, name: &str) -> Result<(), EngineError>;
}

/// Talks to the engine through the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    console: Console,
}

impl DockerCli {
    /// Streamed output (pull, build, exec) is forwarded to `console`.
    pub fn new(console: Console) -> Self {
        Self {
            program: "docker".to_string(),
            console,
        }
    }

    fn command<S: AsRef<str>>(&self, args: &[S]) -> StdCommand {
        let mut command = StdCommand::new(&self.program);
        command.args(args.iter().map(|arg| <S as AsRef<str>>::as_ref(arg)));
        command
    }

    fn capture<S: AsRef<str>>(&self, args: &[S]) -> Result<Captured, EngineError> {
        Ok(process::capture(&mut self.command(args))?)
    }

    /// Captures and turns a non-zero exit into an error classified from stderr.
    fn checked<S: AsRef<str>>(&self, args: &[S]) -> Result<String, EngineError> {
        let captured = self.capture(args)?;
        if captured.success() {
            Ok(captured.stdout)
        } else {
            Err(classify_failure(&captured.stderr))
        }
    }

    /// Forwards output to the console; used for slow operations like pull and build.
    fn streamed<S: AsRef<str>>(&self, operation: &str, args: &[S]) -> Result<(), EngineError> {
        let code = process::spawn_and_wait(&mut self.command(args), &self.console, None)?;
        if code == 0 {
            Ok(())
        } else {
            Err(EngineError::Api(format!(
                "{} failed with exit code {}",
                operation, code
            )))
        }
    }

    fn exists<S: AsRef<str>>(&self, args: &[S]) -> Result<bool, EngineError> {
        match self.checked(args) {
            Ok(_) => Ok(true),
            Err(EngineError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl ContainerEngine for DockerCli {
    fn ping(&self) -> Result<(), EngineError> {
        self.checked(&["version", "--format", "{{.Server.Version}}"])
            .map(|version| log::debug!("Docker server version: {}", version.trim()))
    }

    fn host_os_version(&self) -> Result<String, EngineError> {
        let info = self.checked(&["info", "--format", "{{json .}}"])?;
        json_string_field(&info, "OSVersion")
    }

    fn image_exists(&self, image: &ImageRef) -> Result<bool, EngineError> {
        self.exists(&[
            "image".to_string(),
            "inspect".to_string(),
            "--format".to_string(),
            "{{.Id}}".to_string(),
            image.to_string(),
        ])
    }

    fn image_os_version(&self, image: &ImageRef) -> Result<String, EngineError> {
        let inspect = self.checked(&[
            "image".to_string(),
            "inspect".to_string(),
            "--format".to_string(),
            "{{json .}}".to_string(),
            image.to_string(),
        ])?;
        json_string_field(&inspect, "OsVersion")
    }

    fn pull_image(&self, image: &ImageRef, platform: &str) -> Result<(), EngineError> {
        let image = image.to_string();
        self.streamed(
            "docker pull",
            &["pull", "--platform", platform, image.as_str()],
        )
    }

    fn build_image(
        &self,
        context: &Path,
        dockerfile: &Path,
        tag: &ImageRef,
        platform: &str,
    ) -> Result<(), EngineError> {
        let context = dunce::simplified(context).to_string_lossy().into_owned();
        let dockerfile = dunce::simplified(dockerfile).to_string_lossy().into_owned();
        let tag = tag.to_string();
        self.streamed(
            "docker build",
            &[
                "build",
                "--platform",
                platform,
                "--tag",
                tag.as_str(),
                "--file",
                dockerfile.as_str(),
                context.as_str(),
            ],
        )
    }

    fn container_running(&self, name: &str) -> Result<bool, EngineError> {
        match self.checked(&["container", "inspect", "--format", "{{.State.Running}}", name]) {
            Ok(state) => Ok(state.trim() == "true"),
            Err(EngineError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn run_container(&self, options: &RunOptions) -> Result<(), EngineError> {
        let id = self.checked(&options.to_args())?;
        log::debug!("Started container {} ({})", options.name, id.trim());
        Ok(())
    }

    fn stop_container(&self, name: &str) -> Result<(), EngineError> {
        self.checked(&["stop", name]).map(|_| ())
    }

    fn exec(
        &self,
        container: &str,
        argv: &[String],
        workdir: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<i32, EngineError> {
        let mut args = vec![
            "exec".to_string(),
            "--workdir".to_string(),
            workdir.to_string(),
            container.to_string(),
        ];
        args.extend(argv.iter().cloned());
        Ok(process::spawn_and_wait(
            &mut self.command(&args),
            &self.console,
            cancel,
        )?)
    }

    fn exec_interactive(
        &self,
        container: &str,
        argv: &[String],
        workdir: &str,
    ) -> Result<i32, EngineError> {
        let mut args = vec![
            "exec".to_string(),
            "--interactive".to_string(),
            "--tty".to_string(),
            "--workdir".to_string(),
            workdir.to_string(),
            container.to_string(),
        ];
        args.extend(argv.iter().cloned());
        Ok(process::run_interactive(&mut self.command(&args))?)
    }

    fn volume_exists(&self, name: &str) -> Result<bool, EngineError> {
        self.exists(&["volume", "inspect", "--format", "{{.Name}}", name])
    }

    fn create_volume(&self, name: &str) -> Result<(), EngineError> {
        self.checked(&["volume", "create", name]).map(|_| ())
    }
}

/// Maps CLI stderr to an engine error.
fn classify_failure(stderr: &str) -> EngineError {
    let message = stderr.trim();
    let lower = message.to_lowercase();
    if lower.contains("cannot connect to the docker daemon")
        || lower.contains("error during connect")
        || lower.contains("is the docker daemon running")
    {
        EngineError::Unreachable
    } else if lower.contains("no such") || lower.contains("not found") {
        EngineError::NotFound {
            what: message.to_string(),
        }
    } else {
        EngineError::Api(message.to_string())
    }
}

fn json_string_field(json: &str, field: &str) -> Result<String, EngineError> {
    let value: serde_json::Value = serde_json::from_str(json.trim())
        .map_err(|e| EngineError::Api(format!("unexpected engine output: {}", e)))?;
    Ok(value
        .get(field)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options_to_args() {
        let options = RunOptions {
            name: "brock-p-ci-abc".into(),
            image: "alpine:3.19".into(),
            platform: Some("linux".into()),
            env: vec![("A".into(), "1".into())],
            mounts: vec![Mount::volume("brock-p-ci-abc-rsync-volume", "/host")],
            devices: vec!["/dev/ttyUSB0".into()],
            ports: vec!["8080:80".into()],
            mac_address: Some("02:42:ac:11:00:02".into()),
            entrypoint: Some(String::new()),
            command: vec!["sh".into()],
            ..Default::default()
        };

        let args = options.to_args();

        assert_eq!(
            args,
            vec![
                "run",
                "--detach",
                "--rm",
                "--interactive",
                "--name",
                "brock-p-ci-abc",
                "--platform",
                "linux",
                "--env",
                "A=1",
                "--mount",
                "type=volume,source=brock-p-ci-abc-rsync-volume,target=/host",
                "--device",
                "/dev/ttyUSB0",
                "--publish",
                "8080:80",
                "--mac-address",
                "02:42:ac:11:00:02",
                "--entrypoint",
                "",
                "alpine:3.19",
                "sh",
            ]
        );
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("Cannot connect to the Docker daemon at unix:///var/run/docker.sock."),
            EngineError::Unreachable
        ));
        assert!(matches!(
            classify_failure("Error: No such container: brock-x"),
            EngineError::NotFound { .. }
        ));
        assert!(matches!(
            classify_failure("conflict: name already in use"),
            EngineError::Api(_)
        ));
    }

    #[test]
    fn test_json_string_field() {
        let json = r#"{"OSVersion":"10.0.20348.2227","Name":"x"}"#;
        assert_eq!(json_string_field(json, "OSVersion").unwrap(), "10.0.20348.2227");
        assert_eq!(json_string_field(json, "Missing").unwrap(), "");
        assert!(json_string_field("not json", "OSVersion").is_err());
    }

    #[test]
    fn test_missing_binary_means_unreachable() {
        let engine = DockerCli {
            program: "definitely-not-a-docker-binary".to_string(),
            console: Console::plain(),
        };
        assert!(matches!(engine.ping(), Err(EngineError::Unreachable)));
    }
}
