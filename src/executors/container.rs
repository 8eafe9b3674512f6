// src/executors/container.rs

//! # Container executor
//!
//! Runs commands inside a long-lived container that brock starts on first use
//! and keeps running between invocations.
//!
//! ## Workspace access
//!
//! Without `sync`, the base directory is bind-mounted at `/host` (`C:/host` on
//! Windows containers). With `sync: {type: rsync}`, the container instead gets
//! a named volume, and a small rsync sidecar that sees both the volume and the
//! host directory copies data between them:
//!
//! - **inbound** (host → volume) before the first command of a session, and
//!   again whenever the workspace may have changed on the host side;
//! - **outbound** (volume → host, invocation subtree only) when another
//!   executor takes over and when brock exits.
//!
//! `SyncState` tracks which direction is due so no transfer runs twice.

use super::{CommandLine, Executor, ExecutorError, ExecutorKind, Runtime, rsync};
use crate::{
    CancellationToken,
    constants::{
        CONTAINER_NAME_PREFIX, DEFAULT_IMAGE_TAG, HOST_MOUNT_PATH, RSYNC_IMAGE_NAME,
        RSYNC_IMAGE_TAG, RSYNC_PLATFORM, RSYNC_VOLUME_PATH,
    },
    core::{config_resolver::ConfigError, console::Console},
    models::{Config, ContainerSpec, ExecutorSpec, ImageRef, ImageSource, RsyncSpec, Shell, SyncSpec},
    system::docker::{ContainerEngine, EngineError, Mount, RunOptions},
};
use std::path::{Path, PathBuf};
use std::time::Duration;

const HASH_TRUNCATE_LENGTH: usize = 16;
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Which sync direction is due next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// The volume may be older than the host workspace.
    NeedsSyncIn,
    /// The volume mirrors the host; container-side changes are not yet copied back.
    Mirrored,
}

struct RsyncSidecar {
    container: String,
    volume: String,
    spec: RsyncSpec,
}

pub struct ContainerExecutor {
    name: String,
    help: Option<String>,
    console: Console,
    cancel: Option<CancellationToken>,
    engine: Box<dyn ContainerEngine>,

    container: String,
    image: ImageRef,
    dockerfile: Option<PathBuf>,
    base_dir: PathBuf,
    platform: String,
    mount_dir: String,
    work_dir_rel: String,
    work_dir: String,

    env: Vec<(String, String)>,
    ports: Vec<String>,
    mac_address: Option<String>,
    devices: Vec<String>,
    prepare: Vec<String>,
    default_shell: Shell,

    sidecar: Option<RsyncSidecar>,
    sync_state: SyncState,
    restart_delay: Duration,
}

/// `brock-<project>-<executor>-<hash of base dir>`; stable across invocations.
pub fn container_name(project: &str, executor: &str, base_dir: &Path) -> String {
    let hash = blake3::hash(base_dir.to_string_lossy().as_bytes());
    let digest: Vec<u8> = hash
        .as_bytes()
        .iter()
        .take(HASH_TRUNCATE_LENGTH)
        .copied()
        .collect();
    format!(
        "{}-{}-{}-{}",
        CONTAINER_NAME_PREFIX,
        sanitize(project),
        sanitize(executor),
        hex::encode(digest)
    )
}

/// Engine names allow `[a-zA-Z0-9_.-]`.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Windows containers share the host kernel only when the OS builds match.
///
/// Compares the first three components (`major.minor.build`) of both versions.
pub fn select_isolation(image_os_version: &str, host_os_version: &str) -> &'static str {
    let build = |version: &str| version.split('.').take(3).collect::<Vec<_>>().join(".");
    if build(image_os_version) == build(host_os_version) {
        "process"
    } else {
        "hyperv"
    }
}

impl ContainerExecutor {
    pub fn new(
        spec: &ExecutorSpec,
        container: &ContainerSpec,
        config: &Config,
        runtime: &Runtime,
        engine: Box<dyn ContainerEngine>,
    ) -> Result<Self, ConfigError> {
        let name = container_name(&config.project, &spec.name, &config.base_dir);

        let (image, dockerfile) = match &container.source {
            ImageSource::Image(image) => (image.clone(), None),
            ImageSource::Dockerfile(path) => (
                ImageRef::new(name.to_lowercase(), DEFAULT_IMAGE_TAG),
                Some(config.base_dir.join(path)),
            ),
        };

        let sidecar = match &container.sync {
            None => None,
            Some(SyncSpec::Rsync(spec)) => Some(RsyncSidecar {
                container: format!("{}-rsync", name),
                volume: format!("{}-rsync-volume", name),
                spec: spec.clone(),
            }),
            Some(SyncSpec::Mutagen) => {
                return Err(ConfigError::UnsupportedSync {
                    executor: spec.name.clone(),
                    kind: "mutagen".to_string(),
                });
            }
        };

        let mount_dir = if container.is_windows() {
            format!("C:{}", HOST_MOUNT_PATH)
        } else {
            HOST_MOUNT_PATH.to_string()
        };
        let work_dir_rel = config.work_dir_rel.replace('\\', "/");
        let work_dir = if work_dir_rel == "." {
            mount_dir.clone()
        } else {
            format!("{}/{}", mount_dir, work_dir_rel)
        };

        Ok(Self {
            name: spec.name.clone(),
            help: spec.help.clone(),
            console: runtime.console,
            cancel: runtime.cancel.clone(),
            engine,
            container: name,
            image,
            dockerfile,
            base_dir: config.base_dir.clone(),
            platform: container.platform.clone(),
            mount_dir,
            work_dir_rel,
            work_dir,
            env: container
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ports: container.ports.iter().map(|p| p.to_publish_arg()).collect(),
            mac_address: container.mac_address.clone(),
            devices: container.devices.clone(),
            prepare: container.prepare.clone(),
            default_shell: container
                .default_shell
                .unwrap_or_else(|| Shell::for_platform(&container.platform)),
            sidecar,
            sync_state: SyncState::NeedsSyncIn,
            restart_delay: RESTART_DELAY,
        })
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn container_name(&self) -> &str {
        &self.container
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    fn is_windows(&self) -> bool {
        self.platform.eq_ignore_ascii_case("windows")
    }

    // --- Engine helpers ---

    fn container_running(&self, name: &str) -> Result<bool, ExecutorError> {
        self.engine
            .container_running(name)
            .map_err(|e| ExecutorError::engine(format!("get container info of '{}'", name), e))
    }

    /// Both the main container and, with sync, its sidecar are up.
    fn is_running(&self) -> Result<bool, ExecutorError> {
        if !self.container_running(&self.container)? {
            return Ok(false);
        }
        match &self.sidecar {
            Some(sidecar) => self.container_running(&sidecar.container),
            None => Ok(true),
        }
    }

    fn run_if_stopped(&self, options: &RunOptions) -> Result<(), ExecutorError> {
        self.console
            .info(&format!("Starting container {}", options.name));
        if self.container_running(&options.name)? {
            self.console.warning("Container is already running");
            return Ok(());
        }
        self.engine.run_container(options).map_err(|e| match e {
            EngineError::NotFound { .. } => ExecutorError::engine(
                format!(
                    "start container: image {} not found, try running brock init first",
                    options.image
                ),
                e,
            ),
            e => ExecutorError::engine("start container", e),
        })
    }

    fn stop_one(&self, name: &str) -> Result<(), ExecutorError> {
        if !self.container_running(name)? {
            self.console
                .warning(&format!("Container {} is not running", name));
            return Ok(());
        }
        self.console.info(&format!("Stopping container {}", name));
        match self.engine.stop_container(name) {
            Ok(()) => Ok(()),
            Err(EngineError::NotFound { .. }) => {
                self.console.warning("Container not running");
                Ok(())
            }
            Err(e) => Err(ExecutorError::engine("stop container", e)),
        }
    }

    fn exec_in(
        &self,
        container: &str,
        argv: &[String],
        workdir: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<i32, ExecutorError> {
        self.console.extra_info(&format!(
            "Executing command in container {}: {}",
            container,
            argv.join(" ")
        ));
        self.console.debug(&format!("Work dir: {}", workdir));
        let code = self
            .engine
            .exec(container, argv, workdir, cancel)
            .map_err(|e| ExecutorError::engine("execute command", e))?;
        self.console.debug(&format!("Exit code: {}", code));
        Ok(code)
    }

    /// Builds from the dockerfile or pulls the image.
    fn fetch_image(&self) -> Result<(), ExecutorError> {
        match &self.dockerfile {
            Some(dockerfile) => {
                self.console.info(&format!(
                    "Building Docker image from {}",
                    dunce::simplified(dockerfile).display()
                ));
                let context = dockerfile.parent().unwrap_or(self.base_dir.as_path());
                self.engine
                    .build_image(context, dockerfile, &self.image, &self.platform)
                    .map_err(|e| ExecutorError::engine("build image", e))
            }
            None => {
                self.console.info(&format!("Pulling image {}", self.image));
                self.engine
                    .pull_image(&self.image, &self.platform)
                    .map_err(|e| ExecutorError::engine("pull image", e))
            }
        }
    }

    fn isolation(&self) -> Result<Option<String>, ExecutorError> {
        if !self.is_windows() {
            return Ok(None);
        }
        let image_os = self
            .engine
            .image_os_version(&self.image)
            .map_err(|e| ExecutorError::engine("inspect image", e))?;
        let host_os = self
            .engine
            .host_os_version()
            .map_err(|e| ExecutorError::engine("get engine info", e))?;
        let isolation = select_isolation(&image_os, &host_os);
        log::debug!(
            "Image OS {} / host OS {} -> {} isolation",
            image_os,
            host_os,
            isolation
        );
        Ok(Some(isolation.to_string()))
    }

    /// Brings up the sidecar (with sync), the main container, and runs `prepare`.
    /// Returns the exit code of the first failing prepare step, or 0.
    fn start_containers(&mut self) -> Result<i32, ExecutorError> {
        self.engine
            .ping()
            .map_err(|e| ExecutorError::engine("reach the container engine", e))?;

        let workspace = match &self.sidecar {
            Some(sidecar) => {
                let volume = sidecar.volume.clone();
                let sidecar_name = sidecar.container.clone();

                let volume_exists = self
                    .engine
                    .volume_exists(&volume)
                    .map_err(|e| ExecutorError::engine("list volumes", e))?;
                if !volume_exists {
                    self.console.extra_info(&format!("Creating volume {}", volume));
                    self.engine
                        .create_volume(&volume)
                        .map_err(|e| ExecutorError::engine("create volume", e))?;
                }

                let rsync_image = ImageRef::new(RSYNC_IMAGE_NAME, RSYNC_IMAGE_TAG);
                let rsync_image_exists = self
                    .engine
                    .image_exists(&rsync_image)
                    .map_err(|e| ExecutorError::engine("inspect image", e))?;
                if !rsync_image_exists {
                    self.console.info(&format!("Pulling image {}", rsync_image));
                    self.engine
                        .pull_image(&rsync_image, RSYNC_PLATFORM)
                        .map_err(|e| ExecutorError::engine("pull image", e))?;
                }

                self.run_if_stopped(&RunOptions {
                    name: sidecar_name,
                    image: rsync_image.to_string(),
                    platform: Some(RSYNC_PLATFORM.to_string()),
                    mounts: vec![
                        Mount::volume(volume.clone(), RSYNC_VOLUME_PATH),
                        Mount::bind(self.base_dir.to_string_lossy(), HOST_MOUNT_PATH),
                    ],
                    entrypoint: Some(String::new()),
                    command: vec!["sh".to_string()],
                    ..Default::default()
                })?;

                self.rsync_in()?;
                Mount::volume(volume, self.mount_dir.clone())
            }
            None => Mount::bind(self.base_dir.to_string_lossy(), self.mount_dir.clone()),
        };

        let image_exists = self
            .engine
            .image_exists(&self.image)
            .map_err(|e| ExecutorError::engine("inspect image", e))?;
        if !image_exists {
            self.fetch_image()?;
        }

        let isolation = self.isolation()?;
        self.run_if_stopped(&RunOptions {
            name: self.container.clone(),
            image: self.image.to_string(),
            platform: Some(self.platform.clone()),
            isolation,
            env: self.env.clone(),
            mounts: vec![workspace],
            devices: self.devices.clone(),
            ports: self.ports.clone(),
            mac_address: self.mac_address.clone(),
            ..Default::default()
        })?;

        for step in &self.prepare {
            let argv = CommandLine::Raw(step.clone()).to_argv()?;
            let code = self.exec_in(&self.container, &argv, &self.mount_dir, self.cancel.as_ref())?;
            if code != 0 {
                return Ok(code);
            }
        }
        Ok(0)
    }

    /// Starts lazily; a failing prepare step's code is returned as-is.
    fn ensure_started(&mut self) -> Result<i32, ExecutorError> {
        if self.is_running()? {
            return Ok(0);
        }
        self.console.info("Executor not running -> starting");
        self.start_containers()
    }

    fn rsync_in(&mut self) -> Result<(), ExecutorError> {
        let Some(sidecar) = &self.sidecar else {
            return Ok(());
        };
        self.console.extra_info("Rsyncing data into executor");
        let argv = rsync::inbound(&sidecar.spec);
        let code = self.exec_in(&sidecar.container, &argv, "/", self.cancel.as_ref())?;
        if code != 0 {
            return Err(ExecutorError::SyncFailed {
                executor: self.name.clone(),
                direction: "into",
                code,
            });
        }
        self.sync_state = SyncState::Mirrored;
        Ok(())
    }

    /// Only copies back what an inbound sync mirrored earlier.
    fn rsync_out(&mut self, cancel: Option<&CancellationToken>) -> Result<(), ExecutorError> {
        let Some(sidecar) = &self.sidecar else {
            return Ok(());
        };
        if self.sync_state != SyncState::Mirrored {
            return Ok(());
        }
        self.console.extra_info("Rsyncing data out of executor");
        let argv = rsync::outbound(&sidecar.spec, &self.work_dir_rel);
        let code = self.exec_in(&sidecar.container, &argv, "/", cancel)?;
        if code != 0 {
            return Err(ExecutorError::SyncFailed {
                executor: self.name.clone(),
                direction: "out of",
                code,
            });
        }
        self.sync_state = SyncState::NeedsSyncIn;
        Ok(())
    }

    fn prepare_session(&mut self) -> Result<i32, ExecutorError> {
        let code = self.ensure_started()?;
        if code != 0 {
            return Ok(code);
        }
        if self.sidecar.is_some() && self.sync_state == SyncState::NeedsSyncIn {
            self.rsync_in()?;
        }
        Ok(0)
    }
}

impl Executor for ContainerExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Container
    }

    fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    fn default_shell(&self) -> Option<Shell> {
        Some(self.default_shell)
    }

    fn exec(&mut self, command: &CommandLine, chdir: Option<&str>) -> Result<i32, ExecutorError> {
        let code = self.prepare_session()?;
        if code != 0 {
            return Ok(code);
        }

        let workdir = match chdir {
            Some(dir) => format!("{}/{}", self.mount_dir, dir),
            None => self.work_dir.clone(),
        };
        let argv = command.to_argv()?;
        self.exec_in(&self.container, &argv, &workdir, self.cancel.as_ref())
    }

    fn shell(&mut self) -> Result<i32, ExecutorError> {
        let code = self.prepare_session()?;
        if code != 0 {
            return Ok(code);
        }
        let argv = vec![self.default_shell.program().to_string()];
        self.engine
            .exec_interactive(&self.container, &argv, &self.work_dir)
            .map_err(|e| ExecutorError::engine("open shell", e))
    }

    fn sync_in(&mut self) -> Result<(), ExecutorError> {
        if self.sidecar.is_none() || self.sync_state == SyncState::Mirrored {
            return Ok(());
        }
        // A stopped executor syncs as part of its start.
        if !self.is_running()? {
            return Ok(());
        }
        self.rsync_in()
    }

    fn sync_out(&mut self) -> Result<(), ExecutorError> {
        if self.sidecar.is_none() || self.sync_state != SyncState::Mirrored {
            return Ok(());
        }
        if !self.is_running()? {
            return Ok(());
        }
        let cancel = self.cancel.clone();
        self.rsync_out(cancel.as_ref())
    }

    fn status(&mut self) -> Result<String, ExecutorError> {
        let mut status = if self.is_running()? {
            "Running".to_string()
        } else {
            "Stopped".to_string()
        };
        status.push_str(&format!("\n\t{}", self.container));
        if let Some(sidecar) = &self.sidecar {
            status.push_str(&format!("\n\t{}", sidecar.container));
        }
        Ok(status)
    }

    fn start(&mut self) -> Result<i32, ExecutorError> {
        if self.is_running()? {
            self.console
                .warning(&format!("Executor '{}' is already running", self.name));
            return Ok(0);
        }
        self.start_containers()
    }

    /// Copies container-side changes back first, so stopping never drops them.
    fn stop(&mut self) -> Result<(), ExecutorError> {
        self.sync_out()?;
        self.stop_one(&self.container)?;
        if let Some(sidecar) = &self.sidecar {
            self.stop_one(&sidecar.container)?;
        }
        Ok(())
    }

    fn restart(&mut self) -> Result<i32, ExecutorError> {
        self.stop()?;
        std::thread::sleep(self.restart_delay);
        self.start_containers()
    }

    fn update(&mut self) -> Result<i32, ExecutorError> {
        self.fetch_image()?;
        if self.is_running()? {
            return self.restart();
        }
        Ok(0)
    }

    /// The final outbound sync; runs even after an interruption.
    fn on_exit(&mut self) -> Result<(), ExecutorError> {
        if self.sidecar.is_none() || self.sync_state != SyncState::Mirrored {
            return Ok(());
        }
        if !self.is_running()? {
            return Ok(());
        }
        self.rsync_out(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackendSpec, PortMapping, Version};
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    // --- Test Engine ---

    #[derive(Default)]
    struct EngineState {
        running: HashSet<String>,
        images: HashSet<String>,
        volumes: HashSet<String>,
        calls: Vec<String>,
        runs: Vec<RunOptions>,
        image_os: String,
        host_os: String,
        failing_command: Option<String>,
        interrupted_command: Option<String>,
    }

    #[derive(Clone, Default)]
    struct FakeEngine(Rc<RefCell<EngineState>>);

    impl FakeEngine {
        fn calls(&self) -> Vec<String> {
            self.0.borrow().calls.clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls().iter().filter(|c| c.starts_with(prefix)).count()
        }

        fn record(&self, call: String) {
            self.0.borrow_mut().calls.push(call);
        }
    }

    impl ContainerEngine for FakeEngine {
        fn ping(&self) -> Result<(), EngineError> {
            Ok(())
        }

        fn host_os_version(&self) -> Result<String, EngineError> {
            Ok(self.0.borrow().host_os.clone())
        }

        fn image_exists(&self, image: &ImageRef) -> Result<bool, EngineError> {
            Ok(self.0.borrow().images.contains(&image.to_string()))
        }

        fn image_os_version(&self, _image: &ImageRef) -> Result<String, EngineError> {
            Ok(self.0.borrow().image_os.clone())
        }

        fn pull_image(&self, image: &ImageRef, _platform: &str) -> Result<(), EngineError> {
            self.record(format!("pull {}", image));
            self.0.borrow_mut().images.insert(image.to_string());
            Ok(())
        }

        fn build_image(
            &self,
            _context: &Path,
            _dockerfile: &Path,
            tag: &ImageRef,
            _platform: &str,
        ) -> Result<(), EngineError> {
            self.record(format!("build {}", tag));
            self.0.borrow_mut().images.insert(tag.to_string());
            Ok(())
        }

        fn container_running(&self, name: &str) -> Result<bool, EngineError> {
            Ok(self.0.borrow().running.contains(name))
        }

        fn run_container(&self, options: &RunOptions) -> Result<(), EngineError> {
            self.record(format!("run {}", options.name));
            let mut state = self.0.borrow_mut();
            state.running.insert(options.name.clone());
            state.runs.push(options.clone());
            Ok(())
        }

        fn stop_container(&self, name: &str) -> Result<(), EngineError> {
            self.record(format!("stop {}", name));
            if self.0.borrow_mut().running.remove(name) {
                Ok(())
            } else {
                Err(EngineError::NotFound {
                    what: name.to_string(),
                })
            }
        }

        fn exec(
            &self,
            container: &str,
            argv: &[String],
            workdir: &str,
            _cancel: Option<&CancellationToken>,
        ) -> Result<i32, EngineError> {
            let line = argv.join(" ");
            self.record(format!("exec {} [{}] {}", container, workdir, line));
            let interrupted = self
                .0
                .borrow()
                .interrupted_command
                .as_ref()
                .is_some_and(|needle| line.contains(needle.as_str()));
            if interrupted {
                return Err(EngineError::Interrupted);
            }
            let fails = self
                .0
                .borrow()
                .failing_command
                .as_ref()
                .is_some_and(|needle| line.contains(needle.as_str()));
            Ok(if fails { 3 } else { 0 })
        }

        fn exec_interactive(
            &self,
            container: &str,
            argv: &[String],
            _workdir: &str,
        ) -> Result<i32, EngineError> {
            self.record(format!("shell {} {}", container, argv.join(" ")));
            Ok(0)
        }

        fn volume_exists(&self, name: &str) -> Result<bool, EngineError> {
            Ok(self.0.borrow().volumes.contains(name))
        }

        fn create_volume(&self, name: &str) -> Result<(), EngineError> {
            self.record(format!("volume {}", name));
            self.0.borrow_mut().volumes.insert(name.to_string());
            Ok(())
        }
    }

    // --- Setup helpers ---

    fn config(work_dir_rel: &str) -> Config {
        Config {
            version: Version::new(0, 0, 1),
            project: "p".to_string(),
            help: None,
            commands: Vec::new(),
            default_command: None,
            executors: Vec::new(),
            default_executor: None,
            base_dir: PathBuf::from("/work"),
            work_dir_rel: work_dir_rel.to_string(),
        }
    }

    fn runtime() -> Runtime {
        Runtime {
            console: Console::plain(),
            cancel: None,
        }
    }

    fn synced_spec() -> ContainerSpec {
        let mut spec = ContainerSpec::from_image(ImageRef::new("alpine", "3.19"));
        spec.sync = Some(SyncSpec::Rsync(RsyncSpec::default()));
        spec
    }

    fn executor(spec: ContainerSpec, rel: &str, engine: &FakeEngine) -> ContainerExecutor {
        let executor_spec = ExecutorSpec {
            name: "ci".to_string(),
            help: None,
            backend: BackendSpec::Container(spec.clone()),
        };
        ContainerExecutor::new(
            &executor_spec,
            &spec,
            &config(rel),
            &runtime(),
            Box::new(engine.clone()),
        )
        .unwrap()
        .with_restart_delay(Duration::ZERO)
    }

    fn raw(line: &str) -> CommandLine {
        CommandLine::Raw(line.to_string())
    }

    // --- Tests ---

    #[test]
    fn test_container_name_is_deterministic() {
        let a = container_name("p", "ci", Path::new("/work"));
        let b = container_name("p", "ci", Path::new("/work"));
        let other = container_name("p", "ci", Path::new("/elsewhere"));

        assert_eq!(a, b);
        assert_ne!(a, other);
        assert!(a.starts_with("brock-p-ci-"));
        assert_eq!(a.len(), "brock-p-ci-".len() + HASH_TRUNCATE_LENGTH * 2);
        assert!(container_name("my app", "ci", Path::new("/w")).starts_with("brock-my-app-ci-"));
    }

    #[test]
    fn test_select_isolation() {
        assert_eq!(select_isolation("10.0.20348.2227", "10.0.20348.1000"), "process");
        assert_eq!(select_isolation("10.0.17763.5329", "10.0.20348.2227"), "hyperv");
    }

    #[test]
    fn test_windows_start_uses_process_isolation_on_matching_build() {
        // --- Setup ---
        let engine = FakeEngine::default();
        {
            let mut state = engine.0.borrow_mut();
            state.image_os = "10.0.20348.2227".to_string();
            state.host_os = "10.0.20348.1850".to_string();
        }
        let mut spec = ContainerSpec::from_image(ImageRef::new("mcr.microsoft.com/windows/servercore", "ltsc2022"));
        spec.platform = "windows".to_string();
        let mut executor = executor(spec, ".", &engine);

        // --- Execute ---
        executor.start().unwrap();

        // --- Assert ---
        let state = engine.0.borrow();
        let run = state.runs.last().unwrap();
        assert_eq!(run.isolation.as_deref(), Some("process"));
        assert_eq!(run.mounts[0].target, "C:/host");
        assert_eq!(executor.default_shell(), Some(Shell::Cmd));
    }

    #[test]
    fn test_windows_start_uses_hyperv_on_different_build() {
        let engine = FakeEngine::default();
        {
            let mut state = engine.0.borrow_mut();
            state.image_os = "10.0.17763.1".to_string();
            state.host_os = "10.0.20348.1".to_string();
        }
        let mut spec = ContainerSpec::from_image(ImageRef::new("win", "1809"));
        spec.platform = "windows".to_string();
        let mut executor = executor(spec, ".", &engine);

        executor.start().unwrap();

        let state = engine.0.borrow();
        assert_eq!(state.runs.last().unwrap().isolation.as_deref(), Some("hyperv"));
    }

    #[test]
    fn test_first_exec_starts_and_syncs_once() {
        // --- Setup ---
        let engine = FakeEngine::default();
        let mut executor = executor(synced_spec(), "fw", &engine);
        let sidecar = format!("{}-rsync", executor.container_name());

        // --- Execute ---
        assert_eq!(executor.exec(&raw("make"), None).unwrap(), 0);
        assert_eq!(executor.exec(&raw("make test"), Some("lib")).unwrap(), 0);

        // --- Assert ---
        let calls = engine.calls();
        let main = executor.container_name().to_string();
        assert_eq!(calls[0], format!("volume {}-rsync-volume", main));
        assert_eq!(calls[1], "pull eeacms/rsync:2.3");
        assert_eq!(calls[2], format!("run {}", sidecar));
        assert!(calls[3].starts_with(&format!("exec {} [/] rsync -a --delete /host/ /rsync_volume", sidecar)));
        assert_eq!(calls[4], "pull alpine:3.19");
        assert_eq!(calls[5], format!("run {}", main));
        assert_eq!(calls[6], format!("exec {} [/host/fw] make", main));
        assert_eq!(calls[7], format!("exec {} [/host/lib] make test", main));
        assert_eq!(engine.count("exec brock-p-ci-") - 2, 1, "one inbound sync only");
        assert_eq!(executor.sync_state(), SyncState::Mirrored);
    }

    #[test]
    fn test_start_without_sync_binds_base_dir() {
        let engine = FakeEngine::default();
        let mut spec = ContainerSpec::from_image(ImageRef::new("alpine", "3.19"));
        spec.env.insert("A".to_string(), "1".to_string());
        spec.ports.push(PortMapping {
            container_port: 80,
            protocol: None,
            host_port: 8080,
        });
        let mut executor = executor(spec, ".", &engine);

        executor.start().unwrap();

        let state = engine.0.borrow();
        assert_eq!(state.runs.len(), 1);
        let run = &state.runs[0];
        assert_eq!(run.mounts, vec![Mount::bind("/work", "/host")]);
        assert_eq!(run.env, vec![("A".to_string(), "1".to_string())]);
        assert_eq!(run.ports, vec!["8080:80"]);
        assert_eq!(run.isolation, None);
    }

    #[test]
    fn test_failing_prepare_step_aborts_exec() {
        let engine = FakeEngine::default();
        engine.0.borrow_mut().failing_command = Some("apk".to_string());
        let mut spec = ContainerSpec::from_image(ImageRef::new("alpine", "3.19"));
        spec.prepare = vec!["apk add make".to_string(), "echo never".to_string()];
        let mut executor = executor(spec, ".", &engine);

        let code = executor.exec(&raw("make"), None).unwrap();

        assert_eq!(code, 3);
        assert!(!engine.calls().iter().any(|c| c.contains("echo never")));
        assert_eq!(
            engine.count(&format!("exec {} [/host] make", executor.container_name())),
            0
        );
    }

    #[test]
    fn test_on_exit_syncs_out_once_after_sync_in() {
        // --- Setup ---
        let engine = FakeEngine::default();
        let mut executor = executor(synced_spec(), "fw", &engine);

        // --- Execute ---
        executor.on_exit().unwrap();
        let before_exec = engine.count("exec");
        executor.exec(&raw("make"), None).unwrap();
        executor.on_exit().unwrap();
        executor.on_exit().unwrap();

        // --- Assert ---
        assert_eq!(before_exec, 0);
        let outbound: Vec<_> = engine
            .calls()
            .into_iter()
            .filter(|c| c.contains("/rsync_volume/fw/ /host/fw"))
            .collect();
        assert_eq!(outbound.len(), 1);
        assert_eq!(executor.sync_state(), SyncState::NeedsSyncIn);
    }

    #[test]
    fn test_interrupted_session_still_syncs_out_on_exit() {
        // --- Setup ---
        let engine = FakeEngine::default();
        engine.0.borrow_mut().interrupted_command = Some("make".to_string());
        let mut executor = executor(synced_spec(), "fw", &engine);

        // --- Execute ---
        let err = executor.exec(&raw("make"), None).unwrap_err();
        executor.on_exit().unwrap();

        // --- Assert ---
        assert!(err.is_interrupted());
        let outbound: Vec<_> = engine
            .calls()
            .into_iter()
            .filter(|c| c.contains("/rsync_volume/fw/ /host/fw"))
            .collect();
        assert_eq!(outbound.len(), 1);
        let calls = engine.calls();
        let interrupted = calls.iter().position(|c| c.ends_with("] make")).unwrap();
        let synced_out = calls
            .iter()
            .position(|c| c.contains("/rsync_volume/fw/ /host/fw"))
            .unwrap();
        assert!(interrupted < synced_out);
    }

    #[test]
    fn test_sync_out_then_exec_syncs_in_again() {
        let engine = FakeEngine::default();
        let mut executor = executor(synced_spec(), ".", &engine);

        executor.exec(&raw("make"), None).unwrap();
        executor.sync_out().unwrap();
        executor.exec(&raw("make"), None).unwrap();

        assert_eq!(engine.count(&format!("exec {}-rsync [/] rsync -a --delete /host/", executor.container_name())), 2);
        assert_eq!(engine.count(&format!("exec {}-rsync [/] rsync -a --delete /rsync_volume/", executor.container_name())), 1);
    }

    #[test]
    fn test_stop_flushes_sync_and_warns_when_stopped() {
        let engine = FakeEngine::default();
        let mut executor = executor(synced_spec(), ".", &engine);

        executor.stop().unwrap();
        assert_eq!(engine.count("stop"), 0);

        executor.exec(&raw("make"), None).unwrap();
        executor.stop().unwrap();

        let calls = engine.calls();
        let outbound = calls.iter().position(|c| c.contains("/rsync_volume/./ /host/.")).unwrap();
        let first_stop = calls.iter().position(|c| c.starts_with("stop")).unwrap();
        assert!(outbound < first_stop);
        assert_eq!(engine.count("stop"), 2);
        assert_eq!(executor.status().unwrap().lines().next(), Some("Stopped"));
    }

    #[test]
    fn test_status_lists_container_names() {
        let engine = FakeEngine::default();
        let mut executor = executor(synced_spec(), ".", &engine);
        let main = executor.container_name().to_string();

        let status = executor.status().unwrap();

        assert_eq!(status, format!("Stopped\n\t{}\n\t{}-rsync", main, main));
    }

    #[test]
    fn test_update_pulls_and_restarts_running_executor() {
        let engine = FakeEngine::default();
        let mut executor = executor(ContainerSpec::from_image(ImageRef::new("alpine", "3.19")), ".", &engine);
        executor.start().unwrap();

        executor.update().unwrap();

        assert_eq!(engine.count("pull alpine:3.19"), 2);
        assert_eq!(engine.count("stop"), 1);
        assert_eq!(engine.count("run"), 2);
    }

    #[test]
    fn test_dockerfile_image_is_tagged_with_container_name() {
        let engine = FakeEngine::default();
        let mut spec = ContainerSpec::from_image(ImageRef::new("unused", "latest"));
        spec.source = ImageSource::Dockerfile("docker/Dockerfile".to_string());
        let mut executor = executor(spec, ".", &engine);

        executor.start().unwrap();

        assert_eq!(executor.image().name, executor.container_name());
        assert_eq!(engine.count(&format!("build {}:latest", executor.container_name())), 1);
    }

    #[test]
    fn test_mutagen_sync_is_rejected() {
        let mut spec = ContainerSpec::from_image(ImageRef::new("alpine", "3.19"));
        spec.sync = Some(SyncSpec::Mutagen);
        let executor_spec = ExecutorSpec {
            name: "ci".to_string(),
            help: None,
            backend: BackendSpec::Container(spec.clone()),
        };

        let result = ContainerExecutor::new(
            &executor_spec,
            &spec,
            &config("."),
            &runtime(),
            Box::new(FakeEngine::default()),
        );

        assert!(matches!(result, Err(ConfigError::UnsupportedSync { .. })));
    }

    #[test]
    fn test_shell_opens_default_dialect() {
        let engine = FakeEngine::default();
        let mut executor = executor(ContainerSpec::from_image(ImageRef::new("alpine", "3.19")), ".", &engine);

        executor.shell().unwrap();

        assert_eq!(
            engine.calls().last().unwrap(),
            &format!("shell {} sh", executor.container_name())
        );
    }
}
