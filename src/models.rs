// src/models.rs

//! Strongly typed configuration produced by the schema-validating parse step.
//!
//! Nothing in here is deserialized directly: `core::schema` walks the merged
//! YAML tree, reports violations with their path, and builds these values.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::{DEFAULT_IMAGE_TAG, DEFAULT_PLATFORM};

// --- VERSIONING ---

/// A `major.minor.patch` version. Ordering is component-wise, major first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The version of this build of brock.
    pub fn current() -> Self {
        // CARGO_PKG_VERSION is always `N.N.N[-pre]`, the fallback only guards odd builds.
        env!("CARGO_PKG_VERSION")
            .parse()
            .unwrap_or_else(|_| Self::new(0, 0, 0))
    }
}

impl FromStr for Version {
    type Err = String;

    /// Parses `N.N.N`. Pre-release/build suffixes on the patch component are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, '.');
        let mut next = |label: &str| -> Result<u64, String> {
            let raw = parts
                .next()
                .ok_or_else(|| format!("'{}' is missing the {} component", s, label))?;
            let digits: String = raw.chars().take_while(char::is_ascii_digit).collect();
            digits
                .parse()
                .map_err(|_| format!("'{}' has an invalid {} component", s, label))
        };
        Ok(Self {
            major: next("major")?,
            minor: next("minor")?,
            patch: next("patch")?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// --- SHELL DIALECTS ---

/// A shell dialect a structured step can be wrapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Sh,
    Bash,
    Cmd,
    PowerShell,
}

impl Shell {
    /// Looks up a dialect by the name used in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "sh" => Some(Self::Sh),
            "bash" => Some(Self::Bash),
            "cmd" => Some(Self::Cmd),
            "powershell" | "pwsh" => Some(Self::PowerShell),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sh => "sh",
            Self::Bash => "bash",
            Self::Cmd => "cmd",
            Self::PowerShell => "powershell",
        }
    }

    /// The interpreter binary, also used for interactive sessions.
    pub fn program(self) -> &'static str {
        self.name()
    }

    /// Joins script lines so the interpreter runs them one after another.
    pub fn separator(self) -> &'static str {
        match self {
            Self::Sh | Self::Bash | Self::PowerShell => "; ",
            Self::Cmd => " & ",
        }
    }

    fn command_flag(self) -> &'static str {
        match self {
            Self::Sh | Self::Bash => "-c",
            Self::Cmd => "/c",
            Self::PowerShell => "-Command",
        }
    }

    /// Wraps a multi-line script into a single argv for this dialect.
    /// Blank lines are dropped.
    pub fn wrap(self, script: &str) -> Vec<String> {
        let body = script
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join(self.separator());
        vec![
            self.program().to_string(),
            self.command_flag().to_string(),
            body,
        ]
    }

    /// The default dialect for a platform name (`windows` → cmd, everything else → sh).
    pub fn for_platform(platform: &str) -> Self {
        if platform.eq_ignore_ascii_case("windows") {
            Self::Cmd
        } else {
            Self::Sh
        }
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// --- RESOLVED CONFIGURATION ---

/// The validated configuration of one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub version: Version,
    pub project: String,
    pub help: Option<String>,
    pub commands: Vec<CommandSpec>,
    pub default_command: Option<String>,
    pub executors: Vec<ExecutorSpec>,
    pub default_executor: Option<String>,
    /// Directory of the shallowest configuration file.
    pub base_dir: PathBuf,
    /// Invocation directory relative to `base_dir`, `/`-separated, `.` for the base itself.
    pub work_dir_rel: String,
}

impl Config {
    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn executor(&self, name: &str) -> Option<&ExecutorSpec> {
        self.executors.iter().find(|e| e.name == name)
    }
}

/// A user defined command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSpec {
    pub name: String,
    pub help: Option<String>,
    pub steps: Vec<StepSpec>,
    pub depends_on: Vec<String>,
    pub chdir: Option<String>,
    pub default_executor: Option<String>,
    pub options: Vec<CommandOption>,
}

/// How a declared command option is given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionKind {
    /// A switch without a value, e.g. `--verbose`.
    Flag(String),
    /// A positional value.
    Argument(String),
    /// A named value, e.g. `--target arm`.
    Option(String),
}

/// A declared command option. Scalars are kept as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOption {
    pub name: String,
    pub kind: OptionKind,
    pub default: Option<String>,
    pub short_name: Option<String>,
    pub choices: Vec<String>,
    pub variable: Option<String>,
    pub required: bool,
    pub help: Option<String>,
}

impl CommandOption {
    /// Usage form for listings: `--verbose/-v`, `<target>`, `--board <board>`.
    pub fn usage(&self) -> String {
        let usage = match &self.kind {
            OptionKind::Flag(flag) => flag.clone(),
            OptionKind::Argument(argument) => format!("<{}>", argument),
            OptionKind::Option(option) => format!("{} <{}>", option, self.name),
        };
        match &self.short_name {
            Some(short) => format!("{}/{}", usage, short),
            None => usage,
        }
    }
}

/// One step of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum StepSpec {
    /// `"[@executor ]command line"`.
    Line(String),
    /// A script run through a shell dialect.
    Script {
        executor: Option<String>,
        shell: Option<Shell>,
        script: String,
    },
}

/// A declared executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSpec {
    pub name: String,
    pub help: Option<String>,
    pub backend: BackendSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendSpec {
    Container(ContainerSpec),
    Remote(RemoteSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub source: ImageSource,
    pub platform: String,
    pub env: BTreeMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub mac_address: Option<String>,
    pub devices: Vec<String>,
    pub sync: Option<SyncSpec>,
    pub prepare: Vec<String>,
    pub default_shell: Option<Shell>,
}

impl ContainerSpec {
    /// A container spec with defaults for everything but the image.
    pub fn from_image(image: ImageRef) -> Self {
        Self {
            source: ImageSource::Image(image),
            platform: DEFAULT_PLATFORM.to_string(),
            env: BTreeMap::new(),
            ports: Vec::new(),
            mac_address: None,
            devices: Vec::new(),
            sync: None,
            prepare: Vec::new(),
            default_shell: None,
        }
    }

    pub fn is_windows(&self) -> bool {
        self.platform.eq_ignore_ascii_case("windows")
    }
}

/// Where a container image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Image(ImageRef),
    /// Path to a build file, relative to the base directory.
    Dockerfile(String),
}

/// An image reference split into name and tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }
}

impl FromStr for ImageRef {
    type Err = String;

    /// `name[:tag]`; a colon that belongs to a registry port (`host:5000/img`) is not a tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("image reference is empty".to_string());
        }
        match s.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => {
                if name.is_empty() || tag.is_empty() {
                    return Err(format!("invalid image reference '{}'", s));
                }
                Ok(Self::new(name, tag))
            }
            _ => Ok(Self::new(s, DEFAULT_IMAGE_TAG)),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// A published port: container port (optionally with protocol) → host port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: Option<String>,
    pub host_port: u16,
}

impl PortMapping {
    /// The `-p` argument understood by the engine, e.g. `8080:80/tcp`.
    pub fn to_publish_arg(&self) -> String {
        match &self.protocol {
            Some(proto) => format!("{}:{}/{}", self.host_port, self.container_port, proto),
            None => format!("{}:{}", self.host_port, self.container_port),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncSpec {
    Rsync(RsyncSpec),
    Mutagen,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RsyncSpec {
    pub options: Vec<String>,
    pub filter: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSpec {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_and_order() {
        // --- Setup ---
        let required: Version = "0.0.1".parse().unwrap();
        let running: Version = "0.0.4-rc1".parse().unwrap();

        // --- Assert ---
        assert_eq!(running, Version::new(0, 0, 4));
        assert!(required < running);
        assert!(Version::new(1, 0, 0) > Version::new(0, 9, 9));
        assert!("1.2".parse::<Version>().is_err());
        assert!("a.b.c".parse::<Version>().is_err());
        assert_eq!(Version::new(1, 2, 3).to_string(), "1.2.3");
    }

    #[test]
    fn test_shell_wrap_per_dialect() {
        // --- Setup ---
        let script = "make\n\n  \nmake test\n";

        // --- Execute & Assert ---
        assert_eq!(Shell::Bash.wrap(script), vec!["bash", "-c", "make; make test"]);
        assert_eq!(Shell::Cmd.wrap(script), vec!["cmd", "/c", "make & make test"]);
        assert_eq!(
            Shell::PowerShell.wrap(script),
            vec!["powershell", "-Command", "make; make test"]
        );
    }

    #[test]
    fn test_shell_names_and_platform_default() {
        assert_eq!(Shell::from_name("pwsh"), Some(Shell::PowerShell));
        assert_eq!(Shell::from_name("fish"), None);
        assert_eq!(Shell::for_platform("Windows"), Shell::Cmd);
        assert_eq!(Shell::for_platform("linux"), Shell::Sh);
    }

    #[test]
    fn test_option_usage_forms() {
        let mut option = CommandOption {
            name: "board".to_string(),
            kind: OptionKind::Option("--board".to_string()),
            default: None,
            short_name: Some("-b".to_string()),
            choices: Vec::new(),
            variable: None,
            required: false,
            help: None,
        };
        assert_eq!(option.usage(), "--board <board>/-b");

        option.kind = OptionKind::Argument("target".to_string());
        option.short_name = None;
        assert_eq!(option.usage(), "<target>");
    }

    #[test]
    fn test_image_ref_parsing() {
        assert_eq!(
            "alpine:3.19".parse::<ImageRef>().unwrap(),
            ImageRef::new("alpine", "3.19")
        );
        assert_eq!(
            "registry:5000/tools".parse::<ImageRef>().unwrap(),
            ImageRef::new("registry:5000/tools", "latest")
        );
        assert!("".parse::<ImageRef>().is_err());
        assert!("alpine:".parse::<ImageRef>().is_err());
    }
}
