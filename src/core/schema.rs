// src/core/schema.rs

//! Validation of the merged configuration tree.
//!
//! The merged YAML is walked top-down. Entries whose shape is fixed are read
//! through small `deny_unknown_fields` structs; the parts that need cross-field
//! rules (`type` discriminators, `image`/`dockerfile` exclusivity, port keys)
//! are checked by hand. Every error carries the dotted path of the offending
//! node, e.g. `executors.ci.ports.80/tcp`.

use crate::{
    constants::{DEFAULT_KEY, DEFAULT_PLATFORM, HOST_EXECUTOR_NAME},
    core::{command::parse_step_line, config_resolver::ConfigError},
    models::{
        BackendSpec, CommandOption, CommandSpec, Config, ContainerSpec, ExecutorSpec, ImageRef,
        ImageSource, OptionKind, PortMapping, RemoteSpec, RsyncSpec, Shell, StepSpec, SyncSpec,
        Version,
    },
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, de::DeserializeOwned};
use serde_yaml::{Mapping, Value};
use std::{collections::BTreeMap, path::PathBuf};

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").unwrap();
    static ref EXECUTOR_NAME_RE: Regex = Regex::new(r"^[\w-]+$").unwrap();
    static ref MAC_RE: Regex = Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").unwrap();
    static ref PORT_KEY_RE: Regex = Regex::new(r"^([0-9]+)(?:/(tcp|udp|sctp))?$").unwrap();
}

const ROOT_KEYS: &[&str] = &[
    "version",
    "project",
    "help",
    "default_cmd",
    "commands",
    "executors",
];

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCommand {
    help: Option<String>,
    #[serde(default)]
    steps: Vec<Value>,
    #[serde(default)]
    depends_on: Vec<String>,
    chdir: Option<String>,
    default_executor: Option<String>,
    #[serde(default)]
    options: Mapping,
}

/// One entry of `options`. Which of `flag`, `argument` and `option` is set
/// picks the kind; none of them means a named option.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOption {
    flag: Option<Value>,
    argument: Option<Value>,
    option: Option<Value>,
    default: Option<Value>,
    short_name: Option<Value>,
    choices: Option<Vec<Value>>,
    variable: Option<String>,
    required: Option<bool>,
    help: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawScriptStep {
    executor: Option<String>,
    shell: Option<String>,
    script: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocker {
    help: Option<String>,
    image: Option<String>,
    dockerfile: Option<String>,
    platform: Option<String>,
    #[serde(default)]
    env: Mapping,
    #[serde(default)]
    ports: Mapping,
    mac_address: Option<String>,
    #[serde(default)]
    devices: Vec<String>,
    sync: Option<Value>,
    #[serde(default)]
    prepare: Vec<String>,
    default_shell: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRsync {
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    filter: Vec<String>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSsh {
    help: Option<String>,
    host: String,
    username: Option<String>,
    password: Option<Value>,
}

/// Validates `root` and builds the typed configuration.
pub fn validate(root: &Value, base_dir: PathBuf, work_dir_rel: String) -> Result<Config, ConfigError> {
    let map = root
        .as_mapping()
        .ok_or_else(|| ConfigError::schema("(root)", "expected a mapping"))?;

    for key in map.keys() {
        let name = key_name(key, "(root)")?;
        if !ROOT_KEYS.contains(&name) {
            return Err(ConfigError::schema(name, "unknown key"));
        }
    }

    let version_raw = required_string(map, "version", "")?;
    if !VERSION_RE.is_match(&version_raw) {
        return Err(ConfigError::schema(
            "version",
            format!("'{}' does not match N.N.N", version_raw),
        ));
    }
    let version: Version = version_raw
        .parse()
        .map_err(|message: String| ConfigError::schema("version", message))?;

    let project = required_string(map, "project", "")?;
    if project.trim().is_empty() {
        return Err(ConfigError::schema("project", "must not be empty"));
    }

    let help = optional_string(map, "help", "")?;
    let default_cmd = optional_string(map, "default_cmd", "")?;
    let (commands, commands_default) = parse_commands(map.get("commands"))?;
    let (executors, default_executor) = parse_executors(map.get("executors"))?;

    let default_command = commands_default
        .or(default_cmd)
        .or_else(|| match commands.as_slice() {
            [only] => Some(only.name.clone()),
            _ => None,
        });

    Ok(Config {
        version,
        project,
        help,
        commands,
        default_command,
        executors,
        default_executor,
        base_dir,
        work_dir_rel,
    })
}

// --- COMMANDS ---

fn parse_commands(value: Option<&Value>) -> Result<(Vec<CommandSpec>, Option<String>), ConfigError> {
    let map = match value {
        None | Some(Value::Null) => return Ok((Vec::new(), None)),
        Some(Value::Mapping(map)) => map,
        Some(_) => return Err(ConfigError::schema("commands", "expected a mapping")),
    };

    let mut commands = Vec::new();
    let mut default = None;
    for (key, body) in map {
        let name = key_name(key, "commands")?;
        let path = format!("commands.{}", name);

        if name == DEFAULT_KEY {
            let target = body
                .as_str()
                .ok_or_else(|| ConfigError::schema(&path, "expected the name of a command"))?;
            default = Some(target.to_string());
            continue;
        }

        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(ConfigError::schema(
                &path,
                "command names must be a single word",
            ));
        }
        commands.push(parse_command(name, body, &path)?);
    }
    Ok((commands, default))
}

fn parse_command(name: &str, body: &Value, path: &str) -> Result<CommandSpec, ConfigError> {
    let raw: RawCommand = if body.is_null() {
        RawCommand::default()
    } else {
        typed(body, path)?
    };

    let steps = raw
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| parse_step(step, &format!("{}.steps[{}]", path, i)))
        .collect::<Result<Vec<_>, _>>()?;

    let options = raw
        .options
        .iter()
        .map(|(key, body)| {
            let name = key_name(key, &format!("{}.options", path))?;
            parse_option(name, body, &format!("{}.options.{}", path, name))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CommandSpec {
        name: name.to_string(),
        help: raw.help,
        steps,
        depends_on: raw.depends_on,
        chdir: raw.chdir,
        default_executor: raw.default_executor,
        options,
    })
}

fn parse_option(name: &str, body: &Value, path: &str) -> Result<CommandOption, ConfigError> {
    let raw: RawOption = typed(body, path)?;

    let field = |value: &Option<Value>, key: &str| -> Result<Option<String>, ConfigError> {
        value
            .as_ref()
            .filter(|v| !v.is_null())
            .map(|v| any_scalar(v, &child_path(path, key)))
            .transpose()
    };

    let kind = match (
        field(&raw.flag, "flag")?,
        field(&raw.argument, "argument")?,
        field(&raw.option, "option")?,
    ) {
        (Some(flag), None, None) => OptionKind::Flag(flag),
        (None, Some(argument), None) => OptionKind::Argument(argument),
        (None, None, Some(option)) => OptionKind::Option(option),
        (None, None, None) => OptionKind::Option(format!("--{}", name)),
        _ => {
            return Err(ConfigError::schema(
                path,
                "only one of 'flag', 'argument' and 'option' may be given",
            ));
        }
    };

    match kind {
        OptionKind::Flag(_) if raw.required.is_some() || raw.choices.is_some() => {
            return Err(ConfigError::schema(
                path,
                "a flag takes neither 'required' nor 'choices'",
            ));
        }
        OptionKind::Argument(_) if raw.short_name.is_some() => {
            return Err(ConfigError::schema(
                child_path(path, "short_name"),
                "an argument has no short name",
            ));
        }
        _ => {}
    }

    let choices = raw
        .choices
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, choice)| any_scalar(choice, &format!("{}.choices[{}]", path, i)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CommandOption {
        name: name.to_string(),
        kind,
        default: field(&raw.default, "default")?,
        short_name: field(&raw.short_name, "short_name")?,
        choices,
        variable: raw.variable,
        required: raw.required.unwrap_or(false),
        help: raw.help,
    })
}

fn parse_step(step: &Value, path: &str) -> Result<StepSpec, ConfigError> {
    match step {
        Value::String(line) => match parse_step_line(line) {
            (Some(executor), rest) if rest.trim().is_empty() => Err(ConfigError::schema(
                path,
                format!("step names executor '{}' but no command", executor),
            )),
            _ => Ok(StepSpec::Line(line.clone())),
        },
        Value::Mapping(_) => {
            let raw: RawScriptStep = typed(step, path)?;
            let shell = raw
                .shell
                .as_deref()
                .map(|name| parse_shell(name, &format!("{}.shell", path)))
                .transpose()?;
            Ok(StepSpec::Script {
                executor: raw.executor,
                shell,
                script: raw.script,
            })
        }
        _ => Err(ConfigError::schema(
            path,
            "expected a command line or a mapping with 'script'",
        )),
    }
}

fn parse_shell(name: &str, path: &str) -> Result<Shell, ConfigError> {
    Shell::from_name(name).ok_or_else(|| {
        ConfigError::schema(
            path,
            format!(
                "unknown shell '{}', expected one of sh, bash, cmd, powershell",
                name
            ),
        )
    })
}

// --- EXECUTORS ---

fn parse_executors(
    value: Option<&Value>,
) -> Result<(Vec<ExecutorSpec>, Option<String>), ConfigError> {
    let map = match value {
        None | Some(Value::Null) => return Ok((Vec::new(), None)),
        Some(Value::Mapping(map)) => map,
        Some(_) => return Err(ConfigError::schema("executors", "expected a mapping")),
    };

    let mut executors = Vec::new();
    let mut default = None;
    for (key, body) in map {
        let name = key_name(key, "executors")?;
        let path = format!("executors.{}", name);

        if name == DEFAULT_KEY {
            let target = body
                .as_str()
                .ok_or_else(|| ConfigError::schema(&path, "expected the name of an executor"))?;
            default = Some(target.to_string());
            continue;
        }
        if name == HOST_EXECUTOR_NAME {
            return Err(ConfigError::schema(
                &path,
                "'host' is the built-in executor and cannot be redefined",
            ));
        }
        if !EXECUTOR_NAME_RE.is_match(name) {
            return Err(ConfigError::schema(
                &path,
                "executor names may only contain letters, digits, '_' and '-'",
            ));
        }
        executors.push(parse_executor(name, body, &path)?);
    }
    Ok((executors, default))
}

fn parse_executor(name: &str, body: &Value, path: &str) -> Result<ExecutorSpec, ConfigError> {
    let (kind, rest) = split_discriminator(body, path)?;

    let (help, backend) = match kind.as_str() {
        "docker" => {
            let raw: RawDocker = typed(&rest, path)?;
            let help = raw.help.clone();
            (help, BackendSpec::Container(parse_docker(raw, path)?))
        }
        "ssh" => {
            let raw: RawSsh = typed(&rest, path)?;
            let password = raw
                .password
                .map(|value| scalar_to_string(&value, &format!("{}.password", path)))
                .transpose()?;
            let remote = RemoteSpec {
                host: raw.host,
                username: raw.username,
                password,
            };
            (raw.help, BackendSpec::Remote(remote))
        }
        other => {
            return Err(ConfigError::schema(
                format!("{}.type", path),
                format!("unknown executor type '{}', expected 'docker' or 'ssh'", other),
            ));
        }
    };

    Ok(ExecutorSpec {
        name: name.to_string(),
        help,
        backend,
    })
}

fn parse_docker(raw: RawDocker, path: &str) -> Result<ContainerSpec, ConfigError> {
    let source = match (raw.image, raw.dockerfile) {
        (Some(image), None) => ImageSource::Image(
            image
                .parse::<ImageRef>()
                .map_err(|message| ConfigError::schema(format!("{}.image", path), message))?,
        ),
        (None, Some(dockerfile)) => ImageSource::Dockerfile(dockerfile),
        (Some(_), Some(_)) => {
            return Err(ConfigError::schema(
                path,
                "'image' and 'dockerfile' are mutually exclusive",
            ));
        }
        (None, None) => {
            return Err(ConfigError::schema(
                path,
                "one of 'image' or 'dockerfile' is required",
            ));
        }
    };

    let mut env = BTreeMap::new();
    for (key, value) in &raw.env {
        let env_path = format!("{}.env", path);
        let name = key_name(key, &env_path)?;
        let value = scalar_to_string(value, &format!("{}.{}", env_path, name))?;
        env.insert(name.to_string(), value);
    }

    let ports = raw
        .ports
        .iter()
        .map(|(key, value)| parse_port(key, value, &format!("{}.ports", path)))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(mac) = &raw.mac_address {
        if !MAC_RE.is_match(mac) {
            return Err(ConfigError::schema(
                format!("{}.mac_address", path),
                format!("'{}' is not a MAC address (xx:xx:xx:xx:xx:xx)", mac),
            ));
        }
    }

    let sync = raw
        .sync
        .as_ref()
        .map(|value| parse_sync(value, &format!("{}.sync", path)))
        .transpose()?;

    let default_shell = raw
        .default_shell
        .as_deref()
        .map(|name| parse_shell(name, &format!("{}.default_shell", path)))
        .transpose()?;

    Ok(ContainerSpec {
        source,
        platform: raw.platform.unwrap_or_else(|| DEFAULT_PLATFORM.to_string()),
        env,
        ports,
        mac_address: raw.mac_address,
        devices: raw.devices,
        sync,
        prepare: raw.prepare,
        default_shell,
    })
}

fn parse_port(key: &Value, value: &Value, path: &str) -> Result<PortMapping, ConfigError> {
    let (container_port, protocol) = match key {
        Value::Number(n) => (to_port(n.as_u64(), path)?, None),
        Value::String(s) => {
            let caps = PORT_KEY_RE.captures(s).ok_or_else(|| {
                ConfigError::schema(
                    path,
                    format!("'{}' is not a port, expected <port> or <port>/<tcp|udp|sctp>", s),
                )
            })?;
            let port = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok());
            let protocol = caps.get(2).map(|m| m.as_str().to_string());
            (to_port(port, path)?, protocol)
        }
        _ => return Err(ConfigError::schema(path, "port keys must be numbers or strings")),
    };

    let host_path = format!("{}.{}", path, container_port);
    let host_port = match value {
        Value::Number(n) => to_port(n.as_u64(), &host_path)?,
        _ => return Err(ConfigError::schema(host_path, "expected a host port number")),
    };

    Ok(PortMapping {
        container_port,
        protocol,
        host_port,
    })
}

fn to_port(raw: Option<u64>, path: &str) -> Result<u16, ConfigError> {
    raw.and_then(|n| u16::try_from(n).ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| ConfigError::schema(path, "port numbers must be between 1 and 65535"))
}

fn parse_sync(value: &Value, path: &str) -> Result<SyncSpec, ConfigError> {
    let (kind, rest) = split_discriminator(value, path)?;
    match kind.as_str() {
        "rsync" => {
            let raw: RawRsync = typed(&rest, path)?;
            Ok(SyncSpec::Rsync(RsyncSpec {
                options: raw.options,
                filter: raw.filter,
                include: raw.include,
                exclude: raw.exclude,
            }))
        }
        "mutagen" => match rest.as_mapping().and_then(|m| m.keys().next()) {
            Some(key) => Err(ConfigError::schema(
                format!("{}.{}", path, key_name(key, path)?),
                "unknown key",
            )),
            None => Ok(SyncSpec::Mutagen),
        },
        other => Err(ConfigError::schema(
            format!("{}.type", path),
            format!("unknown sync type '{}', expected 'rsync' or 'mutagen'", other),
        )),
    }
}

// --- HELPERS ---

/// Splits a `type`-tagged mapping into its tag and the remaining fields.
fn split_discriminator(value: &Value, path: &str) -> Result<(String, Value), ConfigError> {
    let map = value
        .as_mapping()
        .ok_or_else(|| ConfigError::schema(path, "expected a mapping"))?;
    let kind = required_string(map, "type", path)?;
    let mut rest = map.clone();
    rest.remove("type");
    Ok((kind, Value::Mapping(rest)))
}

fn typed<T: DeserializeOwned>(value: &Value, path: &str) -> Result<T, ConfigError> {
    serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::schema(path, e.to_string()))
}

fn key_name<'a>(key: &'a Value, path: &str) -> Result<&'a str, ConfigError> {
    key.as_str()
        .ok_or_else(|| ConfigError::schema(path, format!("keys must be strings, found {:?}", key)))
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn optional_string(map: &Mapping, key: &str, path: &str) -> Result<Option<String>, ConfigError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ConfigError::schema(child_path(path, key), "expected a string")),
    }
}

fn required_string(map: &Mapping, key: &str, path: &str) -> Result<String, ConfigError> {
    optional_string(map, key, path)?
        .ok_or_else(|| ConfigError::schema(child_path(path, key), "required key is missing"))
}

/// Like `scalar_to_string`, but booleans are accepted too (option defaults).
fn any_scalar(value: &Value, path: &str) -> Result<String, ConfigError> {
    match value {
        Value::Bool(b) => Ok(b.to_string()),
        other => scalar_to_string(other, path),
    }
}

/// Accepts strings and numbers, the way environment values and passwords are written.
fn scalar_to_string(value: &Value, path: &str) -> Result<String, ConfigError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ConfigError::schema(path, "expected a string or a number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Config, ConfigError> {
        let value: Value = serde_yaml::from_str(text).unwrap();
        validate(&value, PathBuf::from("/work"), ".".to_string())
    }

    fn schema_path(err: ConfigError) -> String {
        match err {
            ConfigError::Schema { path, .. } => path,
            other => panic!("Expected a schema error, got {:?}", other),
        }
    }

    const HEADER: &str = "version: '0.1.0'\nproject: demo\n";

    #[test]
    fn test_minimal_config() {
        let config = parse(HEADER).unwrap();
        assert_eq!(config.project, "demo");
        assert_eq!(config.version, Version::new(0, 1, 0));
        assert!(config.commands.is_empty());
        assert!(config.executors.is_empty());
        assert_eq!(config.default_command, None);
    }

    #[test]
    fn test_missing_project_and_bad_version() {
        let err = parse("version: '0.1.0'\n").unwrap_err();
        assert_eq!(schema_path(err), "project");

        let err = parse("version: 'one'\nproject: demo\n").unwrap_err();
        assert_eq!(schema_path(err), "version");
    }

    #[test]
    fn test_unknown_keys_are_rejected_with_path() {
        let err = parse(&format!("{}colour: red\n", HEADER)).unwrap_err();
        assert_eq!(schema_path(err), "colour");

        let err = parse(&format!(
            "{}commands:\n  build:\n    stepz: [make]\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(schema_path(err), "commands.build");
    }

    #[test]
    fn test_commands_and_steps() {
        let config = parse(&format!(
            "{}commands:\n  default: test\n  build:\n    help: Builds it\n    chdir: src\n    steps:\n      - make\n      - executor: ci\n        shell: bash\n        script: |\n          make\n          make test\n  test:\n    depends_on: [build]\n    steps: ['@ci make test']\n",
            HEADER
        ))
        .unwrap();

        assert_eq!(config.default_command.as_deref(), Some("test"));
        let build = config.command("build").unwrap();
        assert_eq!(build.help.as_deref(), Some("Builds it"));
        assert_eq!(build.chdir.as_deref(), Some("src"));
        assert_eq!(build.steps.len(), 2);
        assert_eq!(build.steps[0], StepSpec::Line("make".to_string()));
        match &build.steps[1] {
            StepSpec::Script { executor, shell, script } => {
                assert_eq!(executor.as_deref(), Some("ci"));
                assert_eq!(*shell, Some(Shell::Bash));
                assert!(script.contains("make test"));
            }
            other => panic!("Expected a script step, got {:?}", other),
        }
        assert_eq!(config.command("test").unwrap().depends_on, vec!["build"]);
    }

    #[test]
    fn test_default_command_precedence() {
        let sole = parse(&format!("{}commands:\n  only:\n    steps: [ls]\n", HEADER)).unwrap();
        assert_eq!(sole.default_command.as_deref(), Some("only"));

        let top = parse(&format!(
            "{}default_cmd: b\ncommands:\n  a: {{}}\n  b: {{}}\n",
            HEADER
        ))
        .unwrap();
        assert_eq!(top.default_command.as_deref(), Some("b"));

        let explicit = parse(&format!(
            "{}default_cmd: b\ncommands:\n  default: a\n  a: {{}}\n  b: {{}}\n",
            HEADER
        ))
        .unwrap();
        assert_eq!(explicit.default_command.as_deref(), Some("a"));
    }

    #[test]
    fn test_command_name_must_be_single_word() {
        let err = parse(&format!("{}commands:\n  'two words': {{}}\n", HEADER)).unwrap_err();
        assert_eq!(schema_path(err), "commands.two words");
    }

    #[test]
    fn test_command_options_in_all_three_forms() {
        // --- Execute ---
        let config = parse(&format!(
            "{}commands:\n  build:\n    options:\n      verbose:\n        flag: --verbose\n        short_name: -v\n        default: false\n      target:\n        argument: target\n        required: true\n        choices: [arm, x86]\n        variable: TARGET\n      jobs:\n        default: 4\n        help: Parallel jobs\n    steps: [make]\n",
            HEADER
        ))
        .unwrap();

        // --- Assert ---
        let options = &config.command("build").unwrap().options;
        assert_eq!(options.len(), 3);

        let verbose = &options[0];
        assert_eq!(verbose.kind, OptionKind::Flag("--verbose".to_string()));
        assert_eq!(verbose.short_name.as_deref(), Some("-v"));
        assert_eq!(verbose.default.as_deref(), Some("false"));

        let target = &options[1];
        assert_eq!(target.kind, OptionKind::Argument("target".to_string()));
        assert!(target.required);
        assert_eq!(target.choices, vec!["arm", "x86"]);
        assert_eq!(target.variable.as_deref(), Some("TARGET"));

        let jobs = &options[2];
        assert_eq!(jobs.kind, OptionKind::Option("--jobs".to_string()));
        assert_eq!(jobs.default.as_deref(), Some("4"));
        assert_eq!(jobs.help.as_deref(), Some("Parallel jobs"));
    }

    #[test]
    fn test_invalid_command_options() {
        let two_kinds = parse(&format!(
            "{}commands:\n  build:\n    options:\n      x:\n        flag: --x\n        argument: x\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(schema_path(two_kinds), "commands.build.options.x");

        let required_flag = parse(&format!(
            "{}commands:\n  build:\n    options:\n      x:\n        flag: --x\n        required: true\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(schema_path(required_flag), "commands.build.options.x");

        let short_argument = parse(&format!(
            "{}commands:\n  build:\n    options:\n      x:\n        argument: x\n        short_name: -x\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(
            schema_path(short_argument),
            "commands.build.options.x.short_name"
        );

        let unknown_key = parse(&format!(
            "{}commands:\n  build:\n    options:\n      x:\n        metavar: X\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(schema_path(unknown_key), "commands.build.options.x");
    }

    #[test]
    fn test_step_with_executor_but_no_command_is_rejected() {
        let err = parse(&format!(
            "{}commands:\n  build:\n    steps: [make, '@ci', '@ci  ']\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(schema_path(err), "commands.build.steps[1]");
    }

    #[test]
    fn test_unknown_shell_is_rejected() {
        let err = parse(&format!(
            "{}commands:\n  x:\n    steps:\n      - shell: fish\n        script: ls\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(schema_path(err), "commands.x.steps[0].shell");
    }

    #[test]
    fn test_docker_executor_full() {
        let config = parse(&format!(
            "{}executors:\n  default: ci\n  ci:\n    type: docker\n    image: alpine:3.19\n    platform: linux\n    env:\n      A: one\n      B: 2\n    ports:\n      80: 8080\n      53/udp: 5353\n    mac_address: '02:42:ac:11:00:02'\n    devices: [/dev/ttyUSB0]\n    sync:\n      type: rsync\n      exclude: [target]\n    prepare: [apk add make]\n    default_shell: sh\n    help: CI box\n",
            HEADER
        ))
        .unwrap();

        assert_eq!(config.default_executor.as_deref(), Some("ci"));
        let ci = config.executor("ci").unwrap();
        assert_eq!(ci.help.as_deref(), Some("CI box"));
        let BackendSpec::Container(spec) = &ci.backend else {
            panic!("Expected a container backend");
        };
        assert_eq!(spec.source, ImageSource::Image(ImageRef::new("alpine", "3.19")));
        assert_eq!(spec.env.get("B").map(String::as_str), Some("2"));
        assert_eq!(spec.ports.len(), 2);
        assert_eq!(spec.ports[0].to_publish_arg(), "8080:80");
        assert_eq!(spec.ports[1].to_publish_arg(), "5353:53/udp");
        assert_eq!(spec.devices, vec!["/dev/ttyUSB0"]);
        assert_eq!(spec.default_shell, Some(Shell::Sh));
        match &spec.sync {
            Some(SyncSpec::Rsync(rsync)) => assert_eq!(rsync.exclude, vec!["target"]),
            other => panic!("Expected rsync, got {:?}", other),
        }
    }

    #[test]
    fn test_image_defaults_to_latest_tag() {
        let config = parse(&format!(
            "{}executors:\n  ci:\n    type: docker\n    image: ubuntu\n",
            HEADER
        ))
        .unwrap();
        let BackendSpec::Container(spec) = &config.executors[0].backend else {
            panic!("Expected a container backend");
        };
        assert_eq!(spec.source, ImageSource::Image(ImageRef::new("ubuntu", "latest")));
        assert_eq!(spec.platform, "linux");
    }

    #[test]
    fn test_image_and_dockerfile_are_exclusive() {
        let both = parse(&format!(
            "{}executors:\n  ci:\n    type: docker\n    image: a\n    dockerfile: Dockerfile\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(schema_path(both), "executors.ci");

        let neither = parse(&format!("{}executors:\n  ci:\n    type: docker\n", HEADER)).unwrap_err();
        assert_eq!(schema_path(neither), "executors.ci");
    }

    #[test]
    fn test_invalid_docker_fields() {
        let mac = parse(&format!(
            "{}executors:\n  ci:\n    type: docker\n    image: a\n    mac_address: nope\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(schema_path(mac), "executors.ci.mac_address");

        let port = parse(&format!(
            "{}executors:\n  ci:\n    type: docker\n    image: a\n    ports:\n      80/icmp: 1\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(schema_path(port), "executors.ci.ports");

        let env = parse(&format!(
            "{}executors:\n  ci:\n    type: docker\n    image: a\n    env:\n      FLAG: true\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(schema_path(env), "executors.ci.env.FLAG");
    }

    #[test]
    fn test_sync_types() {
        let mutagen = parse(&format!(
            "{}executors:\n  ci:\n    type: docker\n    image: a\n    sync:\n      type: mutagen\n",
            HEADER
        ))
        .unwrap();
        let BackendSpec::Container(spec) = &mutagen.executors[0].backend else {
            panic!("Expected a container backend");
        };
        assert_eq!(spec.sync, Some(SyncSpec::Mutagen));

        let unknown = parse(&format!(
            "{}executors:\n  ci:\n    type: docker\n    image: a\n    sync:\n      type: nfs\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(schema_path(unknown), "executors.ci.sync.type");
    }

    #[test]
    fn test_ssh_executor_with_numeric_password() {
        let config = parse(&format!(
            "{}executors:\n  remote:\n    type: ssh\n    host: build.local:2222\n    username: me\n    password: 1234\n",
            HEADER
        ))
        .unwrap();
        let BackendSpec::Remote(spec) = &config.executors[0].backend else {
            panic!("Expected a remote backend");
        };
        assert_eq!(spec.host, "build.local:2222");
        assert_eq!(spec.username.as_deref(), Some("me"));
        assert_eq!(spec.password.as_deref(), Some("1234"));
    }

    #[test]
    fn test_executor_type_and_names() {
        let unknown = parse(&format!("{}executors:\n  x:\n    type: vm\n", HEADER)).unwrap_err();
        assert_eq!(schema_path(unknown), "executors.x.type");

        let missing = parse(&format!("{}executors:\n  x:\n    image: a\n", HEADER)).unwrap_err();
        assert_eq!(schema_path(missing), "executors.x.type");

        let reserved = parse(&format!(
            "{}executors:\n  host:\n    type: ssh\n    host: h\n",
            HEADER
        ))
        .unwrap_err();
        assert_eq!(schema_path(reserved), "executors.host");
    }
}
