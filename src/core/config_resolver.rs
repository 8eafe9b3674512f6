// src/core/config_resolver.rs

//! # Config Resolver
//!
//! Turns the directory a user invoked brock from into a validated `Config`:
//!
//! 1. **Discovery:** every directory from the filesystem root down to the
//!    invocation directory is checked for one of the accepted file names.
//! 2. **Merge:** the files are layered root-to-leaf, so a directory-local file
//!    overrides or extends what its ancestors declare.
//! 3. **Validation:** the merged tree goes through `core::schema`.
//! 4. **Version gate:** the config may not require a newer brock than this one.

use crate::{
    constants::CONFIG_FILE_NAMES,
    core::schema,
    models::{Config, Version},
};
use serde_yaml::Value;
use std::{
    fs,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No config file ({names}) found in '{dir}' or parent directories")]
    NotFound { names: String, dir: String },
    #[error("Multiple brock config files found in '{dir}'")]
    Ambiguous { dir: String },
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to process config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Failed to process config files: cannot merge {found} into {expected} at '{path}'")]
    MergeConflict {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Invalid config file: Config file is empty")]
    Empty,
    #[error("Invalid config file: '{path}': {message}")]
    Schema { path: String, message: String },
    #[error(
        "Current config requires brock of version at least {required}, you are using {running}"
    )]
    VersionMismatch { required: Version, running: Version },
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
    #[error("Unknown executor '{0}'")]
    UnknownExecutor(String),
    #[error("No default executor defined; prefix the step with '@<executor>' or set 'executors.default'")]
    NoDefaultExecutor,
    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),
    #[error("Shell must be specified for a script step on executor '{0}'")]
    ShellNotSpecified(String),
    #[error("Unsupported sync type '{kind}' for executor '{executor}'")]
    UnsupportedSync { executor: String, kind: String },
}

impl ConfigError {
    pub(crate) fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// The result of scanning the directory chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Matching files, root-most first.
    pub files: Vec<PathBuf>,
    /// Directory of the root-most file.
    pub base_dir: PathBuf,
    /// The canonical invocation directory.
    pub work_dir: PathBuf,
    /// `work_dir` relative to `base_dir`, `/`-separated.
    pub work_dir_rel: String,
}

/// Discovers, merges and validates configuration layers.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    file_names: Vec<String>,
    tool_version: Version,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self {
            file_names: CONFIG_FILE_NAMES.iter().map(|s| s.to_string()).collect(),
            tool_version: Version::current(),
        }
    }

    /// Replaces the accepted file names.
    pub fn with_file_names(mut self, names: &[&str]) -> Self {
        self.file_names = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Gates against `version` instead of the version of this build.
    pub fn with_tool_version(mut self, version: Version) -> Self {
        self.tool_version = version;
        self
    }

    /// Runs the whole pipeline for an invocation from `start`.
    pub fn resolve(&self, start: &Path) -> Result<Config, ConfigError> {
        let discovery = self.discover(start)?;
        self.resolve_files(&discovery.files, discovery.base_dir, discovery.work_dir_rel)
    }

    /// Merges and validates an explicit list of files, root-most first.
    pub fn resolve_files(
        &self,
        files: &[PathBuf],
        base_dir: PathBuf,
        work_dir_rel: String,
    ) -> Result<Config, ConfigError> {
        log::info!("Merging {} config file(s)", files.len());
        let merged = self.load(files)?;
        log::debug!("Merged config: {:?}", merged);

        let config = schema::validate(&merged, base_dir, work_dir_rel)?;
        check_version(config.version, self.tool_version)?;
        Ok(config)
    }

    /// Collects every accepted config file from the filesystem root down to `start`.
    ///
    /// # Errors
    /// `Ambiguous` when one directory holds more than one accepted name,
    /// `NotFound` when the whole chain holds none.
    pub fn discover(&self, start: &Path) -> Result<Discovery, ConfigError> {
        let work_dir = dunce::canonicalize(start).map_err(|e| ConfigError::Io {
            path: to_slash(start),
            source: e,
        })?;
        log::info!("Scanning config files, work dir: {}", to_slash(&work_dir));

        let mut levels: Vec<&Path> = work_dir.ancestors().collect();
        levels.reverse();

        let mut files = Vec::new();
        for dir in levels {
            let found: Vec<PathBuf> = self
                .file_names
                .iter()
                .map(|name| dir.join(name))
                .filter(|path| path.is_file())
                .collect();

            if found.len() > 1 {
                return Err(ConfigError::Ambiguous { dir: to_slash(dir) });
            }
            for path in &found {
                log::debug!("Found config file: {}", to_slash(path));
            }
            files.extend(found);
        }

        let base_dir = files
            .first()
            .and_then(|first| first.parent())
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::NotFound {
                names: self.file_names.join(", "),
                dir: to_slash(&work_dir),
            })?;

        let work_dir_rel = relative_work_dir(&base_dir, &work_dir);
        log::debug!(
            "Base dir: {}, relative work dir: {}",
            to_slash(&base_dir),
            work_dir_rel
        );

        Ok(Discovery {
            files,
            base_dir,
            work_dir,
            work_dir_rel,
        })
    }

    /// Reads and merges `files` root-to-leaf into one YAML tree.
    pub fn load(&self, files: &[PathBuf]) -> Result<Value, ConfigError> {
        let mut merged = Value::Null;
        for path in files {
            let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: to_slash(path),
                source: e,
            })?;
            let layer: Value = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: to_slash(path),
                source: e,
            })?;
            // An empty document contributes nothing.
            if layer.is_null() {
                continue;
            }
            merge_layers(&mut merged, layer, "")?;
        }

        let is_empty = match &merged {
            Value::Null => true,
            Value::Mapping(map) => map.is_empty(),
            _ => false,
        };
        if is_empty {
            return Err(ConfigError::Empty);
        }
        Ok(merged)
    }
}

/// Layers `overlay` on top of `base`.
///
/// Mappings merge key by key. Sequences are appended to, skipping items the
/// base already holds. Scalars and nulls from the overlay replace what was
/// there. A mapping or sequence cannot replace a value of a different
/// (non-null) kind.
pub fn merge_layers(base: &mut Value, overlay: Value, path: &str) -> Result<(), ConfigError> {
    match (base, overlay) {
        (Value::Sequence(base_items), Value::Sequence(overlay_items)) => {
            for item in overlay_items {
                if !base_items.contains(&item) {
                    base_items.push(item);
                }
            }
            Ok(())
        }
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                let child_path = join_key(path, &key);
                match base_map.get_mut(&key) {
                    Some(existing) => merge_layers(existing, value, &child_path)?,
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
            Ok(())
        }
        (base @ Value::Null, overlay) => {
            *base = overlay;
            Ok(())
        }
        (base, overlay @ (Value::Mapping(_) | Value::Sequence(_)))
            if kind_of(base) != kind_of(&overlay) =>
        {
            Err(ConfigError::MergeConflict {
                path: if path.is_empty() {
                    "(root)".to_string()
                } else {
                    path.to_string()
                },
                expected: kind_of(base),
                found: kind_of(&overlay),
            })
        }
        (base, overlay) => {
            *base = overlay;
            Ok(())
        }
    }
}

/// Fails when the config requires a newer tool than `running`.
///
/// Versions compare component-wise, major first: a strictly lower component
/// settles the comparison, a strictly higher one fails it.
pub fn check_version(required: Version, running: Version) -> Result<(), ConfigError> {
    if required > running {
        return Err(ConfigError::VersionMismatch { required, running });
    }
    Ok(())
}

/// `work_dir` relative to the common prefix it shares with `base_dir`.
pub fn relative_work_dir(base_dir: &Path, work_dir: &Path) -> String {
    let base: Vec<Component<'_>> = base_dir.components().collect();
    let common = work_dir
        .components()
        .zip(base.iter())
        .take_while(|(a, b)| a == *b)
        .count();

    let rest: Vec<String> = work_dir
        .components()
        .skip(common)
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    if rest.is_empty() {
        ".".to_string()
    } else {
        rest.join("/")
    }
}

/// Renders a path with forward slashes regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn join_key(path: &str, key: &Value) -> String {
    let key = match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "?".to_string()),
    };
    if path.is_empty() {
        key
    } else {
        format!("{}.{}", path, key)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
