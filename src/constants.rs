// src/constants.rs

/// Accepted configuration file names, checked in this order in every directory.
pub const CONFIG_FILE_NAMES: &[&str] = &[".brock.yml", "brock.yml", ".brock.yaml", "brock.yaml"];

/// Name of the implicit executor that runs commands on the local machine.
pub const HOST_EXECUTOR_NAME: &str = "host";

/// Reserved key selecting the default entry in `commands` and `executors`.
pub const DEFAULT_KEY: &str = "default";

/// Prefix of every container, volume and image name created by brock.
pub const CONTAINER_NAME_PREFIX: &str = "brock";

/// Where the host workspace (or its synced copy) is mounted inside containers.
pub const HOST_MOUNT_PATH: &str = "/host";

/// Image of the sidecar container used for rsync based workspace mirroring.
pub const RSYNC_IMAGE_NAME: &str = "eeacms/rsync";
pub const RSYNC_IMAGE_TAG: &str = "2.3";
pub const RSYNC_PLATFORM: &str = "linux";

/// Mount point of the sync volume inside the rsync sidecar.
pub const RSYNC_VOLUME_PATH: &str = "/rsync_volume";

/// Default platform for container executors that do not set one.
pub const DEFAULT_PLATFORM: &str = "linux";

/// Tag used when an image reference does not carry one.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

// --- Exit codes for tool failures (step exit codes propagate unchanged) ---

/// Missing, ambiguous or invalid configuration.
pub const CONFIG_ERROR_CODE: i32 = 10;
/// Invalid invocation (missing argument, bad combination of flags).
pub const USAGE_ERROR_CODE: i32 = 11;
/// An executor or its backing engine failed.
pub const EXECUTOR_ERROR_CODE: i32 = 12;
/// The user interrupted a running command.
pub const INTERRUPTED_CODE: i32 = 130;
