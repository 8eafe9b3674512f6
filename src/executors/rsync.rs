// src/executors/rsync.rs

//! Argument lists for the rsync sidecar.
//!
//! The sidecar sees the host workspace at `/host` and the shared volume at
//! `/rsync_volume`. Inbound mirrors the whole workspace into the volume;
//! outbound copies back only the invocation subtree.

use crate::{
    constants::{HOST_MOUNT_PATH, RSYNC_VOLUME_PATH},
    models::RsyncSpec,
};

/// Host workspace → volume.
pub fn inbound(spec: &RsyncSpec) -> Vec<String> {
    argv(spec, HOST_MOUNT_PATH, RSYNC_VOLUME_PATH)
}

/// Volume → host workspace, limited to `work_dir_rel`.
pub fn outbound(spec: &RsyncSpec, work_dir_rel: &str) -> Vec<String> {
    argv(
        spec,
        &format!("{}/{}", RSYNC_VOLUME_PATH, work_dir_rel),
        &format!("{}/{}", HOST_MOUNT_PATH, work_dir_rel),
    )
}

/// `rsync -a --delete [options] [--filter ..] [--include ..] [--exclude ..] <src>/ <dest>`.
///
/// Includes come before excludes since rsync applies the first matching rule.
fn argv(spec: &RsyncSpec, src: &str, dest: &str) -> Vec<String> {
    let mut args = vec!["rsync".to_string(), "-a".to_string(), "--delete".to_string()];
    args.extend(spec.options.iter().cloned());
    for rule in &spec.filter {
        args.extend(["--filter".to_string(), rule.clone()]);
    }
    for pattern in &spec.include {
        args.extend(["--include".to_string(), pattern.clone()]);
    }
    for pattern in &spec.exclude {
        args.extend(["--exclude".to_string(), pattern.clone()]);
    }
    args.push(format!("{}/", src.trim_end_matches('/')));
    args.push(dest.to_string());
    args
}
