//! # System Interaction Layer
//!
//! Boundaries between brock and the programs it drives. Nothing in here knows
//! about projects or commands.
//!
//! ## Modules
//!
//! - **`process`**: Spawns local processes with inherited or captured output,
//!   polls the cancellation token while waiting and kills the child on `Ctrl+C`.
//! - **`docker`**: The `ContainerEngine` trait and its implementation on top of
//!   the `docker` CLI (images, containers, volumes, `exec`).
//! - **`ssh`**: The `RemoteShell` trait and its OpenSSH implementation, one
//!   connection per command.

pub mod docker;
pub mod process;
pub mod ssh;
