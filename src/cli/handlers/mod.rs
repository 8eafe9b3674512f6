// src/cli/handlers/mod.rs

// One module per CLI action.

pub mod commons;
pub mod exec;
pub mod init;
pub mod list;
pub mod raw;
pub mod restart;
pub mod shell;
pub mod start;
pub mod status;
pub mod stop;
