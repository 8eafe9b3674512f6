// src/core/mod.rs

pub mod command;
pub mod config_resolver;
pub mod console;
pub mod project;
pub mod schema;
