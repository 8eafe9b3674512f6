// src/core/console.rs

//! User facing output.
//!
//! A `Console` is built once in `main` from the verbosity and color flags and
//! handed by value to everything that prints. Diagnostics that only matter
//! when debugging brock itself go through the `log` macros instead.

use colored::Colorize;

/// How much of brock's own narration is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    #[default]
    Info,
    ExtraInfo,
    Debug,
}

impl Verbosity {
    /// Maps the `-v` count to a level.
    pub fn from_occurrences(count: u8) -> Self {
        match count {
            0 => Self::Info,
            1 => Self::ExtraInfo,
            _ => Self::Debug,
        }
    }

    /// Default `env_logger` filter matching this level.
    pub fn log_filter(self) -> &'static str {
        match self {
            Self::Info => "warn",
            Self::ExtraInfo => "info",
            Self::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Console {
    verbosity: Verbosity,
    color: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(Verbosity::Info, true)
    }
}

impl Console {
    pub fn new(verbosity: Verbosity, color: bool) -> Self {
        Self { verbosity, color }
    }

    /// A console that prints nothing but child output; used by tests.
    pub fn plain() -> Self {
        Self::new(Verbosity::Info, false)
    }

    pub fn info(&self, message: &str) {
        println!("{}", self.paint(&format!(">> {}", message), Tone::Green));
    }

    /// Shown from `-v` on.
    pub fn extra_info(&self, message: &str) {
        if self.verbosity >= Verbosity::ExtraInfo {
            println!("{}", self.paint(&format!(">> {}", message), Tone::Green));
        }
    }

    /// Shown from `-vv` on.
    pub fn debug(&self, message: &str) {
        if self.verbosity >= Verbosity::Debug {
            println!("{}", self.paint(&format!(">> {}", message), Tone::Cyan));
        }
    }

    pub fn warning(&self, message: &str) {
        println!("{}", self.paint(&format!(">> {}", message), Tone::Yellow));
    }

    pub fn error(&self, message: &str) {
        eprintln!("{}", self.paint(&format!(">> {}", message), Tone::Red));
    }

    /// Forwards one line of child stdout.
    pub fn stdout(&self, line: &str) {
        println!("{}", line);
    }

    /// Forwards one line of child stderr.
    pub fn stderr(&self, line: &str) {
        eprintln!("{}", line);
    }

    fn paint(&self, text: &str, tone: Tone) -> String {
        if !self.color {
            return text.to_string();
        }
        match tone {
            Tone::Green => text.green().to_string(),
            Tone::Cyan => text.cyan().to_string(),
            Tone::Yellow => text.yellow().bold().to_string(),
            Tone::Red => text.red().bold().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Tone {
    Green,
    Cyan,
    Yellow,
    Red,
}
