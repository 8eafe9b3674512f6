// src/error.rs

use crate::{
    constants::{CONFIG_ERROR_CODE, EXECUTOR_ERROR_CODE, INTERRUPTED_CODE, USAGE_ERROR_CODE},
    executors::ExecutorError,
};
use thiserror::Error;

pub use crate::core::config_resolver::ConfigError;

/// Every way a brock invocation can fail as a tool.
///
/// A step that exits non-zero is not an error: its code travels in `Ok(code)`.
#[derive(Error, Debug)]
pub enum BrockError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl BrockError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// The process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => CONFIG_ERROR_CODE,
            Self::Usage(_) => USAGE_ERROR_CODE,
            Self::Executor(e) if e.is_interrupted() => INTERRUPTED_CODE,
            Self::Executor(_) => EXECUTOR_ERROR_CODE,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Executor(e) if e.is_interrupted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_per_kind() {
        assert_eq!(BrockError::from(ConfigError::Empty).exit_code(), 10);
        assert_eq!(BrockError::usage("no").exit_code(), 11);
        assert_eq!(
            BrockError::from(ExecutorError::Unsupported {
                executor: "host".into(),
                operation: "shell",
            })
            .exit_code(),
            12
        );

        let interrupted = BrockError::from(ExecutorError::Interrupted);
        assert!(interrupted.is_interrupted());
        assert_eq!(interrupted.exit_code(), 130);
    }
}
