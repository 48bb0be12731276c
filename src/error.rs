use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::engine::Operation;
use crate::plan::Action;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Operation '{op}' is not available while the engine is {state}")]
    Disabled { op: Operation, state: &'static str },

    #[error("Plan actions can only be changed while the plan is ready (engine is {0})")]
    NotReady(&'static str),

    #[error("No plan item at index {0}")]
    NoSuchItem(usize),

    #[error("Action '{0}' cannot be assigned to a plan item")]
    InvalidAction(Action),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Transcript line {line}: {source}")]
    Transcript {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_message_names_operation_and_state() {
        let err = DriverError::Disabled {
            op: Operation::Sync,
            state: "propagating updates",
        };
        assert_eq!(
            err.to_string(),
            "Operation 'sync' is not available while the engine is propagating updates"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let err: DriverError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert!(matches!(err, DriverError::Io(_)));
        assert!(err.to_string().contains("pipe closed"));
    }
}
