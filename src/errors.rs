// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::ProcessId;

#[derive(Error, Debug)]
pub enum ProcregError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// The process could not be created; no handle exists for it.
    #[error("failed to spawn '{executable}': {reason}")]
    SpawnError { executable: String, reason: String },

    #[error("Process not found: {0}")]
    ProcessNotFound(ProcessId),

    #[error("Process {0} has already exited")]
    AlreadyExited(ProcessId),

    /// Signal delivery failed; the handle keeps its previous status.
    #[error("failed to terminate process {id}: {reason}")]
    TerminateError { id: ProcessId, reason: String },

    #[error("invalid clock value: {0}")]
    FormatError(String),
}

impl ProcregError {
    pub(crate) fn spawn(executable: impl Into<String>, reason: impl Into<String>) -> Self {
        ProcregError::SpawnError {
            executable: executable.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn terminate(id: ProcessId, reason: impl Into<String>) -> Self {
        ProcregError::TerminateError {
            id,
            reason: reason.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProcregError>;
