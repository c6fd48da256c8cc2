//! Error types for connector operations.
//!
//! Connector errors are transport-level: the target could not be reached,
//! a process could not be created, or a file could not be moved. A command
//! that runs and exits non-zero is not an error here; it is a normal
//! [`ExecOutput`](crate::ExecOutput) with a non-zero exit code.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while driving an execution target.
#[derive(Debug, Error)]
pub enum Error {
    /// A process could not be created on the target
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// The command that could not be started
        command: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// A file transfer between host and target failed
    #[error("failed to transfer {from} -> {to}: {source}")]
    Transfer {
        /// Source path of the transfer
        from: PathBuf,
        /// Destination path of the transfer
        to: PathBuf,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// A persistent session's shell went away or its pipes closed
    #[error("persistent session '{session}' is no longer usable: {message}")]
    SessionBroken {
        /// Name of the session
        session: String,
        /// What went wrong
        message: String,
    },

    /// The connector kind does not support the requested capability
    #[error("{kind} connectors do not support {capability}")]
    Unsupported {
        /// Kind of the connector that rejected the request
        kind: String,
        /// The capability that was requested
        capability: &'static str,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, Error>;
