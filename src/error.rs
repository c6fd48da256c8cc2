//! Error types for document runs.
//!
//! Only a handful of conditions abort a run: a declared variable with no
//! binding, a malformed failure condition, a streamed command aimed at a
//! non-local target, and a failed final move while placing a file. Everything
//! else an operation can get wrong is data - a failed
//! [`OpResult`](crate::report::OpResult) recorded in the run report.

use thiserror::Error;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum Error {
    /// A unit declared a variable that the caller did not bind
    #[error("variable \"{name}\" is not provided")]
    MissingVariable {
        /// Name of the unbound variable
        name: String,
    },

    /// A unit's failure condition could not be parsed
    #[error("invalid failure condition `{expr}`: {reason}")]
    FailCondition {
        /// The offending expression text
        expr: String,
        /// Why it did not parse
        reason: String,
    },

    /// A streamed command was requested against a non-local target
    #[error("only local targets support streamed commands (target is {kind})")]
    StreamUnsupported {
        /// Kind of the rejecting connector
        kind: String,
    },

    /// Placing a file staged cleanly but the final move/chmod exited non-zero
    #[error("failed to install {location}: {stderr}")]
    Place {
        /// Destination the file was being moved into
        location: String,
        /// Stderr of the failed move or chmod
        stderr: String,
    },

    /// A single-unit run named an index outside the document
    #[error("no unit at index {index}; document has {count} units")]
    NoSuchUnit {
        /// The requested index
        index: usize,
        /// How many units the document has
        count: usize,
    },

    /// Transport-level connector failure
    #[error(transparent)]
    Connector(#[from] connectors::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rendered-document parse error
    #[error("invalid document: {0}")]
    Document(#[from] serde_json::Error),
}

/// Result type for run operations.
pub type Result<T> = std::result::Result<T, Error>;
