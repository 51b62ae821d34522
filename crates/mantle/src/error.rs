//! Error types for tree setup, resolution, parsing and dispatch.
//!
//! Configuration and dependency errors are programming mistakes by the
//! command author and are meant to fail loudly. Parse errors come from user
//! input and become a one-line diagnostic plus a nonzero exit code. Errors
//! raised by handlers and middleware pass through untouched.

use thiserror::Error;

/// Exit code used for command-line (argument parsing) failures.
pub const CMDLINE_ERROR_CODE: i32 = 1;

/// Error type for every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Tree misconfiguration: missing handler, duplicate binding, unknown path,
    /// invalid name, or a middleware that failed to supply what it declared.
    #[error("configuration error: {0}")]
    Config(String),

    /// A handler or middleware requires a name nothing outside it provides.
    #[error("unresolved dependency {name:?} required by {layer} (command path: {path:?})")]
    UnresolvedDependency {
        /// The missing name
        name: String,
        /// Description of the layer that needed it
        layer: String,
        /// Dot-separated command path being resolved
        path: String,
    },

    /// Two sources claim the same injectable name.
    #[error("name conflict: {0}")]
    Conflict(String),

    /// Argument parsing failed; the message has already been reported.
    #[error("{message}")]
    CommandLine {
        /// The user-facing diagnostic
        message: String,
        /// Process exit code to use
        code: i32,
    },

    /// An error raised by a handler or middleware.
    #[error(transparent)]
    Handler(anyhow::Error),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict(message.into())
    }

    /// Returns true for errors raised by user handler or middleware code.
    pub fn is_handler_error(&self) -> bool {
        matches!(self, Error::Handler(_))
    }

    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CommandLine { code, .. } => *code,
            _ => 1,
        }
    }
}

/// Recovers crate errors that travelled through a pipeline as `anyhow::Error`,
/// wrapping everything else as a handler error.
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(other) => Error::Handler(other),
        }
    }
}

/// Failure reported by the argument parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    /// Human-readable description of the problem
    pub message: String,
    /// The subcommand path reached before parsing failed
    pub subcmds: Vec<String>,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, subcmds: Vec<String>) -> Self {
        Self {
            message: message.into(),
            subcmds,
        }
    }
}
