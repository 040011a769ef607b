use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

/// Errors that stop a configuration file from loading at all.
///
/// Problems with individual remap entries are not errors: those entries are
/// collected in [`Config::rejected`](crate::Config::rejected) and skipped.
#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Failed to parse KDL")]
    #[diagnostic(code(multikeys::config::parse_error))]
    ParseError {
        #[source_code]
        src: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source]
        source: kdl::KdlError,
    },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(multikeys::config::invalid))]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    #[diagnostic(code(multikeys::config::missing_field))]
    MissingField { field: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Line/column position of a node in the config source (1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub len: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize, offset: usize, len: usize) -> Self {
        Self {
            line,
            column,
            offset,
            len,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A remap entry that was skipped while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryProblem {
    /// Identifier of the device the entry belongs to
    pub device: String,
    /// Node name as written (e.g. "virtual")
    pub node: String,
    pub location: SourceLocation,
    pub message: String,
}

impl fmt::Display for EntryProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (device '{}', `{}` entry): {}",
            self.location, self.device, self.node, self.message
        )
    }
}
