//! Error types for the pangenomer library.

use thiserror::Error;

/// Errors that can occur while formatting inputs, running tools, or assembling a pangenome.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A JSON document could not be read or written.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A parse error occurred while reading input data.
    #[error("{0}")]
    Parse(String),

    /// A validation constraint was violated.
    #[error("{0}")]
    Validation(String),

    /// A file format error was detected.
    #[error("{0}")]
    Format(String),

    /// An identifier referenced by one table is absent from another.
    #[error("{key} not found in {table}")]
    Lookup { table: String, key: String },

    /// An external tool could not be started or exited unsuccessfully.
    #[error("error running command `{command}`: {reason}")]
    Tool { command: String, reason: String },
}

impl Error {
    pub fn lookup(table: &str, key: &str) -> Self {
        Error::Lookup {
            table: table.to_string(),
            key: key.to_string(),
        }
    }
}
