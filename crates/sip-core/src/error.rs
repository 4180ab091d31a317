use std::io;
use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SIP message handling
#[derive(Error, Debug)]
pub enum Error {
    /// A well-known header is absent
    #[error("Missing SIP header: {0}")]
    MissingHeader(&'static str),

    /// A header is present but its value cannot be interpreted
    #[error("Invalid SIP header {name}: {value:?}")]
    InvalidHeader {
        /// Header name
        name: &'static str,
        /// Raw header value
        value: String,
    },

    /// WWW-Authenticate value that cannot be parsed into a challenge
    #[error("Invalid authentication challenge: {0}")]
    InvalidChallenge(String),

    /// A background task ended abnormally
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Input/output error while reading a stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
