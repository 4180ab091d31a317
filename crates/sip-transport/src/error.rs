use std::io;
use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SIP transport operations
#[derive(Error, Debug)]
pub enum Error {
    /// Transport name other than "tcp"
    #[error("Unsupported transport: {0:?}")]
    UnsupportedTransport(String),

    /// Server socket could not be bound
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Outbound connection could not be established
    #[error("Failed to connect to {address}: {source}")]
    ConnectFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Other I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
