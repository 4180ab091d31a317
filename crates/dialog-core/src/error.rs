use thiserror::Error;

/// Result type for dialog operations
pub type DialogResult<T> = Result<T, DialogError>;

/// Errors raised by a [`Dialog`](crate::Dialog)
#[derive(Error, Debug)]
pub enum DialogError {
    /// Connecting the underlying transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] sipbell_sip_transport::Error),

    /// A reply was requested before any request arrived
    #[error("No request received on this dialog to reply to")]
    NoRequest,

    /// The dialog no longer has a writer
    #[error("Dialog is closed")]
    Closed,
}
