//! Error types for the client-core library
//!
//! # Error Categories
//!
//! - **Transport errors** - binding, connecting, or the connection closing
//!   underneath a registration; fatal to the operation that hit them
//! - **Authentication errors** - the registrar demanded credentials that were
//!   missing, wrong, or of an unsupported scheme
//! - **Protocol errors** - the peer sent something the registration cannot
//!   follow (a request, a response without a usable CSeq)
//! - **Rejections** - any other final status from the registrar
//!
//! # Handling registration failures
//!
//! ```rust,no_run
//! # use sipbell_client_core::{Client, RegistrationOutcome};
//! # use sipbell_client_core::RegisterInfo;
//! # async fn example(client: Client, info: RegisterInfo) {
//! match client.try_register(&info).await {
//!     RegistrationOutcome::Okay => println!("registered"),
//!     RegistrationOutcome::Unauthorized(Some(e)) if e.is_auth_error() => {
//!         eprintln!("check username and password: {}", e);
//!     }
//!     outcome => eprintln!("registration failed: {:?}", outcome.error()),
//! }
//! # }
//! ```

use std::time::Duration;

use sipbell_dialog_core::DialogError;
use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by the client layer
#[derive(Error, Debug)]
pub enum ClientError {
    /// Binding or connecting failed
    #[error("Transport error: {0}")]
    Transport(#[from] sipbell_sip_transport::Error),

    #[error("Dialog error: {0}")]
    Dialog(#[from] DialogError),

    #[error("SIP error: {0}")]
    Core(#[from] sipbell_sip_core::Error),

    /// A listener with the same transport, host and port already exists
    #[error("Already listening on {key}")]
    DuplicateListener { key: String },

    /// The registrar asked for credentials and none were configured
    #[error("authorization required but not provided")]
    AuthorizationRequired,

    /// The registrar refused the digest answer
    #[error("Registrar rejected the credentials")]
    CredentialsRejected,

    #[error("Unsupported authentication scheme: {scheme}")]
    UnsupportedChallenge { scheme: String },

    /// The peer sent something out of sequence
    #[error("Protocol desync: {reason}")]
    ProtocolDesync { reason: String },

    /// A final response whose CSeq cannot be read
    #[error("Malformed CSeq in response: {0}")]
    MalformedCSeq(#[source] sipbell_sip_core::Error),

    /// Final status other than 2xx or 401
    #[error("Registrar answered {code} {reason}")]
    Rejected { code: u16, reason: String },

    /// The connection closed while a response was awaited
    #[error("Connection closed before a final response")]
    ConnectionClosed,

    #[error("No final response within {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Check if error is an authentication failure
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ClientError::AuthorizationRequired
                | ClientError::CredentialsRejected
                | ClientError::UnsupportedChallenge { .. }
        )
    }

    /// Check if error comes from the connection rather than the registrar
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_)
                | ClientError::Dialog(DialogError::Transport(_))
                | ClientError::Dialog(DialogError::Closed)
                | ClientError::ConnectionClosed
                | ClientError::Timeout(_)
        )
    }
}
