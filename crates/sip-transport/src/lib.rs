//! SIP transport layer for the sipbell stack
//!
//! This crate provides the TCP listener with its accept loop and the
//! outbound connector used by dialogs.

pub mod connection;
pub mod error;
pub mod listener;

// Re-export commonly used types and functions
pub use connection::{connect, ConnectionInfo, TransportKind, DEFAULT_TRANSPORT};
pub use error::{Error, Result};
pub use listener::Listener;
