//! Dialog layer for the sipbell stack
//!
//! A dialog binds a stream parser to one connection, delivers the messages
//! it reads to a single replaceable handler, and composes the requests and
//! replies sent back on that connection.

pub mod cseq;
pub mod dialog;
pub mod error;
pub mod register;

pub use cseq::{CSeqCounter, INITIAL_CSEQ, MAX_CSEQ};
pub use dialog::{Dialog, MessageHandler};
pub use error::{DialogError, DialogResult};
pub use register::{DialogConfig, RegisterInfo, DEFAULT_ALLOWED_METHODS, DEFAULT_USER_AGENT};
