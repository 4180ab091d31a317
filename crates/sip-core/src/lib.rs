//! SIP core for the sipbell stack
//!
//! This crate provides the message model and its wire form, the incremental
//! stream parser, and digest authentication for REGISTER.

pub mod auth;
pub mod error;
pub mod headers;
pub mod message;
pub mod parser;
pub mod token;

// Re-export commonly used types and functions
pub use auth::{parse_www_authenticate, Challenge, DigestChallenge, DigestComputation, UserCredential};
pub use error::{Error, Result};
pub use headers::{names, HeaderLine, Headers};
pub use message::{CSeq, Headline, Message, MessageKind, SIP_VERSION};
pub use parser::{ParserEvent, ParserExit, ParserState, StreamParser, MAX_BODY_SIZE};
pub use token::{random_token, TOKEN_LEN};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        Challenge, DigestComputation, Error, Headers, Headline, Message, MessageKind, Result,
        StreamParser, UserCredential,
    };
}
