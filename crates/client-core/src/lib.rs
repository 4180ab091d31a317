//! SIP client coordination layer for sipbell
//!
//! This crate ties the lower layers together into a user agent that can
//! register with a registrar and accept inbound calls:
//!
//! ```text
//! client-core -> dialog-core -> {sip-transport, sip-core}
//! ```
//!
//! - [`Client`] - listeners, call callbacks and registration
//! - [`registration`] - the REGISTER exchange with its digest retry
//! - [`dispatcher`] - automatic replies to INVITE and CANCEL
//! - [`ClientConfig`] - settings, loadable from TOML

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registration;

pub use client::Client;
pub use config::ClientConfig;
pub use dispatcher::{Call, CallHandler};
pub use error::{ClientError, ClientResult};
pub use registration::{RegistrationOutcome, RegistrationResult, RegistrationState};

// Types callers need to build a registration
pub use sipbell_dialog_core::RegisterInfo;
pub use sipbell_sip_core::UserCredential;
pub use sipbell_sip_transport::ConnectionInfo;
