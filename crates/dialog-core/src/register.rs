//! Inputs for composing REGISTER requests.

use sipbell_sip_core::UserCredential;
use sipbell_sip_transport::ConnectionInfo;

/// User-Agent sent when none is configured
pub const DEFAULT_USER_AGENT: &str = "sipbell/0.1";

/// Methods advertised in the Allow header by default
pub const DEFAULT_ALLOWED_METHODS: &[&str] = &[
    "PRACK", "INVITE", "ACK", "BYE", "CANCEL", "UPDATE", "INFO", "SUBSCRIBE", "NOTIFY", "OPTIONS",
    "REFER", "MESSAGE",
];

/// Who registers, where, and with which credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterInfo {
    /// Address this user agent is reachable at (Via, Contact)
    pub client: ConnectionInfo,
    /// Registrar to dial
    pub registrar: ConnectionInfo,
    pub username: String,
    pub credential: UserCredential,
}

impl RegisterInfo {
    pub fn new(
        client: ConnectionInfo,
        registrar: ConnectionInfo,
        username: impl Into<String>,
        credential: UserCredential,
    ) -> Self {
        Self {
            client,
            registrar,
            username: username.into(),
            credential,
        }
    }
}

/// Per-dialog settings for outbound requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogConfig {
    pub user_agent: String,
    pub allowed_methods: Vec<String>,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allowed_methods: DEFAULT_ALLOWED_METHODS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}
