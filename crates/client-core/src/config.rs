//! Client configuration
//!
//! [`ClientConfig`] holds the few knobs the client has. Every field has a
//! default, so a TOML file only needs the values it changes:
//!
//! ```toml
//! default_transport = "tcp"
//! user_agent = "frontdoor/2.0"
//! register_timeout_secs = 10
//! ```
//!
//! # Usage Examples
//!
//! ```rust
//! use sipbell_client_core::ClientConfig;
//!
//! let config = ClientConfig::new()
//!     .with_user_agent("frontdoor/2.0")
//!     .with_register_timeout_secs(10);
//!
//! assert_eq!(config.user_agent, "frontdoor/2.0");
//! assert_eq!(config.default_transport, "tcp");
//!
//! let parsed = ClientConfig::from_toml_str("user_agent = \"frontdoor/2.0\"").unwrap();
//! assert_eq!(parsed.register_timeout_secs, 32);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sipbell_dialog_core::{DialogConfig, DEFAULT_ALLOWED_METHODS, DEFAULT_USER_AGENT};
use sipbell_sip_transport::DEFAULT_TRANSPORT;

use crate::error::{ClientError, ClientResult};

/// Seconds to wait for each final REGISTER response
pub const DEFAULT_REGISTER_TIMEOUT_SECS: u64 = 32;

/// Client-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Transport used by `listen` when none is given
    pub default_transport: String,
    /// User-Agent header on outbound requests
    pub user_agent: String,
    /// Methods advertised in the Allow header
    pub allowed_methods: Vec<String>,
    /// How long a registration waits for each final response
    pub register_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_transport: DEFAULT_TRANSPORT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allowed_methods: DEFAULT_ALLOWED_METHODS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            register_timeout_secs: DEFAULT_REGISTER_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_transport(mut self, transport: impl Into<String>) -> Self {
        self.default_transport = transport.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_allowed_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_register_timeout_secs(mut self, secs: u64) -> Self {
        self.register_timeout_secs = secs;
        self
    }

    pub fn register_timeout(&self) -> Duration {
        Duration::from_secs(self.register_timeout_secs)
    }

    /// Settings handed to every dialog the client creates
    pub fn dialog_config(&self) -> DialogConfig {
        DialogConfig {
            user_agent: self.user_agent.clone(),
            allowed_methods: self.allowed_methods.clone(),
        }
    }

    pub fn from_toml_str(input: &str) -> ClientResult<Self> {
        toml::from_str(input).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&input)
    }
}
