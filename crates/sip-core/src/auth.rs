//! Digest authentication for REGISTER.
//!
//! Parses the registrar's `WWW-Authenticate` challenge and computes the
//! `Authorization` answer:
//!
//! ```text
//! HA1      = md5hex(username ":" realm ":" password)
//! HA2      = md5hex("REGISTER" ":" "sip:" request_uri)
//! response = md5hex(HA1 ":" nonce ":" HA2)
//! ```

use tracing::debug;

use crate::error::{Error, Result};

/// Credentials offered when registering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCredential {
    /// No secret; a 401 cannot be answered
    Unauthenticated { username: String },
    /// Username and password for digest authentication
    Digest { username: String, password: String },
}

impl UserCredential {
    pub fn unauthenticated(username: impl Into<String>) -> Self {
        Self::Unauthenticated {
            username: username.into(),
        }
    }

    pub fn digest(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Digest {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Self::Unauthenticated { username } | Self::Digest { username, .. } => username,
        }
    }

    pub fn password(&self) -> Option<&str> {
        match self {
            Self::Unauthenticated { .. } => None,
            Self::Digest { password, .. } => Some(password),
        }
    }
}

/// Parameters of a `Digest` challenge
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub algorithm: Option<String>,
}

/// A parsed `WWW-Authenticate` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Digest(DigestChallenge),
    /// Any scheme other than Digest
    Unknown { scheme: String },
}

/// Parses a `WWW-Authenticate` header value.
///
/// The scheme is matched case-insensitively. For `Digest`, parameters are
/// comma-separated `key=value` pairs, quotes around values are stripped and
/// keys other than realm, nonce and algorithm are ignored.
pub fn parse_www_authenticate(value: &str) -> Result<Challenge> {
    let value = value.trim();
    let (scheme, params) = match value.split_once(char::is_whitespace) {
        Some((scheme, params)) => (scheme, params),
        None => (value, ""),
    };
    if scheme.is_empty() {
        return Err(Error::InvalidChallenge(value.to_string()));
    }
    if !scheme.eq_ignore_ascii_case("digest") {
        return Ok(Challenge::Unknown {
            scheme: scheme.to_string(),
        });
    }

    let mut challenge = DigestChallenge::default();
    for param in params.split(',') {
        let Some((key, val)) = param.split_once('=') else {
            continue;
        };
        let val = val.trim().trim_matches('"').to_string();
        match key.trim().to_ascii_lowercase().as_str() {
            "realm" => challenge.realm = val,
            "nonce" => challenge.nonce = val,
            "algorithm" => challenge.algorithm = Some(val),
            _ => {}
        }
    }
    Ok(Challenge::Digest(challenge))
}

/// Inputs of one digest answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestComputation {
    pub challenge: DigestChallenge,
    pub username: String,
    pub password: String,
    /// Registrar host, without the `sip:` scheme
    pub request_uri: String,
}

impl DigestComputation {
    pub fn new(
        challenge: DigestChallenge,
        username: impl Into<String>,
        password: impl Into<String>,
        request_uri: impl Into<String>,
    ) -> Self {
        Self {
            challenge,
            username: username.into(),
            password: password.into(),
            request_uri: request_uri.into(),
        }
    }

    /// Lower-case hex digest response. Always MD5.
    pub fn response(&self) -> String {
        if let Some(algorithm) = &self.challenge.algorithm {
            if !algorithm.eq_ignore_ascii_case("md5") {
                debug!("challenge asks for {}, answering with MD5", algorithm);
            }
        }
        let ha1 = md5_hex(&format!(
            "{}:{}:{}",
            self.username, self.challenge.realm, self.password
        ));
        let ha2 = md5_hex(&format!("REGISTER:sip:{}", self.request_uri));
        md5_hex(&format!("{}:{}:{}", ha1, self.challenge.nonce, ha2))
    }

    /// Value for the `Authorization` header
    pub fn authorization_value(&self) -> String {
        format!(
            "Digest username=\"{}\" realm=\"{}\" nonce=\"{}\" response=\"{}\"",
            self.username,
            self.challenge.realm,
            self.challenge.nonce,
            self.response()
        )
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
