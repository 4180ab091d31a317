//! SIP message model and wire serialization

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::headers::{names, Headers};

/// Protocol/version token that opens every status line
pub const SIP_VERSION: &str = "SIP/2.0";

/// Value written by [`Message::set_expires`]
pub const DEFAULT_EXPIRES: u32 = 300;

/// Registration lifetime assumed when Expires is missing or unparseable
pub const FALLBACK_EXPIRES: u32 = 120;

/// Status code substituted when a status line carries a non-numeric code
pub const FALLBACK_STATUS_CODE: u16 = 400;

/// Whether a message is a request or a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Response,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Request => write!(f, "request"),
            MessageKind::Response => write!(f, "response"),
        }
    }
}

/// First line of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Headline {
    /// `METHOD uri SIP/2.0`
    Request {
        method: String,
        uri: String,
        version: String,
    },
    /// `SIP/2.0 code reason`
    Response {
        version: String,
        code: u16,
        reason: String,
    },
}

impl Headline {
    pub fn request(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Headline::Request {
            method: method.into(),
            uri: uri.into(),
            version: SIP_VERSION.to_string(),
        }
    }

    pub fn response(code: u16, reason: impl Into<String>) -> Self {
        Headline::Response {
            version: SIP_VERSION.to_string(),
            code,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Headline::Request { .. } => MessageKind::Request,
            Headline::Response { .. } => MessageKind::Response,
        }
    }

    /// True for responses with a status code of 200 or above
    pub fn is_final(&self) -> bool {
        matches!(self, Headline::Response { code, .. } if *code >= 200)
    }

    /// True for 1xx responses
    pub fn is_provisional(&self) -> bool {
        matches!(self, Headline::Response { code, .. } if (100..200).contains(code))
    }
}

impl fmt::Display for Headline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Headline::Request {
                method,
                uri,
                version,
            } => write!(f, "{} {} {}", method, uri, version),
            Headline::Response {
                version,
                code,
                reason,
            } => write!(f, "{} {} {}", version, code, reason),
        }
    }
}

/// `CSeq` header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeq {
    pub number: u32,
    pub method: String,
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.method)
    }
}

/// A SIP request or response.
///
/// The message kind is derived from the headline, so the two can never
/// disagree. Every message gets a locally generated correlation id that is
/// used in log output and never written to the wire.
#[derive(Debug, Clone)]
pub struct Message {
    headline: Headline,
    headers: Headers,
    body: Bytes,
    correlation_id: String,
}

impl Message {
    pub fn from_headline(headline: Headline) -> Self {
        Self {
            headline,
            headers: Headers::new(),
            body: Bytes::new(),
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    /// New request with the protocol version fixed to [`SIP_VERSION`]
    pub fn request(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::from_headline(Headline::request(method, uri))
    }

    /// New response with the protocol version fixed to [`SIP_VERSION`]
    pub fn response(code: u16, reason: impl Into<String>) -> Self {
        Self::from_headline(Headline::response(code, reason))
    }

    pub fn headline(&self) -> &Headline {
        &self.headline
    }

    pub fn kind(&self) -> MessageKind {
        self.headline.kind()
    }

    pub fn is_request(&self) -> bool {
        self.kind() == MessageKind::Request
    }

    pub fn is_response(&self) -> bool {
        self.kind() == MessageKind::Response
    }

    /// Request method, `None` for responses
    pub fn method(&self) -> Option<&str> {
        match &self.headline {
            Headline::Request { method, .. } => Some(method),
            Headline::Response { .. } => None,
        }
    }

    /// Request URI, `None` for responses
    pub fn uri(&self) -> Option<&str> {
        match &self.headline {
            Headline::Request { uri, .. } => Some(uri),
            Headline::Response { .. } => None,
        }
    }

    /// Response status code, `None` for requests
    pub fn status_code(&self) -> Option<u16> {
        match &self.headline {
            Headline::Response { code, .. } => Some(*code),
            Headline::Request { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.headline {
            Headline::Response { reason, .. } => Some(reason),
            Headline::Request { .. } => None,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Appends a header line without touching existing ones
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.add(name, value);
        self
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Replaces the body. Content-Length is not updated.
    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = body.into();
        self
    }

    // From / To

    pub fn from(&self) -> Option<&str> {
        self.headers.get(names::FROM)
    }

    pub fn set_from(&mut self, value: impl Into<String>) -> &mut Self {
        self.headers.replace_or_add(names::FROM, value);
        self
    }

    /// Sets From to `<sip:user@host>` with an optional `;tag=`
    pub fn set_from_parts(&mut self, user: &str, host: &str, tag: Option<&str>) -> &mut Self {
        self.set_from(address(user, host, tag))
    }

    pub fn to(&self) -> Option<&str> {
        self.headers.get(names::TO)
    }

    pub fn set_to(&mut self, value: impl Into<String>) -> &mut Self {
        self.headers.replace_or_add(names::TO, value);
        self
    }

    /// Sets To to `<sip:user@host>` with an optional `;tag=`
    pub fn set_to_parts(&mut self, user: &str, host: &str, tag: Option<&str>) -> &mut Self {
        self.set_to(address(user, host, tag))
    }

    // Via

    pub fn via(&self) -> Option<&str> {
        self.headers.get(names::VIA)
    }

    pub fn set_via(&mut self, value: impl Into<String>) -> &mut Self {
        self.headers.replace_or_add(names::VIA, value);
        self
    }

    /// Sets Via to `SIP/2.0/<TRANSPORT> host:port;rport;branch=z9hG4bK<branch>`
    pub fn set_via_parts(&mut self, transport: &str, host: &str, port: u16, branch: &str) -> &mut Self {
        self.set_via(format!(
            "{}/{} {}:{};rport;branch=z9hG4bK{}",
            SIP_VERSION,
            transport.to_ascii_uppercase(),
            host,
            port,
            branch
        ))
    }

    // Call-ID

    pub fn call_id(&self) -> Option<&str> {
        self.headers.get(names::CALL_ID)
    }

    pub fn set_call_id(&mut self, value: impl Into<String>) -> &mut Self {
        self.headers.replace_or_add(names::CALL_ID, value);
        self
    }

    // CSeq

    /// Parses `CSeq: <number> <method>`.
    ///
    /// Fails when the header is missing or malformed; the failure is logged
    /// and left to the caller, it never affects message parsing.
    pub fn cseq(&self) -> Result<CSeq> {
        let value = self
            .headers
            .get(names::CSEQ)
            .ok_or(Error::MissingHeader(names::CSEQ))?;
        let invalid = || Error::InvalidHeader {
            name: names::CSEQ,
            value: value.to_string(),
        };

        let mut parts = value.split_whitespace();
        let number = parts.next().ok_or_else(invalid)?;
        let method = parts.next().ok_or_else(invalid)?;
        let number = number.parse::<u32>().map_err(|_| {
            warn!(correlation_id = %self.correlation_id, "cannot parse CSeq number {:?}", number);
            invalid()
        })?;

        Ok(CSeq {
            number,
            method: method.to_string(),
        })
    }

    pub fn set_cseq(&mut self, number: u32, method: &str) -> &mut Self {
        self.headers
            .replace_or_add(names::CSEQ, CSeq { number, method: method.to_string() }.to_string());
        self
    }

    // Contact

    pub fn contact(&self) -> Option<&str> {
        self.headers.get(names::CONTACT)
    }

    pub fn set_contact(&mut self, value: impl Into<String>) -> &mut Self {
        self.headers.replace_or_add(names::CONTACT, value);
        self
    }

    /// Sets Contact to `<sip:user@host:port>;transport=tcp`
    pub fn set_contact_parts(&mut self, user: &str, host: &str, port: u16) -> &mut Self {
        self.set_contact(format!("<sip:{}@{}:{}>;transport=tcp", user, host, port))
    }

    // Expires

    /// Registration lifetime in seconds, [`FALLBACK_EXPIRES`] when the header
    /// is missing or not a number
    pub fn expires(&self) -> u32 {
        match self.headers.get(names::EXPIRES) {
            None => {
                debug!("Expires not present, assuming {}", FALLBACK_EXPIRES);
                FALLBACK_EXPIRES
            }
            Some(value) => value.trim().parse().unwrap_or_else(|_| {
                warn!("Expires {:?} could not be parsed, assuming {}", value, FALLBACK_EXPIRES);
                FALLBACK_EXPIRES
            }),
        }
    }

    /// Writes `Expires: 300`.
    ///
    /// The requested value is ignored: registrations always ask for
    /// [`DEFAULT_EXPIRES`] seconds.
    pub fn set_expires(&mut self, _requested: u32) -> &mut Self {
        self.headers
            .replace_or_add(names::EXPIRES, DEFAULT_EXPIRES.to_string());
        self
    }

    // Allow

    pub fn allow(&self) -> Vec<String> {
        self.headers
            .get(names::ALLOW)
            .map(|value| {
                value
                    .split(',')
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_allow<I, S>(&mut self, methods: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = methods
            .into_iter()
            .map(|m| m.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.headers.replace_or_add(names::ALLOW, joined);
        self
    }

    // User-Agent

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(names::USER_AGENT)
    }

    pub fn set_user_agent(&mut self, value: impl Into<String>) -> &mut Self {
        self.headers.replace_or_add(names::USER_AGENT, value);
        self
    }

    // Content-Length

    /// Declared body length, 0 when missing or not a number
    pub fn content_length(&self) -> usize {
        match self.headers.get(names::CONTENT_LENGTH) {
            None => 0,
            Some(value) => value.trim().parse().unwrap_or_else(|_| {
                warn!("Content-Length {:?} could not be parsed, assuming 0", value);
                0
            }),
        }
    }

    pub fn set_content_length(&mut self, length: usize) -> &mut Self {
        self.headers
            .replace_or_add(names::CONTENT_LENGTH, length.to_string());
        self
    }

    // Authorization / WWW-Authenticate

    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(names::AUTHORIZATION)
    }

    pub fn set_authorization(&mut self, value: impl Into<String>) -> &mut Self {
        self.headers.replace_or_add(names::AUTHORIZATION, value);
        self
    }

    pub fn www_authenticate(&self) -> Option<&str> {
        self.headers.get(names::WWW_AUTHENTICATE)
    }

    /// Exact wire form: headline, headers, blank line, raw body
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        buf.put_slice(self.headline.to_string().as_bytes());
        buf.put_slice(b"\r\n");
        for line in &self.headers {
            buf.put_slice(line.to_string().as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n", self.headline)?;
        for line in &self.headers {
            write!(f, "{}\r\n", line)?;
        }
        write!(f, "\r\n{}", String::from_utf8_lossy(&self.body))
    }
}

fn address(user: &str, host: &str, tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("<sip:{}@{}>;tag={}", user, host, tag),
        None => format!("<sip:{}@{}>", user, host),
    }
}
