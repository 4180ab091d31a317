use std::fmt;
use std::str::FromStr;

use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};

/// Transport used when none is named
pub const DEFAULT_TRANSPORT: &str = "tcp";

/// Transports this stack can carry messages over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Tcp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
        }
    }
}

impl FromStr for TransportKind {
    type Err = Error;

    /// Case-insensitive; the empty string means [`DEFAULT_TRANSPORT`]
    fn from_str(s: &str) -> Result<Self> {
        let s = if s.is_empty() { DEFAULT_TRANSPORT } else { s };
        if s.eq_ignore_ascii_case("tcp") {
            Ok(TransportKind::Tcp)
        } else {
            Err(Error::UnsupportedTransport(s.to_string()))
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where to listen or connect
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionInfo {
    pub transport: String,
    pub host: String,
    pub port: u16,
}

impl ConnectionInfo {
    pub fn new(transport: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            transport: transport.into(),
            host: host.into(),
            port,
        }
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(DEFAULT_TRANSPORT, host, port)
    }

    pub fn transport_kind(&self) -> Result<TransportKind> {
        self.transport.parse()
    }

    /// `host:port`, with IPv6 literals bracketed
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Identity used to detect duplicate listeners.
    ///
    /// Built from the parsed transport, so `TCP` and `tcp` give the same key.
    pub fn key(&self) -> Result<String> {
        let kind = self.transport_kind()?;
        Ok(format!("{}_{}_{}", kind, self.host, self.port))
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transport, self.address())
    }
}

/// Opens an outbound connection
pub async fn connect(info: &ConnectionInfo) -> Result<TcpStream> {
    let kind = info.transport_kind()?;
    let address = info.address();
    debug!("connecting to {} over {}", address, kind);

    let stream = TcpStream::connect(address.as_str())
        .await
        .map_err(|source| Error::ConnectFailed { address, source })?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not set TCP_NODELAY: {}", e);
    }
    Ok(stream)
}
