use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use tokio::net::lookup_host;

use crate::error::{AddressParseError, TransportError};

/// Default game port for GoldSrc and Source servers.
pub const DEFAULT_PORT: u16 = 27015;

/// Where a game server listens: hostname or IP literal, plus port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ServerAddress {
            host: host.into(),
            port,
        }
    }

    /// Resolve to the first socket address the host maps to.
    pub async fn resolve(&self) -> Result<SocketAddr, TransportError> {
        let mut addrs = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(TransportError::Resolve)?;
        addrs
            .next()
            .ok_or_else(|| TransportError::NoAddress(self.host.clone()))
    }
}

impl From<SocketAddr> for ServerAddress {
    fn from(addr: SocketAddr) -> Self {
        ServerAddress::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Accepts `host`, `host:port` and `[v6]:port`; the port defaults to
/// [`DEFAULT_PORT`].
impl FromStr for ServerAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressParseError::Empty);
        }

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| AddressParseError::UnclosedBracket(s.to_owned()))?;
            let port = match tail {
                "" => None,
                tail => Some(
                    tail.strip_prefix(':')
                        .ok_or_else(|| AddressParseError::InvalidPort(tail.to_owned()))?,
                ),
            };
            (host, port)
        } else if s.matches(':').count() > 1 {
            // bare IPv6 literal, no port
            (s, None)
        } else {
            match s.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(AddressParseError::Empty);
        }
        let port = match port {
            Some(port) => port
                .parse()
                .map_err(|_| AddressParseError::InvalidPort(port.to_owned()))?,
            None => DEFAULT_PORT,
        };

        Ok(ServerAddress::new(host, port))
    }
}
