use std::io;
use std::str::Utf8Error;
use std::time::Duration;

use thiserror::Error;

/// Every way a single query can fail.
///
/// None of these are fatal; the caller decides whether to report the server
/// as offline, retry, or propagate.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("malformed reply: {0}")]
    MalformedReply(#[from] MalformedReply),
    #[error("transport error: {0}")]
    TransportError(#[from] TransportError),
    #[error("query cancelled")]
    Cancelled,
}

impl QueryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, QueryError::Timeout(_))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, QueryError::MalformedReply(_))
    }
}

/// A datagram arrived but could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedReply {
    #[error("reply truncated: needed {needed} byte(s) at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("unexpected trailing bytes at offset {offset}")]
    TrailingBytes { offset: usize },
    #[error("string starting at offset {offset} is not NUL-terminated")]
    Unterminated { offset: usize },
    #[error("string is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] Utf8Error),
    #[error("unknown packet header {0:#x}")]
    UnknownHeader(i32),
    #[error("unknown reply type {0:#04x}")]
    UnknownType(u8),
    #[error("expected reply type {expected:#04x}, got {found:#04x}")]
    UnexpectedType { expected: u8, found: u8 },
    #[error("inconsistent split packet fragment")]
    BadFragment,
    #[error("compressed split replies are not supported")]
    Compressed,
}

/// The exchange never got as far as a reply.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to resolve host: {0}")]
    Resolve(#[source] io::Error),
    #[error("host {0} resolved to no addresses")]
    NoAddress(String),
    #[error("failed to bind a local socket: {0}")]
    Bind(#[source] io::Error),
    #[error("failed to send request: {0}")]
    Send(#[source] io::Error),
    #[error("failed to receive reply: {0}")]
    Receive(#[source] io::Error),
}

/// Returned by [`ServerAddress::from_str`](crate::address::ServerAddress).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("address is empty")]
    Empty,
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("unterminated IPv6 literal in {0:?}")]
    UnclosedBracket(String),
}
