//! Error types shared across the resolver.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A wire-format decoding failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("message exceeds maximum size of {0} octets")]
    TooLarge(usize),
    #[error("message truncated")]
    Truncated,
    #[error("label exceeds 63 octets")]
    LabelTooLong,
    #[error("name exceeds 255 octets")]
    NameTooLong,
    #[error("reserved label type {0:#04x}")]
    BadLabelType(u8),
    #[error("compression pointer does not point backwards")]
    ForwardPointer,
    #[error("too many compression pointers")]
    PointerLoop,
    #[error("record data length mismatch")]
    RdataLength,
    #[error("trailing data after message")]
    TrailingData,
    #[error("invalid record data: {0}")]
    BadRdata(&'static str),
    #[error("invalid presentation format: {0}")]
    BadText(String),
}

/// A failure to exchange a message with a single server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("timeout while contacting server")]
    Timeout,
    #[error("network unreachable")]
    NetworkUnreachable,
    #[error("connection refused by server")]
    RefusedByServer,
    #[error("malformed reply: {0}")]
    Malformed(#[from] WireError),
    #[error("reply does not match the query")]
    Mismatch,
    #[error("i/o error: {0}")]
    Io(String),
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout => "Timeout",
            TransportError::NetworkUnreachable => "NetworkUnreachable",
            TransportError::RefusedByServer => "RefusedByServer",
            TransportError::Malformed(_) => "MalformedMessage",
            TransportError::Mismatch => "Mismatch",
            TransportError::Io(_) => "Io",
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut => TransportError::Timeout,
            io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                TransportError::RefusedByServer
            }
            io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::AddrNotAvailable => TransportError::NetworkUnreachable,
            _ => TransportError::Io(e.to_string()),
        }
    }
}

/// A query failure surfaced to callers.
///
/// Validation outcomes are never errors; see [`crate::Security`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] WireError),
    #[error("server failure at {zone}: {reason}")]
    ServerFailure { zone: String, reason: String },
    #[error("CNAME chain exceeds {limit} redirects")]
    TooManyRedirects { limit: usize },
    #[error("resource exhaustion")]
    AllocationFailure,
    #[error("invalid query name: {0}")]
    InvalidName(String),
    #[error("query cancelled")]
    Cancelled,
    #[error("resolver is not running")]
    NotRunning,
}

impl ResolveError {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::MalformedMessage(_) => "MalformedMessage",
            ResolveError::ServerFailure { .. } => "ServerFailure",
            ResolveError::TooManyRedirects { .. } => "TooManyRedirects",
            ResolveError::AllocationFailure => "AllocationFailure",
            ResolveError::InvalidName(_) => "InvalidName",
            ResolveError::Cancelled => "Cancelled",
            ResolveError::NotRunning => "NotRunning",
        }
    }

    pub(crate) fn server_failure(zone: impl ToString, reason: impl ToString) -> Self {
        ResolveError::ServerFailure {
            zone: zone.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A configuration failure, raised synchronously when the setting is applied.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown option: {0}")]
    UnknownOption(String),
    #[error("invalid value {value:?} for option {option}")]
    InvalidValue { option: String, value: String },
    #[error("configuration is frozen once the first query has started")]
    AlreadyStarted,
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("invalid server address: {0}")]
    InvalidAddress(String),
    #[error("invalid trust anchor: {0}")]
    InvalidAnchor(String),
    #[error("invalid local zone type: {0}")]
    InvalidZoneType(String),
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] WireError),
}

impl ConfigError {
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::UnknownOption(_) => "UnknownOption",
            ConfigError::InvalidValue { .. } => "InvalidValue",
            ConfigError::AlreadyStarted => "AlreadyStarted",
            ConfigError::Io { .. } => "Io",
            ConfigError::Parse { .. } => "Parse",
            ConfigError::InvalidAddress(_) => "InvalidAddress",
            ConfigError::InvalidAnchor(_) => "InvalidAnchor",
            ConfigError::InvalidZoneType(_) => "InvalidZoneType",
            ConfigError::InvalidRecord(_) => "InvalidRecord",
        }
    }
}
