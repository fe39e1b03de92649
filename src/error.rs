//! Error types shared across the crate.

use std::net::SocketAddr;
use thiserror::Error;

/// Malformed DNS wire data or record text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("message truncated at offset {0}")]
    Truncated(usize),

    #[error("bad compression pointer at offset {0}")]
    BadPointer(usize),

    #[error("label is not valid UTF-8")]
    BadLabel,

    #[error("invalid {rtype} value: {value}")]
    BadValue { rtype: String, value: String },
}

/// Rejected mutation of a server table, cache or record store.
///
/// The table is never modified when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("invalid boolean for {param}: {value}")]
    InvalidBool { param: String, value: String },

    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("malformed parameter (expected key:value): {0}")]
    MalformedParameter(String),

    #[error("a record name is required")]
    MissingName,

    #[error("invalid record type: {0}")]
    InvalidRecordType(String),

    #[error("invalid record value: {0}")]
    InvalidRecordValue(#[from] WireError),
}

/// Failure to ingest a block list.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// A single upstream exchange failed.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream {0} timed out")]
    Timeout(SocketAddr),

    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("malformed reply: {0}")]
    Malformed(#[from] WireError),

    #[error("reply ID mismatch from {0}")]
    IdMismatch(SocketAddr),
}

/// The pipeline could not produce an answer.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("{0} is claimed by a whitelist but no matching server is active")]
    WhitelistDenied(String),

    #[error("no upstream servers available for {0}")]
    NoUpstream(String),

    #[error("no authoritative answer for {0}")]
    NoAuthoritativeAnswer(String),

    #[error("fallback {server} failed: {source}")]
    Fallback {
        server: SocketAddr,
        #[source]
        source: UpstreamError,
    },
}

/// Persistence failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Invalid start/stop transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("service is already running")]
    AlreadyRunning,

    #[error("service is still stopping")]
    StillStopping,
}

/// Failure of a table-management command.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Failure to start or run the proxy.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
