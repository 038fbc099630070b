//! Error taxonomy shared by the crawl and resolve paths.
//!
//! Per-unit failures travel as data inside results; only [`ConfigError`] is
//! allowed to stop a whole run.

use thiserror::Error;

/// Why a single page (or the first page of a walk) could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("{0}")]
    Transport(String),
    /// The page has no canonical link, i.e. the feed view redirected away.
    #[error("page is not a feed view")]
    NotAFeed,
}

/// Terminal failure of one source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlError {
    #[error("transport failure: {0}")]
    Transport(FetchFailure),
    #[error("channel doesn't support crawling: {0}")]
    Unsupported(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("admission gate closed: {0}")]
    Gate(String),
    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl From<FetchFailure> for CrawlError {
    fn from(failure: FetchFailure) -> Self {
        CrawlError::Transport(failure)
    }
}

/// A vmess token whose payload could not be rewritten.
#[derive(Debug, Error)]
pub enum VmessError {
    #[error("token has no vmess:// prefix")]
    MissingPrefix,
    #[error("payload is not base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload json is not an object")]
    NotAnObject,
}

/// Outcome of a failed A-record lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("ENOTFOUND")]
    NotFound,
    #[error("{0}")]
    Other(String),
}

/// Startup-wide configuration problems. Any of these aborts the run before
/// a single source is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required and cannot be empty")]
    Missing(&'static str),
    #[error("{key} must be a valid URL: {reason}")]
    InvalidUrl { key: &'static str, reason: String },
    #[error("proxy must start with http:// and include a port (e.g., http://localhost:2080), got {0}")]
    InvalidProxy(String),
    #[error("{key} must be a positive integer, got {value}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("proxy test failed: {0}")]
    ProxyUnreachable(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Failure persisting a source's token blob.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
