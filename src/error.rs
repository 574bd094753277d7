//! Error types for usenet-directsearch
//!
//! Every failure the engine can report is a variant of [`Error`]. Callers that
//! only need to decide what to do next (abort, skip the group, report) should
//! match on [`Error::kind`] instead of individual variants.

use thiserror::Error;

/// Result type alias for usenet-directsearch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for usenet-directsearch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration or request error, raised before any network I/O
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "server.username")
        key: Option<String>,
    },

    /// TCP/TLS connection to the server failed or was lost
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected the configured credentials
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Unexpected NNTP response code
    #[error("NNTP protocol error {code}: {message}")]
    Protocol {
        /// Response code returned by the server
        code: u16,
        /// Response text (or a description of what was expected)
        message: String,
    },

    /// The server does not carry the requested newsgroup
    #[error("no such newsgroup: {0}")]
    NoSuchGroup(String),

    /// I/O error on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timed out waiting for a pooled session or a server response
    #[error("timed out: {0}")]
    Timeout(String),

    /// The connection pool gave up after repeated connection or protocol errors
    #[error("connection pool unusable after repeated errors: {0}")]
    PoolFailed(String),

    /// The connection pool was closed
    #[error("connection pool closed")]
    PoolClosed,

    /// The newsgroup reports no articles at all
    #[error("newsgroup '{group}' is empty")]
    EmptyGroup {
        /// Newsgroup name
        group: String,
    },

    /// The target timestamp lies before the oldest article of the newsgroup
    #[error("post date is older than the oldest article of newsgroup '{group}' (target {target}, oldest {oldest})")]
    BeforeOldestArticle {
        /// Newsgroup name
        group: String,
        /// Requested timestamp (seconds since epoch)
        target: i64,
        /// Oldest timestamp seen while resolving
        oldest: i64,
    },

    /// The target timestamp lies after the newest article of the newsgroup
    #[error("post date is newer than the newest article of newsgroup '{group}' (target {target}, newest {newest})")]
    AfterNewestArticle {
        /// Newsgroup name
        group: String,
        /// Requested timestamp (seconds since epoch)
        target: i64,
        /// Newest timestamp seen while resolving
        newest: i64,
    },

    /// The resolved window contains no articles
    #[error("no articles found within search range in newsgroup '{group}'")]
    NoArticlesInRange {
        /// Newsgroup name
        group: String,
    },

    /// A chunk of the range scan failed; partial results were discarded
    #[error("scan of newsgroup '{group}' failed: {source}")]
    Scan {
        /// Newsgroup name
        group: String,
        /// The error that stopped the scan
        #[source]
        source: Box<Error>,
    },

    /// The operation was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

/// Coarse classification of an [`Error`], used to decide how a failure propagates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller configuration error; aborts the whole search
    Configuration,
    /// Server unreachable, authentication or protocol failure
    Connection,
    /// The window lies outside the newsgroup's data
    Boundary,
    /// The resolved window holds no articles
    EmptyRange,
    /// Network failure in the middle of a scan
    Scan,
    /// Cooperative cancellation; never reported as a failure
    Cancelled,
}

impl Error {
    /// Shorthand for a configuration error tied to a config key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } => ErrorKind::Configuration,
            Error::Connection(_)
            | Error::Authentication(_)
            | Error::Protocol { .. }
            | Error::NoSuchGroup(_)
            | Error::Io(_)
            | Error::Timeout(_)
            | Error::PoolFailed(_)
            | Error::PoolClosed => ErrorKind::Connection,
            Error::EmptyGroup { .. }
            | Error::BeforeOldestArticle { .. }
            | Error::AfterNewestArticle { .. } => ErrorKind::Boundary,
            Error::NoArticlesInRange { .. } => ErrorKind::EmptyRange,
            Error::Scan { .. } => ErrorKind::Scan,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether this error should abort the whole direct search rather than one newsgroup
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration | ErrorKind::Cancelled)
    }

    /// Whether a session that produced this error must not be reused
    pub(crate) fn poisons_session(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Io(_) | Error::Timeout(_) | Error::Protocol { .. }
        )
    }
}

impl From<nntp_rs::NntpError> for Error {
    fn from(error: nntp_rs::NntpError) -> Self {
        use nntp_rs::NntpError;

        match error {
            NntpError::Io(e) => Error::Io(e),
            NntpError::Timeout => Error::Timeout("waiting for server response".to_string()),
            NntpError::AuthFailed(message) => Error::Authentication(message),
            NntpError::Protocol {
                code: code @ (480 | 481),
                message,
            } => Error::Authentication(format!("{code} {message}")),
            NntpError::Protocol { code, message } => Error::Protocol { code, message },
            NntpError::InvalidResponse(message) => Error::Protocol {
                code: 0,
                message: format!("malformed response: {message}"),
            },
            NntpError::NoSuchGroup(group) => Error::NoSuchGroup(group),
            NntpError::ConnectionClosed => {
                Error::Connection("connection closed by server".to_string())
            }
            other => Error::Connection(other.to_string()),
        }
    }
}
