//! NNTP session abstraction.
//!
//! The engine talks to the server only through [`NewsSession`], and obtains
//! new sessions through a [`Connector`]. [`NntpConnector`] is the production
//! implementation on top of `nntp-rs`; tests plug in an in-memory server.

mod connection;
mod overview;

pub use connection::{NntpConnection, NntpConnector};
pub use overview::{drop_invalid_utf8, overview_from_xover, parse_date};

use crate::error::Result;

/// Summary of one article as returned by an overview (XOVER) request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArticleOverview {
    /// Newsgroup-local article number
    pub number: u64,
    /// Posting date in seconds since the Unix epoch
    pub timestamp: i64,
    /// Subject line (UTF-8 sanitized, entities not yet decoded)
    pub subject: String,
    /// Sender as given in the From header (UTF-8 sanitized)
    pub from: String,
    /// Message identifier including angle brackets
    pub message_id: String,
    /// Article size in bytes
    pub bytes: u64,
}

/// Article number bounds reported by a GROUP command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupRange {
    /// Estimated number of articles
    pub count: u64,
    /// Lowest article number (low-water mark)
    pub first: u64,
    /// Highest article number (high-water mark)
    pub last: u64,
}

impl GroupRange {
    /// Whether the group holds no articles at all
    pub fn is_empty(&self) -> bool {
        self.count == 0 || self.last < self.first
    }

    /// Clamp an inclusive article range to these bounds, `None` if nothing remains
    pub fn clamp(&self, first: u64, last: u64) -> Option<(u64, u64)> {
        let first = first.max(self.first);
        let last = last.min(self.last);
        (first <= last).then_some((first, last))
    }
}

/// One authenticated conversation with a news server
#[async_trait::async_trait]
pub trait NewsSession: Send {
    /// Select a newsgroup and return its current article bounds
    async fn select_group(&mut self, group: &str) -> Result<GroupRange>;

    /// Fetch overview entries for the inclusive range `first..=last` of the selected group
    ///
    /// Entries come back in ascending article number order. A range without
    /// articles yields an empty vector, not an error.
    async fn overview(&mut self, first: u64, last: u64) -> Result<Vec<ArticleOverview>>;

    /// Politely end the session; errors are ignored
    async fn quit(&mut self);
}

/// Factory for new, already authenticated sessions
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Open and authenticate a new session
    async fn connect(&self) -> Result<Box<dyn NewsSession>>;
}
