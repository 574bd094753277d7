//! # usenet-directsearch
//!
//! Find multi-part binary posts on Usenet without an indexer, by scanning the
//! overview data of the newsgroups they were posted to.
//!
//! ## How it works
//!
//! Given a subject header, a list of newsgroups and an approximate posting
//! date, the engine:
//! - **Resolves the date window** to article numbers with a binary search over
//!   overview batches (NNTP has no date index)
//! - **Scans the range** in fixed-size chunks, concurrently, over a bounded
//!   pool of NNTP connections
//! - **Parses matching subjects** into header, filename, file and segment numbers
//! - **Aggregates segments** into one [`ResultDocument`] per post, ready to be
//!   written as NZB with [`nzb::to_nzb`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use usenet_directsearch::{Config, DirectSearch, SearchRequest, ServerConfig, best_document};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         server: ServerConfig {
//!             host: "news.example.com".to_string(),
//!             port: 563,
//!             tls: true,
//!             username: Some("user".to_string()),
//!             password: Some("pass".to_string()),
//!             connections: 20,
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!
//!     let engine = DirectSearch::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let request = SearchRequest::new("Some.Show.S01E01", ["a.b.teevee"], "14.01.2023")?;
//!     for outcome in engine.search(&request).await? {
//!         let documents = outcome.result.unwrap_or_default();
//!         if let Some(best) = best_document(&documents, &engine.config().check) {
//!             println!("{}: {} segments", outcome.group, best.segments());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Segment aggregation and result documents
pub mod aggregate;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// NNTP sessions and overview parsing
pub mod nntp;
/// NZB output
pub mod nzb;
/// Bounded NNTP connection pool
pub mod pool;
/// Date to article number resolution
pub mod resolver;
/// Concurrent range scanning
pub mod scanner;
/// Search orchestration
pub mod search;
/// Subject line parsing
pub mod subject;

#[cfg(test)]
mod test_helpers;

// Re-export commonly used types
pub use aggregate::{Aggregator, Completeness, FileAggregate, ResultDocument, SegmentRecord, best_document};
pub use config::{CheckConfig, Config, ScanConfig, ServerConfig};
pub use error::{Error, ErrorKind, Result};
pub use nntp::{ArticleOverview, Connector, GroupRange, NewsSession, NntpConnector};
pub use nzb::{NzbMeta, to_nzb};
pub use pool::ConnectionPool;
pub use resolver::{Boundary, DateResolver, ResolvedArticle};
pub use scanner::{RangeScanner, ScanJob};
pub use search::{
    DirectSearch, GroupOutcome, ResolvedRange, ScanProgress, SearchEvent, SearchRequest,
    SearchWindow,
};
pub use subject::{ParsedSubject, parse_subject};

/// Run a search, cancelling it when Ctrl+C is pressed.
///
/// # Example
///
/// ```no_run
/// use usenet_directsearch::{Config, DirectSearch, SearchRequest, search_until_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = DirectSearch::new(Config::default())?;
///     let request = SearchRequest::new("Some.Show", ["a.b.teevee"], "1673690400")?;
///
///     // Ctrl+C ends the search with Error::Cancelled
///     let outcomes = search_until_signal(&engine, &request).await?;
///     println!("{} groups searched", outcomes.len());
///
///     Ok(())
/// }
/// ```
pub async fn search_until_signal(
    engine: &DirectSearch,
    request: &SearchRequest,
) -> Result<Vec<GroupOutcome>> {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, cancelling search"),
            Err(e) => {
                tracing::warn!(error = %e, "Could not listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };
    search_until(engine, request, ctrl_c).await
}

/// Run a search, cancelling it when `shutdown` completes first
pub async fn search_until(
    engine: &DirectSearch,
    request: &SearchRequest,
    shutdown: impl Future<Output = ()>,
) -> Result<Vec<GroupOutcome>> {
    let search = engine.search(request);
    tokio::pin!(search);
    tokio::select! {
        outcomes = &mut search => outcomes,
        () = shutdown => {
            engine.cancel();
            search.await
        }
    }
}
