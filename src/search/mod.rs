//! Direct search orchestration.
//!
//! For every requested newsgroup, in order: resolve the window start and end
//! to article numbers, scan the range in between, and finalize the matches
//! into [`ResultDocument`]s. Failures are reported per group; only
//! configuration errors and cancellation end the whole search.

mod request;

pub use request::{SearchRequest, SearchWindow, normalize_groups};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::aggregate::ResultDocument;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::nntp::{Connector, NntpConnector};
use crate::pool::ConnectionPool;
use crate::resolver::{Boundary, DateResolver, ResolvedArticle};
use crate::scanner::{RangeScanner, ScanJob};

/// How often scan progress events are emitted
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Event emitted while a direct search runs
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchEvent {
    /// Work on a newsgroup started
    GroupStarted {
        /// Newsgroup name
        group: String,
    },

    /// The window was resolved to an article range
    WindowResolved {
        /// Newsgroup name
        group: String,
        /// The resolved range
        range: ResolvedRange,
    },

    /// Periodic scan progress
    ScanProgress {
        /// Newsgroup name
        group: String,
        /// Articles examined so far
        scanned: u64,
        /// Articles in the resolved range
        total: u64,
    },

    /// The newsgroup was scanned successfully
    GroupFinished {
        /// Newsgroup name
        group: String,
        /// Number of result documents
        documents: usize,
    },

    /// The newsgroup could not be scanned
    GroupFailed {
        /// Newsgroup name
        group: String,
        /// Error description
        error: String,
    },

    /// Remaining newsgroups were skipped after a successful one
    GroupsSkipped {
        /// Names of the skipped newsgroups
        groups: Vec<String>,
    },
}

/// Article range and dates a window resolved to in one newsgroup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedRange {
    /// First article number to scan
    pub first: u64,
    /// Last article number to scan
    pub last: u64,
    /// Posting date of the first article
    pub start_timestamp: i64,
    /// Posting date of the last article
    pub end_timestamp: i64,
}

impl ResolvedRange {
    /// Number of article numbers in the range
    pub fn article_count(&self) -> u64 {
        self.last.saturating_sub(self.first) + 1
    }
}

/// Outcome of searching one newsgroup
#[derive(Debug)]
pub struct GroupOutcome {
    /// Newsgroup name
    pub group: String,
    /// The resolved range, if resolution got that far
    pub range: Option<ResolvedRange>,
    /// Documents found, or why the group failed
    pub result: Result<Vec<ResultDocument>>,
}

/// Progress of the current group scan (cheap to clone, shared with the scanner)
#[derive(Clone, Debug, Default)]
pub struct ScanProgress {
    scanned: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl ScanProgress {
    /// Articles examined in the current group
    pub fn scanned(&self) -> u64 {
        self.scanned.load(Ordering::Relaxed)
    }

    /// Articles in the current group's resolved range
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Scanned articles as a percentage (0.0 when nothing is being scanned)
    pub fn percent(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => (self.scanned() as f64 / total as f64 * 100.0).min(100.0),
        }
    }

    fn reset(&self, total: u64) {
        self.scanned.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }
}

/// The direct search engine
pub struct DirectSearch {
    config: Arc<Config>,
    connector: Arc<dyn Connector>,
    resolver: DateResolver,
    event_tx: broadcast::Sender<SearchEvent>,
    progress: ScanProgress,
    cancel: CancellationToken,
}

impl DirectSearch {
    /// Create an engine talking to the configured NNTP server
    pub fn new(config: Config) -> Result<Self> {
        let connector = Arc::new(NntpConnector::new(config.server.clone()));
        Self::with_connector(config, connector)
    }

    /// Create an engine using a custom session factory
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(1000);
        Ok(Self {
            config: Arc::new(config),
            connector,
            resolver: DateResolver::new(),
            event_tx,
            progress: ScanProgress::default(),
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the date resolver (e.g. to change its overview window)
    pub fn with_resolver(mut self, resolver: DateResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// The configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to search events
    pub fn subscribe(&self) -> broadcast::Receiver<SearchEvent> {
        self.event_tx.subscribe()
    }

    /// Handle to the progress counters of the running scan
    pub fn progress(&self) -> ScanProgress {
        self.progress.clone()
    }

    /// Cancel running and future searches of this engine
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn emit(&self, event: SearchEvent) {
        self.event_tx.send(event).ok();
    }

    /// Search every requested newsgroup in order.
    ///
    /// Returns one [`GroupOutcome`] per attempted group. With
    /// `first_group_only`, groups after the first error-free one are skipped.
    ///
    /// # Errors
    ///
    /// Only [`Error::Config`] (invalid request) and [`Error::Cancelled`] are
    /// returned directly; every other failure ends up in its group's outcome.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<GroupOutcome>> {
        request.validate()?;
        let window = SearchWindow::new(request, &self.config.scan);
        let groups: Vec<&String> = request.groups.iter().filter(|g| !g.trim().is_empty()).collect();

        tracing::info!(
            header = %request.header,
            groups = groups.len(),
            start = window.start,
            end = window.end,
            exact_time = request.exact_time,
            "Starting direct search"
        );

        let pool = ConnectionPool::new(Arc::clone(&self.connector), &self.config.server);
        let cancel = self.cancel.child_token();
        let mut outcomes: Vec<GroupOutcome> = Vec::with_capacity(groups.len());

        for (index, group) in groups.iter().enumerate() {
            if self.config.scan.first_group_only
                && outcomes.last().is_some_and(|outcome| outcome.result.is_ok())
            {
                let skipped: Vec<String> = groups[index..].iter().map(|g| g.to_string()).collect();
                tracing::info!(skipped = skipped.len(), "Skipping remaining groups");
                self.emit(SearchEvent::GroupsSkipped { groups: skipped });
                break;
            }

            self.emit(SearchEvent::GroupStarted {
                group: group.to_string(),
            });
            tracing::info!(group = %group, "Searching group");

            let (range, result) = self
                .search_group(&pool, group, &request.header, &window, &cancel)
                .await;

            let result = match result {
                Err(e) if e.is_fatal() => {
                    pool.close().await;
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(group = %group, error = %e, "Group search failed");
                    self.emit(SearchEvent::GroupFailed {
                        group: group.to_string(),
                        error: e.to_string(),
                    });
                    Err(e)
                }
                Ok(documents) => {
                    if documents.is_empty() {
                        tracing::warn!(group = %group, "No result found in group");
                    } else {
                        tracing::info!(group = %group, documents = documents.len(), "Group search finished");
                    }
                    self.emit(SearchEvent::GroupFinished {
                        group: group.to_string(),
                        documents: documents.len(),
                    });
                    Ok(documents)
                }
            };

            outcomes.push(GroupOutcome {
                group: group.to_string(),
                range,
                result,
            });
        }

        pool.close().await;
        Ok(outcomes)
    }

    async fn search_group(
        &self,
        pool: &ConnectionPool,
        group: &str,
        header: &str,
        window: &SearchWindow,
        cancel: &CancellationToken,
    ) -> (Option<ResolvedRange>, Result<Vec<ResultDocument>>) {
        let range = match self.resolve_range(pool, group, window, cancel).await {
            Ok(range) => range,
            Err(e) => return (None, Err(e)),
        };
        tracing::info!(
            group = %group,
            first = range.first,
            last = range.last,
            start = range.start_timestamp,
            end = range.end_timestamp,
            "Resolved search window"
        );
        self.emit(SearchEvent::WindowResolved {
            group: group.to_string(),
            range,
        });

        let job = ScanJob {
            group: group.to_string(),
            header: header.to_string(),
            first: range.first,
            last: range.last,
            window_end: window.end,
        };
        self.progress.reset(range.article_count());
        let reporter = self.spawn_progress_reporter(group, cancel);

        let scanner = RangeScanner::new(
            pool.clone(),
            &self.config.scan,
            self.config.server.acquire_timeout,
        );
        let result = scanner
            .scan(&job, Arc::clone(&self.progress.scanned), cancel)
            .await;

        reporter.cancel();
        self.emit(SearchEvent::ScanProgress {
            group: group.to_string(),
            scanned: self.progress.scanned(),
            total: self.progress.total(),
        });

        (Some(range), result.map(|aggregator| aggregator.finalize()))
    }

    /// Resolve the window to article numbers on one pooled session
    async fn resolve_range(
        &self,
        pool: &ConnectionPool,
        group: &str,
        window: &SearchWindow,
        cancel: &CancellationToken,
    ) -> Result<ResolvedRange> {
        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            session = pool.acquire(self.config.server.acquire_timeout) => session?,
        };

        let selected = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            selected = session.select_group(group) => selected,
        };
        let range = match selected {
            Ok(range) => range,
            Err(e) => {
                session.release_after(&e);
                return Err(e);
            }
        };

        let start = match self
            .resolver
            .resolve(&mut *session, group, range, window.start, Boundary::Start, cancel)
            .await
        {
            Ok(start) => start,
            Err(Error::BeforeOldestArticle { oldest, .. }) => {
                tracing::info!(group = %group, "Window starts before the oldest article");
                ResolvedArticle {
                    number: range.first,
                    timestamp: oldest,
                }
            }
            Err(e) => {
                session.release_after(&e);
                return Err(e);
            }
        };

        let end = match self
            .resolver
            .resolve(&mut *session, group, range, window.end, Boundary::End, cancel)
            .await
        {
            Ok(end) => end,
            Err(Error::AfterNewestArticle { newest, .. }) => {
                tracing::info!(group = %group, "Window ends after the newest article");
                ResolvedArticle {
                    number: range.last,
                    timestamp: newest,
                }
            }
            Err(e) => {
                session.release_after(&e);
                return Err(e);
            }
        };
        drop(session);

        if start.number > end.number {
            return Err(Error::NoArticlesInRange {
                group: group.to_string(),
            });
        }

        Ok(ResolvedRange {
            first: start.number,
            last: end.number,
            start_timestamp: start.timestamp,
            end_timestamp: end.timestamp,
        })
    }

    /// Emit [`SearchEvent::ScanProgress`] periodically until the returned token is cancelled
    fn spawn_progress_reporter(&self, group: &str, cancel: &CancellationToken) -> CancellationToken {
        let stop = cancel.child_token();
        let token = stop.clone();
        let progress = self.progress.clone();
        let event_tx = self.event_tx.clone();
        let group = group.to_string();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        event_tx
                            .send(SearchEvent::ScanProgress {
                                group: group.clone(),
                                scanned: progress.scanned(),
                                total: progress.total(),
                            })
                            .ok();
                    }
                    _ = token.cancelled() => return,
                }
            }
        });

        stop
    }
}
