//! Concurrent scan of a resolved article range.
//!
//! The range is split into chunks of `step` articles; each chunk runs as its
//! own task, with at most `scans` tasks fetching at a time. Matching subjects
//! are parsed and folded into one shared [`Aggregator`].
//!
//! The first failing chunk records its error and cancels the scan; the other
//! tasks notice the cancellation and stop quietly. After every task has
//! finished, the recorded error is returned and the partial aggregate is
//! dropped.

use std::borrow::Cow;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use regex::{Regex, RegexBuilder};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::aggregate::Aggregator;
use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::pool::ConnectionPool;
use crate::subject::parse_subject;

/// One newsgroup range to scan
#[derive(Clone, Debug)]
pub struct ScanJob {
    /// Newsgroup name
    pub group: String,
    /// Case-insensitive text that matching subjects contain
    pub header: String,
    /// First article number (inclusive)
    pub first: u64,
    /// Last article number (inclusive)
    pub last: u64,
    /// Articles dated at or after this timestamp end a chunk's iteration
    pub window_end: i64,
}

/// Bounded fan-out over article chunks
pub struct RangeScanner {
    pool: ConnectionPool,
    step: u64,
    scans: usize,
    acquire_timeout: Duration,
}

struct ChunkContext {
    pool: ConnectionPool,
    group: String,
    matcher: Regex,
    window_end: i64,
    acquire_timeout: Duration,
    aggregator: Mutex<Aggregator>,
    progress: Arc<AtomicU64>,
}

impl RangeScanner {
    /// Create a scanner drawing sessions from `pool`
    pub fn new(pool: ConnectionPool, scan: &ScanConfig, acquire_timeout: Duration) -> Self {
        Self {
            pool,
            step: scan.step.max(1),
            scans: scan.scans.max(1),
            acquire_timeout,
        }
    }

    /// Number of chunks `first..=last` is split into
    pub fn chunk_count(&self, first: u64, last: u64) -> u64 {
        if last < first {
            return 0;
        }
        (last - first) / self.step + 1
    }

    /// Scan the job's range and return everything that matched.
    ///
    /// `progress` is incremented once per article examined. All-or-nothing:
    /// any chunk failure yields [`Error::Scan`] and no aggregate.
    pub async fn scan(
        &self,
        job: &ScanJob,
        progress: Arc<AtomicU64>,
        cancel: &CancellationToken,
    ) -> Result<Aggregator> {
        let matcher = RegexBuilder::new(&regex::escape(&job.header))
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::config(format!("invalid header: {e}"), "header"))?;

        let context = Arc::new(ChunkContext {
            pool: self.pool.clone(),
            group: job.group.clone(),
            matcher,
            window_end: job.window_end,
            acquire_timeout: self.acquire_timeout,
            aggregator: Mutex::new(Aggregator::new()),
            progress,
        });

        let scan_cancel = cancel.child_token();
        let first_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
        let limiter = Arc::new(Semaphore::new(self.scans));
        let mut tasks = JoinSet::new();

        tracing::info!(
            group = %job.group,
            first = job.first,
            last = job.last,
            chunks = self.chunk_count(job.first, job.last),
            scans = self.scans,
            "Scanning article range"
        );

        let mut chunk_first = job.first;
        while chunk_first <= job.last {
            let chunk_last = job.last.min(chunk_first.saturating_add(self.step - 1));

            let permit = tokio::select! {
                biased;
                _ = scan_cancel.cancelled() => break,
                permit = Arc::clone(&limiter).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let context = Arc::clone(&context);
            let token = scan_cancel.clone();
            let first_error = Arc::clone(&first_error);
            tasks.spawn(async move {
                let _permit = permit;
                if let Err(e) = scan_chunk(&context, chunk_first, chunk_last, &token).await {
                    record_failure(&first_error, e, &token, &context.group);
                }
            });

            if chunk_last == job.last {
                break;
            }
            chunk_first = chunk_last + 1;
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                let error = Error::Io(std::io::Error::other(format!("scan task failed: {e}")));
                record_failure(&first_error, error, &scan_cancel, &job.group);
            }
        }

        if let Some(error) = lock(&first_error).take() {
            return Err(Error::Scan {
                group: job.group.clone(),
                source: Box::new(error),
            });
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let aggregator = match Arc::try_unwrap(context) {
            Ok(context) => context.aggregator.into_inner().unwrap_or_else(|e| e.into_inner()),
            Err(shared) => std::mem::take(&mut *lock(&shared.aggregator)),
        };
        tracing::debug!(
            group = %job.group,
            files = aggregator.file_count(),
            "Range scan finished"
        );
        Ok(aggregator)
    }
}

fn record_failure(
    slot: &Mutex<Option<Error>>,
    error: Error,
    cancel: &CancellationToken,
    group: &str,
) {
    let mut first = lock(slot);
    if first.is_none() {
        tracing::warn!(group = %group, error = %error, "Chunk scan failed, cancelling remaining chunks");
        *first = Some(error);
    }
    drop(first);
    cancel.cancel();
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Run `future` unless `cancel` fires first
async fn unless_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

/// Scan one chunk; returns `Ok` when cancelled
async fn scan_chunk(
    context: &ChunkContext,
    first: u64,
    last: u64,
    cancel: &CancellationToken,
) -> Result<()> {
    let Some(session) = unless_cancelled(cancel, context.pool.acquire(context.acquire_timeout)).await
    else {
        return Ok(());
    };
    let mut session = session?;

    // sessions may have been used for another group in between
    let selected = unless_cancelled(cancel, session.select_group(&context.group)).await;
    let range = match selected {
        None => {
            session.abandon();
            return Ok(());
        }
        Some(Ok(range)) => range,
        Some(Err(e)) => {
            session.release_after(&e);
            return Err(e);
        }
    };
    let Some((first, last)) = range.clamp(first, last) else {
        return Ok(());
    };

    let fetched = unless_cancelled(cancel, session.overview(first, last)).await;
    let batch = match fetched {
        None => {
            session.abandon();
            return Ok(());
        }
        Some(Ok(batch)) => batch,
        Some(Err(e)) => {
            session.release_after(&e);
            return Err(e);
        }
    };
    drop(session);

    let mut matched = 0usize;
    for article in &batch {
        if cancel.is_cancelled() {
            return Ok(());
        }
        if article.timestamp >= context.window_end {
            break;
        }
        context.progress.fetch_add(1, Ordering::Relaxed);

        let subject = decode_entities(&article.subject);
        if !context.matcher.is_match(&subject) {
            continue;
        }
        let parsed = parse_subject(&subject);
        lock(&context.aggregator).fold(&context.group, &parsed, article);
        matched += 1;
    }

    tracing::debug!(
        group = %context.group,
        first,
        last,
        articles = batch.len(),
        matched,
        "Chunk scanned"
    );
    Ok(())
}

/// Decode HTML character references; subjects with malformed or unknown entities are used as-is
fn decode_entities(subject: &str) -> Cow<'_, str> {
    unescape_with(subject, resolve_html5_entity).unwrap_or(Cow::Borrowed(subject))
}
