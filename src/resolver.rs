//! Date to article number resolution.
//!
//! NNTP has no date index, so the resolver binary-searches the article number
//! space of a newsgroup. Each step fetches a fixed-width overview window around
//! the midpoint and compares its timestamps against the target. Empty windows
//! (expired articles) are skipped by probing upward with a growing width.
//!
//! Timestamps are not strictly monotonic in article order. Every decision that
//! selects the final article scans a whole window instead of trusting its
//! endpoints.

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::nntp::{ArticleOverview, GroupRange, NewsSession};

/// Default number of articles fetched per binary search step
pub const OVERVIEW_WINDOW: u64 = 1000;

/// Upper bound for the search width when skipping empty ranges, in windows
const MAX_GAP_WINDOWS: u64 = 16;

/// Which side of the search window an article number is resolved for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
    /// First article with a timestamp at or after the target (ties: lowest number)
    Start,
    /// Last article with a timestamp at or before the target (ties: highest number)
    End,
}

/// An article picked as window boundary
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedArticle {
    /// Article number
    pub number: u64,
    /// Its posting date, seconds since the Unix epoch
    pub timestamp: i64,
}

impl From<&ArticleOverview> for ResolvedArticle {
    fn from(article: &ArticleOverview) -> Self {
        Self {
            number: article.number,
            timestamp: article.timestamp,
        }
    }
}

/// What the search has seen so far, for boundary error reporting
#[derive(Default)]
struct Observed {
    below: bool,
    above: bool,
    oldest: Option<i64>,
    newest: Option<i64>,
}

impl Observed {
    fn record(&mut self, batch: &[ArticleOverview], target: i64) {
        for article in batch {
            self.below |= article.timestamp < target;
            self.above |= article.timestamp > target;
            self.oldest = Some(self.oldest.map_or(article.timestamp, |t| t.min(article.timestamp)));
            self.newest = Some(self.newest.map_or(article.timestamp, |t| t.max(article.timestamp)));
        }
    }
}

/// Binary search over a newsgroup's article numbers
#[derive(Clone, Debug)]
pub struct DateResolver {
    window: u64,
}

impl Default for DateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DateResolver {
    /// Resolver using [`OVERVIEW_WINDOW`] articles per step
    pub fn new() -> Self {
        Self::with_window(OVERVIEW_WINDOW)
    }

    /// Resolver with a custom step width (at least 1)
    pub fn with_window(window: u64) -> Self {
        Self {
            window: window.max(1),
        }
    }

    /// Find the boundary article for `target` in the currently selected group.
    ///
    /// `range` is the group's article range as returned by selecting it on
    /// `session`.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyGroup`] when the group has no articles
    /// - [`Error::BeforeOldestArticle`] when the target precedes every article
    ///   (for [`Boundary::Start`]) or no article is old enough (for [`Boundary::End`])
    /// - [`Error::AfterNewestArticle`] when the target follows every article
    ///   (for [`Boundary::End`]) or no article is new enough (for [`Boundary::Start`])
    /// - [`Error::Cancelled`] as soon as `cancel` fires, unwrapped
    /// - any session error, unwrapped
    pub async fn resolve(
        &self,
        session: &mut dyn NewsSession,
        group: &str,
        range: GroupRange,
        target: i64,
        boundary: Boundary,
        cancel: &CancellationToken,
    ) -> Result<ResolvedArticle> {
        if range.is_empty() {
            return Err(Error::EmptyGroup {
                group: group.to_string(),
            });
        }

        let mut low = range.first;
        let mut high = range.last;
        let mut candidate: Option<ResolvedArticle> = None;
        let mut observed = Observed::default();
        let mut steps = 0u32;

        while low <= high {
            steps += 1;
            let mid = low + (high - low) / 2;
            let first = mid.saturating_sub(self.window / 2).max(low);
            let last = high.min(first.saturating_add(self.window - 1));

            let Some((batch, last)) = self
                .fetch_non_empty(session, first, last, high, cancel)
                .await?
            else {
                tracing::debug!(group, first, high, "No articles left above midpoint");
                match first.checked_sub(1) {
                    Some(below) => high = below,
                    None => break,
                }
                continue;
            };
            observed.record(&batch, target);

            let oldest = batch.iter().map(|a| a.timestamp).min().unwrap_or(target);
            let newest = batch.iter().map(|a| a.timestamp).max().unwrap_or(target);
            tracing::debug!(group, step = steps, first, last, oldest, newest, target, "Resolver step");

            match boundary {
                Boundary::Start if newest < target => low = last + 1,
                Boundary::Start if oldest >= target => {
                    candidate = batch.iter().min_by_key(|a| a.number).map(ResolvedArticle::from);
                    match first.checked_sub(1) {
                        Some(below) => high = below,
                        None => break,
                    }
                }
                Boundary::End if oldest > target => match first.checked_sub(1) {
                    Some(below) => high = below,
                    None => break,
                },
                Boundary::End if newest <= target => {
                    candidate = batch.iter().max_by_key(|a| a.number).map(ResolvedArticle::from);
                    low = last + 1;
                }
                _ => {
                    candidate = crossing(&batch, target, boundary);
                    break;
                }
            }
        }

        let resolved = match (boundary, candidate) {
            (Boundary::Start, Some(found)) if found.timestamp > target && !observed.below => {
                return Err(Error::BeforeOldestArticle {
                    group: group.to_string(),
                    target,
                    oldest: found.timestamp,
                });
            }
            (Boundary::End, Some(found)) if found.timestamp < target && !observed.above => {
                return Err(Error::AfterNewestArticle {
                    group: group.to_string(),
                    target,
                    newest: found.timestamp,
                });
            }
            (_, Some(found)) => found,
            (Boundary::Start, None) => {
                return Err(Error::AfterNewestArticle {
                    group: group.to_string(),
                    target,
                    newest: observed.newest.unwrap_or(target),
                });
            }
            (Boundary::End, None) => {
                return Err(Error::BeforeOldestArticle {
                    group: group.to_string(),
                    target,
                    oldest: observed.oldest.unwrap_or(target),
                });
            }
        };

        tracing::debug!(
            group,
            ?boundary,
            number = resolved.number,
            timestamp = resolved.timestamp,
            steps,
            "Resolved boundary article"
        );
        Ok(resolved)
    }

    /// Fetch `first..=last`; when empty, keep probing upward (up to `high`) with
    /// a doubling width until articles show up.
    ///
    /// Returns the batch and the last article number it covers.
    async fn fetch_non_empty(
        &self,
        session: &mut dyn NewsSession,
        first: u64,
        last: u64,
        high: u64,
        cancel: &CancellationToken,
    ) -> Result<Option<(Vec<ArticleOverview>, u64)>> {
        let max_width = self.window.saturating_mul(MAX_GAP_WINDOWS);
        let mut width = self.window;
        let (mut from, mut to) = (first, last);
        loop {
            let batch = fetch(session, from, to, cancel).await?;
            if !batch.is_empty() {
                return Ok(Some((batch, to)));
            }
            if to >= high {
                return Ok(None);
            }
            width = width.saturating_mul(2).min(max_width);
            from = to + 1;
            to = high.min(from.saturating_add(width - 1));
        }
    }
}

/// Pick the tightest article inside a batch that brackets the target
fn crossing(batch: &[ArticleOverview], target: i64, boundary: Boundary) -> Option<ResolvedArticle> {
    match boundary {
        Boundary::Start => batch
            .iter()
            .filter(|a| a.timestamp >= target)
            .min_by_key(|a| a.number),
        Boundary::End => batch
            .iter()
            .filter(|a| a.timestamp <= target)
            .max_by_key(|a| a.number),
    }
    .map(ResolvedArticle::from)
}

async fn fetch(
    session: &mut dyn NewsSession,
    first: u64,
    last: u64,
    cancel: &CancellationToken,
) -> Result<Vec<ArticleOverview>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        batch = session.overview(first, last) => batch,
    }
}
