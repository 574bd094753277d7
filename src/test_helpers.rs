//! In-memory news server for unit tests.

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::nntp::{ArticleOverview, Connector, GroupRange, NewsSession};

/// Build an overview entry with a predictable message id
pub(crate) fn article(number: u64, timestamp: i64, subject: &str) -> ArticleOverview {
    ArticleOverview {
        number,
        timestamp,
        subject: subject.to_string(),
        from: "poster <poster@example.com>".to_string(),
        message_id: format!("<{number}@example.com>"),
        bytes: 1000,
    }
}

/// Articles numbered from `first`, one per timestamp, all with the same subject
pub(crate) fn timeline(first: u64, timestamps: &[i64]) -> Vec<ArticleOverview> {
    timestamps
        .iter()
        .enumerate()
        .map(|(i, &ts)| article(first + i as u64, ts, "unrelated"))
        .collect()
}

#[derive(Default)]
struct MockState {
    groups: Mutex<HashMap<String, BTreeMap<u64, ArticleOverview>>>,
    failing_ranges: Mutex<Vec<(u64, u64)>>,
    connect_failures: AtomicU32,
    connects: AtomicUsize,
    group_selects: AtomicUsize,
    overview_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    overview_delay: Mutex<Duration>,
}

/// Shared handle to an in-memory server; also acts as its [`Connector`]
#[derive(Clone, Default)]
pub(crate) struct MockServer {
    state: Arc<MockState>,
}

impl MockServer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_group(self, name: &str, articles: Vec<ArticleOverview>) -> Self {
        self.state
            .groups
            .lock()
            .unwrap()
            .insert(name.to_string(), articles.into_iter().map(|a| (a.number, a)).collect());
        self
    }

    /// Overview requests overlapping `first..=last` fail with a connection error
    pub(crate) fn fail_overview(&self, first: u64, last: u64) {
        self.state.failing_ranges.lock().unwrap().push((first, last));
    }

    /// The next `count` connection attempts fail
    pub(crate) fn fail_connects(&self, count: u32) {
        self.state.connect_failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn set_overview_delay(&self, delay: Duration) {
        *self.state.overview_delay.lock().unwrap() = delay;
    }

    pub(crate) fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn group_selects(&self) -> usize {
        self.state.group_selects.load(Ordering::SeqCst)
    }

    pub(crate) fn overview_calls(&self) -> usize {
        self.state.overview_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MockServer {
    async fn connect(&self) -> Result<Box<dyn NewsSession>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .state
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Connection("connection refused".to_string()));
        }
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            group: None,
        }))
    }
}

struct MockSession {
    state: Arc<MockState>,
    group: Option<String>,
}

#[async_trait::async_trait]
impl NewsSession for MockSession {
    async fn select_group(&mut self, group: &str) -> Result<GroupRange> {
        self.state.group_selects.fetch_add(1, Ordering::SeqCst);
        let groups = self.state.groups.lock().unwrap();
        let articles = groups
            .get(group)
            .ok_or_else(|| Error::NoSuchGroup(group.to_string()))?;
        self.group = Some(group.to_string());

        Ok(match (articles.keys().next(), articles.keys().next_back()) {
            (Some(&first), Some(&last)) => GroupRange {
                count: articles.len() as u64,
                first,
                last,
            },
            _ => GroupRange {
                count: 0,
                first: 1,
                last: 0,
            },
        })
    }

    async fn overview(&mut self, first: u64, last: u64) -> Result<Vec<ArticleOverview>> {
        let Some(group) = self.group.clone() else {
            return Err(Error::Protocol {
                code: 412,
                message: "no newsgroup selected".to_string(),
            });
        };
        self.state.overview_calls.fetch_add(1, Ordering::SeqCst);

        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.state.overview_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failing = self
            .state
            .failing_ranges
            .lock()
            .unwrap()
            .iter()
            .any(|&(a, b)| a <= last && first <= b);
        if failing {
            return Err(Error::Connection("connection reset by peer".to_string()));
        }

        if first > last {
            return Ok(Vec::new());
        }
        let groups = self.state.groups.lock().unwrap();
        Ok(groups
            .get(&group)
            .map(|articles| articles.range(first..=last).map(|(_, a)| a.clone()).collect())
            .unwrap_or_default())
    }

    async fn quit(&mut self) {}
}
