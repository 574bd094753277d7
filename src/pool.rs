//! Bounded pool of authenticated NNTP sessions.
//!
//! The number of live sessions never exceeds `connections`: every lent
//! [`PooledSession`] holds a semaphore permit. Sessions go back to an idle
//! queue when the guard is dropped and are reused unless they sat idle longer
//! than `idle_timeout`. Consecutive connection failures beyond `max_errors`
//! mark the pool as failed; all current and future waiters then get
//! [`Error::PoolFailed`].

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::nntp::{ArticleOverview, Connector, GroupRange, NewsSession};

/// Shared handle to a connection pool (cheap to clone)
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    connector: Arc<dyn Connector>,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<(Box<dyn NewsSession>, Instant)>>,
    idle_timeout: Duration,
    max_errors: u32,
    consecutive_errors: AtomicU32,
    failure: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Create a pool; no connection is opened until the first [`acquire`](Self::acquire)
    pub fn new(connector: Arc<dyn Connector>, server: &ServerConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                permits: Arc::new(Semaphore::new(server.connections.max(1))),
                idle: Mutex::new(VecDeque::new()),
                idle_timeout: server.idle_timeout,
                max_errors: server.max_errors.max(1),
                consecutive_errors: AtomicU32::new(0),
                failure: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Borrow a session, waiting at most `timeout` for a free slot.
    ///
    /// Reuses an idle session when one is fresh enough, otherwise connects.
    /// Failed connection attempts are retried until the pool's error
    /// threshold is reached; authentication failures are never retried.
    pub async fn acquire(&self, timeout: Duration) -> Result<PooledSession> {
        self.inner.ensure_usable()?;

        let permit = match tokio::time::timeout(
            timeout,
            Arc::clone(&self.inner.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(self.inner.unusable_error()),
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "no connection became available within {}s",
                    timeout.as_secs()
                )));
            }
        };

        if let Some(session) = self.inner.take_idle().await {
            return Ok(PooledSession::new(session, Arc::clone(&self.inner), permit));
        }

        loop {
            self.inner.ensure_usable()?;
            match self.inner.connector.connect().await {
                Ok(session) => {
                    self.inner.consecutive_errors.store(0, Ordering::SeqCst);
                    tracing::debug!(
                        available = self.inner.permits.available_permits(),
                        "Opened new NNTP session"
                    );
                    return Ok(PooledSession::new(session, Arc::clone(&self.inner), permit));
                }
                Err(e) => {
                    let fatal = matches!(e, Error::Authentication(_));
                    if self.inner.record_error(&e, fatal) {
                        return Err(e);
                    }
                    tracing::warn!(error = %e, "NNTP connection attempt failed, retrying");
                }
            }
        }
    }

    /// Close the pool: waiters and later acquisitions fail with [`Error::PoolClosed`]
    ///
    /// Idle sessions are shut down; lent sessions are dropped when returned.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.permits.close();
        let idle: Vec<_> = self.inner.lock_idle().drain(..).collect();
        for (mut session, _) in idle {
            session.quit().await;
        }
    }

    /// Whether the pool gave up after repeated errors
    pub fn is_failed(&self) -> bool {
        lock(&self.inner.failure).is_some()
    }

    /// Number of sessions currently waiting in the idle queue
    pub fn idle_count(&self) -> usize {
        self.inner.lock_idle().len()
    }
}

impl PoolInner {
    fn ensure_usable(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) || self.permits.is_closed() {
            return Err(self.unusable_error());
        }
        Ok(())
    }

    fn unusable_error(&self) -> Error {
        match lock(&self.failure).as_ref() {
            Some(reason) => Error::PoolFailed(reason.clone()),
            None => Error::PoolClosed,
        }
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, VecDeque<(Box<dyn NewsSession>, Instant)>> {
        lock(&self.idle)
    }

    /// Pop the most recently returned fresh session, shutting down stale ones
    async fn take_idle(&self) -> Option<Box<dyn NewsSession>> {
        let mut stale = Vec::new();
        let fresh = {
            let mut idle = self.lock_idle();
            loop {
                match idle.pop_back() {
                    Some((session, since)) if since.elapsed() <= self.idle_timeout => {
                        break Some(session);
                    }
                    Some((session, _)) => stale.push(session),
                    None => break None,
                }
            }
        };
        if !stale.is_empty() {
            tracing::debug!(count = stale.len(), "Discarding idle NNTP sessions");
        }
        for mut session in stale {
            session.quit().await;
        }
        fresh
    }

    /// Count an error; returns true when the pool is (now) failed
    fn record_error(&self, error: &Error, fatal: bool) -> bool {
        let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
        if fatal || errors >= self.max_errors {
            let mut failure = lock(&self.failure);
            if failure.is_none() {
                tracing::warn!(
                    errors,
                    max_errors = self.max_errors,
                    error = %error,
                    "Connection pool marked as failed"
                );
                *failure = Some(error.to_string());
            }
            drop(failure);
            self.permits.close();
            return true;
        }
        self.permits.is_closed()
    }

    fn release(&self, session: Box<dyn NewsSession>) {
        if self.closed.load(Ordering::SeqCst) || self.permits.is_closed() {
            return;
        }
        self.lock_idle().push_back((session, Instant::now()));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A session lent by the pool; returned to it when dropped
pub struct PooledSession {
    session: Box<dyn NewsSession>,
    pool: Arc<PoolInner>,
    discarded: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    fn new(session: Box<dyn NewsSession>, pool: Arc<PoolInner>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            session,
            pool,
            discarded: false,
            _permit: permit,
        }
    }

    /// Drop the session instead of returning it, counting `error` against the pool's threshold
    pub fn discard(mut self, error: &Error) {
        self.discarded = true;
        self.pool.record_error(error, false);
    }

    /// Drop the session without counting an error, e.g. after an interrupted command
    pub fn abandon(mut self) {
        self.discarded = true;
    }

    /// Return the session after a failed command, or discard it if `error` left it unusable
    pub fn release_after(self, error: &Error) {
        if matches!(error, Error::Cancelled) {
            self.abandon();
        } else if error.poisons_session() {
            self.discard(error);
        }
    }
}

impl Deref for PooledSession {
    type Target = dyn NewsSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for PooledSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        let session = std::mem::replace(&mut self.session, Box::new(ReturnedSession));
        if !self.discarded {
            self.pool.release(session);
        }
    }
}

/// Placeholder left behind in a guard whose session went back to the pool
struct ReturnedSession;

#[async_trait::async_trait]
impl NewsSession for ReturnedSession {
    async fn select_group(&mut self, _group: &str) -> Result<GroupRange> {
        Err(Error::PoolClosed)
    }

    async fn overview(&mut self, _first: u64, _last: u64) -> Result<Vec<ArticleOverview>> {
        Err(Error::PoolClosed)
    }

    async fn quit(&mut self) {}
}
