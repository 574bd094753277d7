//! NNTP sessions backed by an [`nntp_rs::NntpClient`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nntp_rs::{NntpClient, NntpError};

use super::overview::overview_from_xover;
use super::{ArticleOverview, Connector, GroupRange, NewsSession};
use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// A single authenticated NNTP connection
pub struct NntpConnection {
    client: NntpClient,
    io_timeout: Duration,
}

impl NntpConnection {
    /// Connect, read the greeting and authenticate if credentials are configured
    pub async fn connect(server: &ServerConfig) -> Result<Self> {
        let address = format!("{}:{}", server.host, server.port);
        let config = Arc::new(nntp_rs::ServerConfig::from(server));

        let mut client = tokio::time::timeout(server.io_timeout, NntpClient::connect(config))
            .await
            .map_err(|_| Error::Timeout(format!("connecting to {address}")))?
            .map_err(|e| match e {
                NntpError::Io(e) => Error::Connection(format!("{address}: {e}")),
                NntpError::Tls(message) => {
                    Error::Connection(format!("TLS handshake with {address}: {message}"))
                }
                NntpError::Protocol { code, message } => {
                    Error::Connection(format!("server greeting rejected: {code} {message}"))
                }
                other => Error::from(other),
            })?;

        if server.username.as_deref().is_some_and(|u| !u.is_empty()) {
            within(server.io_timeout, "authenticating", client.authenticate())
                .await
                .map_err(|e| match e {
                    Error::Protocol { code, message } => {
                        Error::Authentication(format!("{code} {message}"))
                    }
                    other => other,
                })?;
        }

        tracing::debug!(address = %address, "NNTP connection established");
        Ok(Self {
            client,
            io_timeout: server.io_timeout,
        })
    }
}

/// Run one client call under the configured response timeout
async fn within<T>(
    limit: Duration,
    action: &str,
    call: impl Future<Output = nntp_rs::Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| Error::Timeout(action.to_string()))?
        .map_err(Error::from)
}

#[async_trait::async_trait]
impl NewsSession for NntpConnection {
    async fn select_group(&mut self, group: &str) -> Result<GroupRange> {
        let info = within(self.io_timeout, "selecting group", self.client.select_group(group))
            .await?;
        Ok(GroupRange {
            count: info.count,
            first: info.first,
            last: info.last,
        })
    }

    async fn overview(&mut self, first: u64, last: u64) -> Result<Vec<ArticleOverview>> {
        let range = format!("{first}-{last}");
        let entries =
            match within(self.io_timeout, "fetching overview", self.client.fetch_xover(&range))
                .await
            {
                Ok(entries) => entries,
                // no articles in range / no such article number
                Err(Error::Protocol {
                    code: 420 | 423, ..
                }) => return Ok(Vec::new()),
                Err(e) => return Err(e),
            };

        let received = entries.len();
        let batch: Vec<ArticleOverview> =
            entries.into_iter().filter_map(overview_from_xover).collect();
        if batch.len() < received {
            tracing::debug!(
                first,
                last,
                skipped = received - batch.len(),
                "Skipped overview entries without number or date"
            );
        }
        Ok(batch)
    }

    async fn quit(&mut self) {
        if let Err(e) = within(self.io_timeout, "closing session", self.client.quit()).await {
            tracing::debug!(error = %e, "QUIT failed");
        }
    }
}

/// [`Connector`] that opens real [`NntpConnection`]s
pub struct NntpConnector {
    server: Arc<ServerConfig>,
}

impl NntpConnector {
    /// Create a connector for the given server
    pub fn new(server: ServerConfig) -> Self {
        Self {
            server: Arc::new(server),
        }
    }
}

#[async_trait::async_trait]
impl Connector for NntpConnector {
    async fn connect(&self) -> Result<Box<dyn NewsSession>> {
        let connection = NntpConnection::connect(&self.server).await?;
        Ok(Box::new(connection))
    }
}
