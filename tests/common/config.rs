//! Test configuration helpers for local test servers and .env credentials

use std::time::Duration;

use usenet_directsearch::{Config, ScanConfig, ServerConfig};

use super::server::{PASSWORD, USERNAME};

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Server settings pointing at a local [`NntpTestServer`](super::NntpTestServer)
pub fn local_server_config(port: u16) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        tls: true,
        // the local server presents a self-signed certificate
        allow_insecure_tls: true,
        username: Some(USERNAME.to_string()),
        password: Some(PASSWORD.to_string()),
        connections: 4,
        io_timeout: Duration::from_secs(5),
        acquire_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

/// Full configuration for searching a local test server
pub fn local_config(port: u16) -> Config {
    Config {
        server: local_server_config(port),
        scan: ScanConfig {
            hours: 1,
            forward_hours: 1,
            scans: 8,
            step: 10,
            first_group_only: false,
        },
        ..Default::default()
    }
}

/// Load NNTP server configuration from environment variables
///
/// Required environment variables:
/// - `NNTP_HOST` - Server hostname
/// - `NNTP_USERNAME` - Authentication username
/// - `NNTP_PASSWORD` - Authentication password
///
/// Optional environment variables:
/// - `NNTP_PORT_SSL` - TLS port (default: 563)
/// - `NNTP_CONNECTIONS` - Number of connections (default: 4)
pub fn load_server_config() -> Result<ServerConfig, ConfigError> {
    dotenvy::dotenv().ok();

    let host = std::env::var("NNTP_HOST")
        .map_err(|_| ConfigError("NNTP_HOST not set in environment".to_string()))?;

    let port: u16 = std::env::var("NNTP_PORT_SSL")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(563);

    let username = std::env::var("NNTP_USERNAME")
        .map_err(|_| ConfigError("NNTP_USERNAME not set in environment".to_string()))?;

    let password = std::env::var("NNTP_PASSWORD")
        .map_err(|_| ConfigError("NNTP_PASSWORD not set in environment".to_string()))?;

    let connections: usize = std::env::var("NNTP_CONNECTIONS")
        .ok()
        .and_then(|c| c.parse().ok())
        .unwrap_or(4);

    Ok(ServerConfig {
        host,
        port,
        tls: true,
        username: Some(username),
        password: Some(password),
        connections,
        ..Default::default()
    })
}

/// Check if live test credentials are available
pub fn has_live_credentials() -> bool {
    dotenvy::dotenv().ok();
    std::env::var("NNTP_HOST").is_ok()
        && std::env::var("NNTP_USERNAME").is_ok()
        && std::env::var("NNTP_PASSWORD").is_ok()
}
