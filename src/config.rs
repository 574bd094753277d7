//! Configuration types for usenet-directsearch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for [`DirectSearch`](crate::DirectSearch)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// The news server to scan
    pub server: ServerConfig,

    /// Search window and scan concurrency
    #[serde(default)]
    pub scan: ScanConfig,

    /// Completeness thresholds applied to result documents
    #[serde(default)]
    pub check: CheckConfig,
}

impl Config {
    /// Check that the configuration can be used for a direct search.
    ///
    /// Runs before any network I/O; every failure is an [`Error::Config`].
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.scan.validate()
    }
}

/// NNTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname
    pub host: String,

    /// Server port (default: 563)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Use TLS (implicit TLS, not STARTTLS)
    ///
    /// Kept for configuration compatibility; nntp-rs negotiates TLS on every connection.
    #[serde(default = "default_tls")]
    pub tls: bool,

    /// Accept self-signed or otherwise unverifiable server certificates (default: false)
    #[serde(default)]
    pub allow_insecure_tls: bool,

    /// Username for authentication
    pub username: Option<String>,

    /// Password for authentication
    pub password: Option<String>,

    /// Maximum number of simultaneously open connections (default: 20)
    #[serde(default = "default_connections")]
    pub connections: usize,

    /// Idle sessions older than this are discarded instead of reused (default: 60 seconds)
    #[serde(default = "default_idle_timeout", with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Timeout for a single server response (default: 60 seconds)
    #[serde(default = "default_io_timeout", with = "duration_serde")]
    pub io_timeout: Duration,

    /// How long a scan worker waits for a free connection (default: 120 seconds)
    #[serde(default = "default_acquire_timeout", with = "duration_serde")]
    pub acquire_timeout: Duration,

    /// Consecutive connection/protocol errors before the pool gives up (default: 3)
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            tls: default_tls(),
            allow_insecure_tls: false,
            username: None,
            password: None,
            connections: default_connections(),
            idle_timeout: default_idle_timeout(),
            io_timeout: default_io_timeout(),
            acquire_timeout: default_acquire_timeout(),
            max_errors: default_max_errors(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("no usenet server host configured", "server.host"));
        }
        let has_username = self.username.as_deref().is_some_and(|u| !u.is_empty());
        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        if !has_username || !has_password {
            return Err(Error::config(
                "no or incomplete credentials for usenet server",
                if has_username {
                    "server.password"
                } else {
                    "server.username"
                },
            ));
        }
        if self.connections == 0 {
            return Err(Error::config(
                "at least one connection is required",
                "server.connections",
            ));
        }
        if self.max_errors == 0 {
            return Err(Error::config(
                "max_errors must be at least 1",
                "server.max_errors",
            ));
        }
        Ok(())
    }
}

impl From<&ServerConfig> for nntp_rs::ServerConfig {
    fn from(config: &ServerConfig) -> Self {
        nntp_rs::ServerConfig {
            host: config.host.clone(),
            port: config.port,
            tls: config.tls,
            allow_insecure_tls: config.allow_insecure_tls,
            username: config.username.clone().unwrap_or_default(),
            password: config.password.clone().unwrap_or_default(),
        }
    }
}

/// Search window and scan concurrency configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Hours to search backward from the post date (default: 12)
    #[serde(default = "default_hours")]
    pub hours: u32,

    /// Hours to search forward from the post date (default: 12)
    #[serde(default = "default_hours")]
    pub forward_hours: u32,

    /// Number of chunk scans running in parallel (default: 50)
    ///
    /// Independent of [`ServerConfig::connections`]; surplus scans wait for a free session.
    #[serde(default = "default_scans")]
    pub scans: usize,

    /// Number of articles requested per overview chunk (default: 20000)
    #[serde(default = "default_step")]
    pub step: u64,

    /// Stop after the first newsgroup that was scanned without error (default: false)
    #[serde(default)]
    pub first_group_only: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            hours: default_hours(),
            forward_hours: default_hours(),
            scans: default_scans(),
            step: default_step(),
            first_group_only: false,
        }
    }
}

impl ScanConfig {
    fn validate(&self) -> Result<()> {
        if self.scans == 0 {
            return Err(Error::config("at least one parallel scan is required", "scan.scans"));
        }
        if self.step == 0 {
            return Err(Error::config("step must be at least 1 article", "scan.step"));
        }
        Ok(())
    }
}

/// Thresholds used by [`ResultDocument::completeness`](crate::ResultDocument::completeness)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Files that may be missing while the result still counts as complete (default: 1)
    #[serde(default = "default_max_missing_files")]
    pub max_missing_files: u32,

    /// Percentage of segments that may be missing (default: 1.0)
    #[serde(default = "default_max_missing_segments_percent")]
    pub max_missing_segments_percent: f64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            max_missing_files: default_max_missing_files(),
            max_missing_segments_percent: default_max_missing_segments_percent(),
        }
    }
}

fn default_port() -> u16 {
    563
}

fn default_tls() -> bool {
    true
}

fn default_connections() -> usize {
    20
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_io_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_max_errors() -> u32 {
    3
}

fn default_hours() -> u32 {
    12
}

fn default_scans() -> usize {
    50
}

fn default_step() -> u64 {
    20_000
}

fn default_max_missing_files() -> u32 {
    1
}

fn default_max_missing_segments_percent() -> f64 {
    1.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
