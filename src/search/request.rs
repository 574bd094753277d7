//! Search request and time window.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::subject::compile;

const SECONDS_PER_HOUR: i64 = 60 * 60;

/// Extra backward hours when only the day of posting is known
const DATE_ONLY_SLACK_HOURS: i64 = 24;

static DAY_DATE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^[0-3]\d\.[0-1]\d\.(?:19|20)\d\d$"));
static UNIX_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| compile(r"^[1-9]\d{9}$"));
static GROUP_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| compile(r"[,; ]+"));

/// What to look for, where, and around which date
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Text expected in the subjects of the post (case-insensitive)
    pub header: String,

    /// Newsgroups to search, in order
    pub groups: Vec<String>,

    /// Posting date, seconds since the Unix epoch
    pub timestamp: i64,

    /// Whether `timestamp` is the exact posting time or only the day
    #[serde(default)]
    pub exact_time: bool,
}

impl SearchRequest {
    /// Build a request from a header, group names and a date string.
    ///
    /// `groups` entries may hold several names separated by commas, semicolons
    /// or spaces; the `a.b.` prefix is expanded to `alt.binaries.`. The date is
    /// either `DD.MM.YYYY` or a Unix timestamp, see [`parse_date`](Self::parse_date).
    pub fn new<I, S>(header: impl Into<String>, groups: I, date: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (timestamp, exact_time) = Self::parse_date(date)?;
        Ok(Self {
            header: header.into().trim().to_string(),
            groups: normalize_groups(groups),
            timestamp,
            exact_time,
        })
    }

    /// Parse `DD.MM.YYYY` (midnight UTC, not exact) or a 10 digit Unix timestamp (exact)
    pub fn parse_date(value: &str) -> Result<(i64, bool)> {
        let value = value.trim();
        let invalid = || Error::config(format!("invalid date '{value}'"), "date");

        if DAY_DATE.is_match(value) {
            let day = NaiveDate::parse_from_str(value, "%d.%m.%Y").map_err(|_| invalid())?;
            let midnight = day.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
            return Ok((midnight.and_utc().timestamp(), false));
        }
        if UNIX_TIMESTAMP.is_match(value) {
            let timestamp = value.parse().map_err(|_| invalid())?;
            return Ok((timestamp, true));
        }
        Err(invalid())
    }

    /// Reject requests that cannot be searched, before any network I/O
    pub fn validate(&self) -> Result<()> {
        if self.header.trim().is_empty() {
            return Err(Error::config("no header provided", "header"));
        }
        if self.groups.iter().all(|g| g.trim().is_empty()) {
            return Err(Error::config("no groups provided", "groups"));
        }
        if self.timestamp <= 0 {
            return Err(Error::config("no date provided", "date"));
        }
        Ok(())
    }
}

/// Split, trim and expand newsgroup names
pub fn normalize_groups<I, S>(groups: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names = Vec::new();
    for entry in groups {
        let entry = entry.as_ref();
        for part in GROUP_SEPARATORS.split(entry) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let name = match part.strip_prefix("a.b.") {
                Some(rest) => format!("alt.binaries.{rest}"),
                None => part.to_string(),
            };
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Time range to search, derived from a request and the scan settings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SearchWindow {
    /// Posting date the window is centered on
    pub target: i64,
    /// Earliest posting date searched
    pub start: i64,
    /// Latest posting date searched
    pub end: i64,
}

impl SearchWindow {
    /// `target - hours` (plus a day when only the date is known) to `target + forward_hours`
    pub fn new(request: &SearchRequest, scan: &ScanConfig) -> Self {
        let mut backward = i64::from(scan.hours) * SECONDS_PER_HOUR;
        if !request.exact_time {
            backward += DATE_ONLY_SLACK_HOURS * SECONDS_PER_HOUR;
        }
        let forward = i64::from(scan.forward_hours) * SECONDS_PER_HOUR;
        Self {
            target: request.timestamp,
            start: request.timestamp.saturating_sub(backward),
            end: request.timestamp.saturating_add(forward),
        }
    }
}
