//! Conversion of XOVER entries into article overviews.

use chrono::DateTime;
use nntp_rs::XoverEntry;

use super::ArticleOverview;

/// Date layouts seen in the wild that RFC 2822 parsing rejects.
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
    "%a, %d %b %Y %H:%M %z",
    "%d %b %Y %H:%M %z",
];

/// Convert one XOVER entry into an [`ArticleOverview`].
///
/// Returns `None` for entries without a valid article number or date; such
/// entries are useless for both date resolution and scanning.
pub fn overview_from_xover(entry: XoverEntry) -> Option<ArticleOverview> {
    if entry.article_number == 0 {
        return None;
    }
    let timestamp = parse_date(&entry.date)?;

    Some(ArticleOverview {
        number: entry.article_number,
        timestamp,
        subject: drop_invalid_utf8(entry.subject),
        from: drop_invalid_utf8(entry.author),
        message_id: drop_invalid_utf8(entry.message_id).trim().to_string(),
        bytes: entry.bytes as u64,
    })
}

/// Parse an article Date header into seconds since the Unix epoch.
///
/// Accepts RFC 2822 dates with a trailing `(comment)` and a few common
/// deviations such as a literal `UTC` zone.
pub fn parse_date(raw: &str) -> Option<i64> {
    let mut value = raw.trim();
    if value.ends_with(')')
        && let Some(open) = value.rfind('(')
    {
        value = value[..open].trim_end();
    }

    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.timestamp());
    }

    let normalized = match value.strip_suffix(" UTC") {
        Some(stripped) => format!("{stripped} +0000"),
        None => value.to_string(),
    };
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(&normalized, format).ok())
        .map(|date| date.timestamp())
}

/// Remove the replacement characters left by lossy UTF-8 decoding of header bytes.
pub fn drop_invalid_utf8(value: String) -> String {
    if value.contains(char::REPLACEMENT_CHARACTER) {
        value.replace(char::REPLACEMENT_CHARACTER, "")
    } else {
        value
    }
}
