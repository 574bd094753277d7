//! Best-effort parsing of binary post subject lines.
//!
//! Posters number their uploads with free-text conventions such as
//! `Name [01/12] - "name.part01.rar" yEnc (1/137)`. [`parse_subject`] recovers
//! the file and segment numbering plus the header and filename from such a
//! subject. It never fails: anything it cannot detect falls back to a single
//! file with a single segment.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Numbered pairs: `[x/y]`, `<x/y>` or bare `x/y` are file numbers, `(x/y)` are segment numbers.
static NUMBER_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r#"(?i)(?P<files>(?:"?\[|[<\[]? *)(?P<file>\d+) */ *(?P<totalfiles>\d+) *(?:\]"?|[>\]])?)|(?P<segments>"?\((?P<segment>\d+) */ *(?P<totalsegments>\d+)\)"?)"#,
    )
});

/// Natural-language file numbering: `file 3 of 12`, `[3 von 12]`.
static FILES_IN_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)^(?P<before>.*?) *(?:\[|[<\[]? *(?:file|datei)?) *(?P<file>\d+) *(?:of|von) *(?P<totalfiles>\d+) *(?:\]|[>\]])?(?P<after>.*)$",
    )
});

/// Quoted filename, optionally preceded by the header.
static QUOTED_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r#"(?i)^(?P<header>.*?)?[- ]*"+(?P<filename>(?P<basefilename>.*?)(?:\.(?P<extension>(?:vol\d+\+\d+\.par2?|part\d+\.[^ ".]*|[^ ".]*\.\d+|[^ ".]*)))?)"+"#,
    )
});

/// Unquoted filename ending in a recognizable extension.
static BARE_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r#"(?i)^(?P<filename>(?P<basefilename>.*?)\.(?P<extension>(?:vol\d+\+\d+\.par2?|part\d+\.[^ ".]*|[^ ".]*\.\d+|[^ ".]*)))(?:[" ]|$)"#,
    )
});

/// Compile a pattern that is part of the source code
#[allow(clippy::expect_used)]
pub(crate) fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in pattern must compile")
}

/// Structured fields recovered from a subject line
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParsedSubject {
    /// Full subject, trimmed
    pub subject: String,
    /// Text preceding the filename (falls back to the base filename)
    pub header: String,
    /// Filename including extension(s)
    pub filename: String,
    /// Filename without extension(s)
    pub basefilename: String,
    /// Number of this file within the post (`x` in `[x/y]`)
    pub file: u32,
    /// Declared number of files in the post (`y` in `[x/y]`)
    pub total_files: u32,
    /// Number of this segment within the file (`x` in `(x/y)`)
    pub segment: u32,
    /// Declared number of segments of the file (`y` in `(x/y)`)
    pub total_segments: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PairStyle {
    Files,
    Segments,
}

#[derive(Clone, Copy, Debug)]
struct NumberPair {
    style: PairStyle,
    index: u32,
    total: u32,
}

/// Parse a subject line. Total: always returns a result.
pub fn parse_subject(raw: &str) -> ParsedSubject {
    let subject = raw.trim();
    let (pairs, mut remainder) = extract_number_pairs(subject);
    let (files, segments) = assign_pairs(&pairs);

    let (file, total_files) = match files {
        Some(pair) => pair,
        None => match files_in_words(&remainder) {
            Some((file, total, rest)) => {
                remainder = rest;
                (file, total)
            }
            None => (1, 1),
        },
    };
    let (segment, total_segments) = segments.unwrap_or((1, 1));

    let (mut header, filename, basefilename) = split_header(&remainder, total_files);
    if header.is_empty() && !basefilename.is_empty() {
        header = basefilename.clone();
    }

    ParsedSubject {
        subject: subject.to_string(),
        header,
        filename,
        basefilename,
        file,
        total_files,
        segment,
        total_segments,
    }
}

/// Find every number pair left to right and return them with the text between them.
fn extract_number_pairs(subject: &str) -> (Vec<NumberPair>, String) {
    let mut pairs = Vec::new();
    let mut pieces = Vec::new();
    let mut last_end = 0;

    for caps in NUMBER_PAIR.captures_iter(subject) {
        let (style, index, total) = if caps.name("files").is_some() {
            (PairStyle::Files, &caps["file"], &caps["totalfiles"])
        } else {
            (PairStyle::Segments, &caps["segment"], &caps["totalsegments"])
        };
        let (Ok(index), Ok(total)) = (index.parse(), total.parse()) else {
            continue;
        };
        if let Some(whole) = caps.get(0) {
            pieces.push(subject[last_end..whole.start()].trim());
            last_end = whole.end();
        }
        pairs.push(NumberPair {
            style,
            index,
            total,
        });
    }
    pieces.push(subject[last_end..].trim());

    let remainder = pieces
        .into_iter()
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (pairs, remainder)
}

/// Assign pairs to files and segments, scanning right to left.
///
/// The right-most pair is taken first. When both pairs use the same bracket
/// style, the right-most one ends up as the segment numbering.
fn assign_pairs(pairs: &[NumberPair]) -> (Option<(u32, u32)>, Option<(u32, u32)>) {
    let mut files: Option<(u32, u32)> = None;
    let mut segments: Option<(u32, u32)> = None;

    for pair in pairs.iter().rev() {
        let numbers = (pair.index, pair.total);
        match (files.is_some(), segments.is_some(), pair.style) {
            (false, false, PairStyle::Files) => files = Some(numbers),
            (false, false, PairStyle::Segments) => segments = Some(numbers),
            (true, true, _) => {}
            (_, _, PairStyle::Files) => {
                if files.is_some() {
                    segments = files;
                }
                if segments.is_none() {
                    segments = Some(numbers);
                } else {
                    files = Some(numbers);
                }
            }
            (_, has_segments, PairStyle::Segments) => {
                if has_segments {
                    files = Some(numbers);
                } else {
                    segments = Some(numbers);
                }
            }
        }
    }

    (files, segments)
}

fn files_in_words(remainder: &str) -> Option<(u32, u32, String)> {
    let caps = FILES_IN_WORDS.captures(remainder)?;
    let file = caps["file"].parse().ok()?;
    let total = caps["totalfiles"].parse().ok()?;
    let rest = format!("{} {}", caps["before"].trim(), caps["after"].trim());
    Some((file, total, rest.trim().to_string()))
}

/// Split the remaining text into (header, filename, base filename).
fn split_header(remainder: &str, total_files: u32) -> (String, String, String) {
    if let Some(caps) = QUOTED_FILENAME.captures(remainder) {
        let field = |name: &str| trim_dashes(caps.name(name).map_or("", |m| m.as_str()));
        return (field("header"), field("filename"), field("basefilename"));
    }

    if let Some(caps) = BARE_FILENAME.captures(remainder) {
        let field = |name: &str| trim_dashes(caps.name(name).map_or("", |m| m.as_str()));
        return (String::new(), field("filename"), field("basefilename"));
    }

    if total_files == 1 {
        let name = trim_dashes(remainder);
        return (String::new(), name.clone(), name);
    }

    (String::new(), String::new(), String::new())
}

fn trim_dashes(value: &str) -> String {
    value.trim_matches(|c| c == ' ' || c == '-').to_string()
}
