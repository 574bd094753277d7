//! Reassembly of matching articles into files and result documents.
//!
//! An [`Aggregator`] lives for exactly one newsgroup scan. Articles are folded
//! in any order (the fold is commutative and idempotent); [`Aggregator::finalize`]
//! turns the collected files into one [`ResultDocument`] per post.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::config::CheckConfig;
use crate::nntp::ArticleOverview;
use crate::subject::ParsedSubject;

/// One article of a file
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SegmentRecord {
    /// Segment number within the file
    pub number: u32,
    /// Message identifier without angle brackets
    pub message_id: String,
    /// Article size in bytes
    pub bytes: u64,
}

/// All segments found for one file of a post
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileAggregate {
    /// Newsgroups the file was seen in, in order of first sighting
    pub groups: Vec<String>,
    /// Representative subject (the one of segment 1 when available)
    pub subject: String,
    /// Poster as given in the From header
    pub poster: String,
    /// File number within the post
    pub number: u32,
    /// Filename recovered from the subject
    pub filename: String,
    /// Filename without extension(s)
    pub basefilename: String,
    /// Latest posting date seen, seconds since the Unix epoch
    pub date: i64,
    /// Segments ordered by number after finalization
    pub segments: Vec<SegmentRecord>,
    /// Declared segment total, raised to the highest segment number seen on finalization
    pub total_segments: u32,
    /// Sum of the sizes of all found segments (computed on finalization)
    pub bytes: u64,
}

/// Completeness figures for one [`ResultDocument`]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Completeness {
    /// Declared files that were not found
    pub files_missing: u64,
    /// Declared segments that were not found
    pub segments_missing: u64,
    /// Missing segments as percentage of the declared total
    pub segments_missing_percent: f64,
    /// Missing files within [`CheckConfig::max_missing_files`]
    pub files_complete: bool,
    /// Missing segment percentage within [`CheckConfig::max_missing_segments_percent`]
    pub segments_complete: bool,
}

/// The files of one post, with derived totals
///
/// Totals are computed when the document is built and cannot be set independently.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultDocument {
    files: Vec<FileAggregate>,
    total_files: u64,
    segments: u64,
    total_segments: u64,
    bytes: u64,
}

impl ResultDocument {
    fn new(mut files: Vec<FileAggregate>, declared_files: u32) -> Self {
        files.sort_by(|a, b| {
            a.number
                .cmp(&b.number)
                .then_with(|| a.filename.cmp(&b.filename))
        });

        let mut segments = 0u64;
        let mut total_segments = 0u64;
        let mut bytes = 0u64;
        for file in &mut files {
            file.segments.sort_by_key(|segment| segment.number);
            let highest = file.segments.iter().map(|s| s.number).max().unwrap_or(0);
            file.total_segments = file.total_segments.max(highest);
            file.bytes = file.segments.iter().map(|s| s.bytes).sum();

            segments += file.segments.len() as u64;
            total_segments += u64::from(file.total_segments);
            bytes += file.bytes;
        }

        let total_files = u64::from(declared_files).max(files.len() as u64);
        Self {
            files,
            total_files,
            segments,
            total_segments,
            bytes,
        }
    }

    /// Files sorted by file number
    pub fn files(&self) -> &[FileAggregate] {
        &self.files
    }

    /// Declared number of files (at least the number of files found)
    pub fn total_files(&self) -> u64 {
        self.total_files
    }

    /// Number of segments found
    pub fn segments(&self) -> u64 {
        self.segments
    }

    /// Declared number of segments over all files
    pub fn total_segments(&self) -> u64 {
        self.total_segments
    }

    /// Total size of all found segments
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Compare found against declared counts
    pub fn completeness(&self, check: &CheckConfig) -> Completeness {
        let files_missing = self.total_files.saturating_sub(self.files.len() as u64);
        let segments_missing = self.total_segments.saturating_sub(self.segments);
        let segments_missing_percent = if self.total_segments == 0 {
            0.0
        } else {
            segments_missing as f64 / self.total_segments as f64 * 100.0
        };

        Completeness {
            files_missing,
            segments_missing,
            segments_missing_percent,
            files_complete: files_missing <= u64::from(check.max_missing_files),
            segments_complete: segments_missing_percent <= check.max_missing_segments_percent,
        }
    }
}

/// Pick the most complete document: fewest missing files, then lowest missing segment percentage
///
/// Ties keep the earlier document.
pub fn best_document<'a>(
    documents: &'a [ResultDocument],
    check: &CheckConfig,
) -> Option<&'a ResultDocument> {
    documents
        .iter()
        .map(|doc| (doc, doc.completeness(check)))
        .reduce(|best, candidate| {
            let order = candidate
                .1
                .files_missing
                .cmp(&best.1.files_missing)
                .then_with(|| {
                    candidate
                        .1
                        .segments_missing_percent
                        .partial_cmp(&best.1.segments_missing_percent)
                        .unwrap_or(Ordering::Equal)
                });
            if order == Ordering::Less { candidate } else { best }
        })
        .map(|(doc, _)| doc)
}

struct FileEntry {
    file: FileAggregate,
    message_ids: HashSet<String>,
}

struct PostEntry {
    declared_files: u32,
    files: HashMap<String, FileEntry>,
}

/// Deduplicating collector for one newsgroup scan
#[derive(Default)]
pub struct Aggregator {
    posts: HashMap<String, PostEntry>,
}

impl Aggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct files collected so far
    pub fn file_count(&self) -> usize {
        self.posts.values().map(|post| post.files.len()).sum()
    }

    /// Fold one matching article into the collection
    pub fn fold(&mut self, group: &str, subject: &ParsedSubject, article: &ArticleOverview) {
        let poster = article.from.clone();
        let identity = hash_key(&[&subject.header, &poster, &subject.total_files.to_string()]);
        let dedup = hash_key(&[
            &identity,
            &subject.filename,
            &subject.file.to_string(),
            &subject.total_segments.to_string(),
        ]);

        let post = self
            .posts
            .entry(identity)
            .or_insert_with(|| PostEntry {
                declared_files: subject.total_files,
                files: HashMap::new(),
            });
        let entry = post.files.entry(dedup).or_insert_with(|| FileEntry {
            file: FileAggregate {
                groups: vec![group.to_string()],
                subject: subject.subject.clone(),
                poster,
                number: subject.file,
                filename: subject.filename.clone(),
                basefilename: subject.basefilename.clone(),
                date: 0,
                segments: Vec::new(),
                total_segments: subject.total_segments,
                bytes: 0,
            },
            message_ids: HashSet::new(),
        });

        let file = &mut entry.file;
        if file.groups.last().map(String::as_str) != Some(group) {
            file.groups.push(group.to_string());
        }
        if subject.segment == 1 {
            file.subject = subject.subject.clone();
        }
        file.date = file.date.max(article.timestamp.max(0));

        let message_id = article
            .message_id
            .trim_matches(|c| c == '<' || c == '>')
            .to_string();
        if entry.message_ids.insert(message_id.clone()) {
            file.segments.push(SegmentRecord {
                number: subject.segment,
                message_id,
                bytes: article.bytes,
            });
        }
    }

    /// Convert the collection into one document per post
    pub fn finalize(self) -> Vec<ResultDocument> {
        let mut documents: Vec<ResultDocument> = self
            .posts
            .into_values()
            .map(|post| {
                let files = post.files.into_values().map(|entry| entry.file).collect();
                ResultDocument::new(files, post.declared_files)
            })
            .collect();
        documents.sort_by(|a, b| {
            let key = |doc: &ResultDocument| {
                doc.files
                    .first()
                    .map(|file| (file.poster.clone(), file.subject.clone()))
            };
            key(a).cmp(&key(b))
        });
        documents
    }
}

fn hash_key(parts: &[&str]) -> String {
    format!("{:x}", md5::compute(parts.concat()))
}
