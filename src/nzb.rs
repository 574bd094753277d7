//! NZB output for result documents.
//!
//! Renders a [`ResultDocument`] as an NZB 1.1 file that download clients can
//! consume directly. The XML itself is written by [`nntp_rs::Nzb::to_xml`].

use std::collections::HashMap;

use nntp_rs::{Nzb, NzbFile, NzbSegment};

use crate::aggregate::ResultDocument;

/// Optional metadata written into the NZB
#[derive(Clone, Debug, Default)]
pub struct NzbMeta {
    /// `<meta type="title">`
    pub title: Option<String>,
    /// `<meta type="password">`
    pub password: Option<String>,
    /// XML comment placed before the `<nzb>` element
    pub comment: Option<String>,
}

impl NzbMeta {
    fn entries(&self) -> HashMap<String, String> {
        [("title", &self.title), ("password", &self.password)]
            .into_iter()
            .filter_map(|(kind, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .map(|v| (kind.to_string(), v.to_string()))
            })
            .collect()
    }
}

impl From<&ResultDocument> for Nzb {
    fn from(document: &ResultDocument) -> Self {
        let files = document
            .files()
            .iter()
            .map(|file| NzbFile {
                poster: file.poster.clone(),
                date: file.date,
                subject: file.subject.clone(),
                groups: file.groups.clone(),
                segments: file
                    .segments
                    .iter()
                    .map(|segment| NzbSegment {
                        bytes: segment.bytes,
                        number: segment.number,
                        message_id: segment.message_id.clone(),
                    })
                    .collect(),
            })
            .collect();

        Nzb {
            meta: HashMap::new(),
            files,
        }
    }
}

/// Render a result document as NZB XML
pub fn to_nzb(document: &ResultDocument, meta: &NzbMeta) -> String {
    let mut nzb = Nzb::from(document);
    nzb.meta = meta.entries();
    let xml = nzb.to_xml();

    match meta.comment.as_deref().filter(|c| !c.is_empty()) {
        Some(comment) => {
            // "--" is not allowed inside XML comments
            let mut comment = comment.to_string();
            while comment.contains("--") {
                comment = comment.replace("--", "- -");
            }
            xml.replacen("<nzb ", &format!("<!-- {comment} -->\n<nzb "), 1)
        }
        None => xml,
    }
}
