//! Folder listing types and post/note summaries.

use std::time::SystemTime;

use pulldown_cmark::{Event, Parser};
use serde::Serialize;

use quire_types::SitePrefix;

/// Files past this many in one folder are listed by name only.
pub const MAX_FILE_DETAILS: usize = 10_000;

const PREVIEW_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<SystemTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl ListEntry {
    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size: None,
            mtime: None,
            title: None,
            preview: None,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            is_dir: false,
            ..Self::folder(name)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub site: SitePrefix,
    pub path: String,
    pub entries: Vec<ListEntry>,
}

impl Listing {
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

fn plain_text(line: &str) -> String {
    let mut out = String::new();
    for event in Parser::new(line) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            _ => {}
        }
    }
    out.trim().to_string()
}

fn truncate(mut s: String, max: usize) -> String {
    if let Some((i, _)) = s.char_indices().nth(max) {
        s.truncate(i);
        s.push('…');
    }
    s
}

/// Title and preview of a Markdown document: the first two lines that
/// still have text once styling is stripped.
pub fn title_and_preview(markdown: &str) -> (Option<String>, Option<String>) {
    let mut lines = markdown
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(plain_text)
        .filter(|text| !text.is_empty());
    let title = lines.next().map(|t| truncate(t, PREVIEW_CHARS));
    let preview = lines.next().map(|t| truncate(t, PREVIEW_CHARS));
    (title, preview)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_and_preview() {
        let doc = "\n# Hello *world*\n\n---\n\nSome **bold** and `code` here.\n\nThird.";
        let (title, preview) = title_and_preview(doc);
        assert_eq!(title.as_deref(), Some("Hello world"));
        assert_eq!(preview.as_deref(), Some("Some bold and code here."));
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(title_and_preview(""), (None, None));
        assert_eq!(title_and_preview("just a title").1, None);
    }

    #[test]
    fn test_long_lines_truncated() {
        let line = "a".repeat(500);
        let (title, _) = title_and_preview(&line);
        assert_eq!(title.unwrap().chars().count(), PREVIEW_CHARS + 1);
    }
}
