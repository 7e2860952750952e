//! The format-specific text extraction collaborator (spec.md §1, §6):
//! out of scope for the core, injected by the host application. EPUB,
//! PDF, and markup-aware parsing are deliberately not implemented here;
//! [`PlainTextParser`] is the one concrete implementation this crate
//! carries, so the ambient CLI/server binaries have something to run
//! against without pulling in a document-format library.

use std::path::Path;

use crate::document::{Chapter, Document, Paragraph};

pub trait DocumentParser {
    /// Parse `path` into a `Document`. No partial documents are accepted:
    /// parser errors map to a typed failure surfaced to the user.
    fn parse(&self, path: &Path) -> anyhow::Result<Document>;
}

/// Treats the input as a single untitled chapter, one paragraph per line.
/// Chapter/title detection, and every other format's markup, is left to a
/// host-supplied `DocumentParser`.
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, path: &Path) -> anyhow::Result<Document> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Document {
            title: None,
            author: None,
            chapters: vec![Chapter::new(
                0,
                None,
                contents.lines().map(Paragraph::new).collect(),
            )],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_parser_splits_lines_into_paragraphs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.txt");
        std::fs::write(&path, "line one\nline two\n").unwrap();

        let doc = PlainTextParser.parse(&path).unwrap();
        assert_eq!(doc.chapters.len(), 1);
        assert_eq!(doc.chapters[0].paragraphs.len(), 2);
    }

    #[test]
    fn plain_text_parser_produces_an_untitled_chapter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.txt");
        std::fs::write(&path, "Hello world.").unwrap();

        let doc = PlainTextParser.parse(&path).unwrap();
        assert_eq!(doc.chapters[0].title, None);
    }
}
