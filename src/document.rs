use serde::{Deserialize, Serialize};

/// The normalized in-memory document produced by an external parser. No I/O.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Document {
    pub title: Option<String>,
    pub author: Option<String>,
    pub chapters: Vec<Chapter>,
}

/// Whether a chapter carries the narrated story or is front/back matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChapterKind {
    Narrative,
    NonNarrative,
}

/// One chapter of a `Document`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub ordinal: u32,
    pub title: Option<String>,
    pub paragraphs: Vec<Paragraph>,
    pub kind: ChapterKind,
    /// Set by the parser when it already knows a chapter is TOC/colophon/
    /// copyright matter; feeds the Normalizer's `structural_metadata` signal.
    pub structural_metadata: bool,
}

impl Chapter {
    pub fn new(ordinal: u32, title: Option<String>, paragraphs: Vec<Paragraph>) -> Self {
        Self {
            ordinal,
            title,
            paragraphs,
            kind: ChapterKind::Narrative,
            structural_metadata: false,
        }
    }

    /// Full chapter text, paragraphs joined by a single newline, matching
    /// how the Normalizer's pattern-density signal scans lines.
    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn char_len(&self) -> usize {
        self.paragraphs.iter().map(|p| p.text.chars().count()).sum()
    }
}

/// A single paragraph of plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    pub text: String,
}

impl Paragraph {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_text_joins_paragraphs_with_newline() {
        let chapter = Chapter::new(
            0,
            Some("Chapter 1".to_string()),
            vec![Paragraph::new("First."), Paragraph::new("Second.")],
        );
        assert_eq!(chapter.text(), "First.\nSecond.");
    }

    #[test]
    fn char_len_counts_all_paragraphs() {
        let chapter = Chapter::new(0, None, vec![Paragraph::new("abc"), Paragraph::new("de")]);
        assert_eq!(chapter.char_len(), 5);
    }
}
