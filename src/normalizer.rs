//! Text Normalizer: produces a narrative-only document with clean text.
//!
//! The whole pass is a pure function of `(document, options)`. Failing
//! classification is not an error; it degrades to "keep chapter".

use std::sync::OnceLock;

use regex::Regex;

use crate::document::{Chapter, ChapterKind, Document, Paragraph};

/// Options controlling the Normalizer. Separate from `Config` because the
/// Normalizer is usable standalone (e.g. from tests) without the rest of
/// the pipeline's configuration surface.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Chapters scoring at or above this threshold are tagged non-narrative.
    pub non_narrative_threshold: f32,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            non_narrative_threshold: 0.5,
        }
    }
}

const TITLE_KEYWORDS: &[&str] = &[
    "table of contents",
    "contents",
    "bibliography",
    "references",
    "notes",
    "index",
    "acknowledgments",
    "acknowledgements",
    "about the author",
    "about the publisher",
    "copyright",
    "foreword",
    "preface",
];

const CATALOG_HEADERS: &[&str] = &["also by", "books by", "other works", "praise for"];

const VERB_SET: &[&str] = &[
    "is", "was", "were", "are", "has", "had", "said", "went", "came", "saw", "knew", "felt",
    "took", "made", "did", "ran",
];

fn isbn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(ISBN(-1[03])?:?\s*)?(97[89][- ]?)?\d{1,5}[- ]?\d+[- ]?\d+[- ]?[\dXx]$")
            .expect("static ISBN pattern is valid")
    })
}

fn pattern_density_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\[\d+\])|(pp?\.\s*\d+)|(\([A-Z][a-zA-Z]+,?\s+\d{4}\))")
            .expect("static pattern-density pattern is valid")
    })
}

fn hyphen_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z]+)-\n([A-Za-z]+)").expect("static hyphen-break pattern is valid")
    })
}

/// Run the full Normalizer pass: hyphen repair, ISBN/catalog stripping,
/// non-narrative classification, and boundary extraction (spec.md §4.1).
pub fn normalize(document: &Document, opts: &NormalizeOptions) -> Document {
    let chapter_count = document.chapters.len();
    let median_len = median_chapter_len(&document.chapters);

    let mut chapters: Vec<Chapter> = document
        .chapters
        .iter()
        .enumerate()
        .map(|(idx, chapter)| {
            let mut chapter = repair_and_strip(chapter);
            let score = classify(&chapter, idx, chapter_count, median_len);
            if score >= opts.non_narrative_threshold {
                chapter.kind = ChapterKind::NonNarrative;
            } else {
                chapter.kind = ChapterKind::Narrative;
            }
            chapter
        })
        .collect();

    extract_narrative_boundary(&mut chapters);

    Document {
        title: document.title.clone(),
        author: document.author.clone(),
        chapters,
    }
}

/// Hyphen repair + ISBN/catalog-block stripping (spec.md §4.1 steps 1-2).
fn repair_and_strip(chapter: &Chapter) -> Chapter {
    let mut paragraphs: Vec<Paragraph> = Vec::with_capacity(chapter.paragraphs.len());
    let mut pending_catalog_block: Vec<String> = Vec::new();

    for p in &chapter.paragraphs {
        let repaired = repair_hyphens(&p.text);

        if isbn_re().is_match(repaired.trim()) {
            continue;
        }

        let first_nonempty = repaired.lines().find(|l| !l.trim().is_empty());
        let starts_catalog_block = first_nonempty
            .map(|l| {
                let lower = l.trim().to_lowercase();
                CATALOG_HEADERS.iter().any(|h| lower.starts_with(h))
            })
            .unwrap_or(false);

        if starts_catalog_block {
            pending_catalog_block.push(repaired);
            continue;
        }

        if !pending_catalog_block.is_empty() {
            let block_len: usize = pending_catalog_block.iter().map(|s| s.chars().count()).sum();
            if block_len < 200 {
                // too short to be a catalog block; keep it as prose after all
                paragraphs.extend(pending_catalog_block.drain(..).map(Paragraph::new));
            } else {
                pending_catalog_block.clear();
            }
        }

        paragraphs.push(Paragraph::new(repaired));
    }

    if !pending_catalog_block.is_empty() {
        let block_len: usize = pending_catalog_block.iter().map(|s| s.chars().count()).sum();
        if block_len < 200 {
            paragraphs.extend(pending_catalog_block.into_iter().map(Paragraph::new));
        }
    }

    Chapter {
        ordinal: chapter.ordinal,
        title: chapter.title.clone(),
        paragraphs,
        kind: chapter.kind,
        structural_metadata: chapter.structural_metadata,
    }
}

/// Join `<word>-\n<word>` sequences whose fragments are both alphabetic and
/// whose joined length is at most 30 characters.
fn repair_hyphens(text: &str) -> String {
    hyphen_break_re()
        .replace_all(text, |caps: &regex::Captures| {
            let left = &caps[1];
            let right = &caps[2];
            if left.len() + right.len() <= 30 {
                format!("{left}{right}")
            } else {
                format!("{left}-\n{right}")
            }
        })
        .into_owned()
}

fn median_chapter_len(chapters: &[Chapter]) -> usize {
    if chapters.is_empty() {
        return 0;
    }
    let mut lens: Vec<usize> = chapters.iter().map(|c| c.char_len()).collect();
    lens.sort_unstable();
    lens[lens.len() / 2]
}

/// The 5-signal non-narrative classifier (spec.md §4.1 step 3). Returns a
/// score in `[0, 1]`.
fn classify(chapter: &Chapter, index: usize, chapter_count: usize, median_len: usize) -> f32 {
    let title_score = title_keyword_match(chapter, index, chapter_count);
    let structural_score = if chapter.structural_metadata { 1.0 } else { 0.0 };
    let pattern_score = pattern_density(chapter);
    let prose_score = 1.0 - prose_density(chapter);
    let length_score = relative_length(chapter, index, chapter_count, median_len);

    0.35 * title_score + 0.20 * structural_score + 0.15 * pattern_score + 0.15 * prose_score
        + 0.15 * length_score
}

fn title_keyword_match(chapter: &Chapter, index: usize, chapter_count: usize) -> f32 {
    let Some(title) = chapter.title.as_ref() else {
        return 0.0;
    };
    let lower = title.trim().to_lowercase();
    if !TITLE_KEYWORDS.iter().any(|k| lower == *k) {
        return 0.0;
    }
    // Front-matter bias: earlier chapters score higher.
    if chapter_count == 0 {
        return 1.0;
    }
    let position = index as f32 / chapter_count as f32;
    if position <= 0.2 { 1.0 } else { 0.7 }
}

fn pattern_density(chapter: &Chapter) -> f32 {
    let lines: Vec<&str> = chapter.text().lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return 0.0;
    }
    let matching = lines.iter().filter(|l| pattern_density_re().is_match(l)).count();
    matching as f32 / lines.len() as f32
}

fn prose_density(chapter: &Chapter) -> f32 {
    let text = chapter.text();
    let sentences: Vec<&str> = text
        .split(|c| c == '.' || c == '!' || c == '?')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        return 0.0;
    }
    let qualifying = sentences
        .iter()
        .filter(|s| {
            let tokens: Vec<&str> = s.split_whitespace().collect();
            tokens.len() >= 8
                && tokens
                    .iter()
                    .any(|t| VERB_SET.contains(&t.to_lowercase().trim_matches(|c: char| !c.is_alphanumeric())))
        })
        .count();
    qualifying as f32 / sentences.len() as f32
}

fn relative_length(chapter: &Chapter, index: usize, chapter_count: usize, median_len: usize) -> f32 {
    if median_len == 0 {
        return 0.0;
    }
    let ratio = chapter.char_len() as f32 / median_len as f32;
    let is_edge = index == 0 || index + 1 == chapter_count;
    if is_edge && ratio < 0.3 {
        1.0 - ratio
    } else {
        0.0
    }
}

/// Boundary extraction (spec.md §4.1 step 4): discard all chapters outside
/// `[first_narrative, last_narrative]`.
fn extract_narrative_boundary(chapters: &mut Vec<Chapter>) {
    let first = chapters.iter().position(|c| c.kind == ChapterKind::Narrative);
    let last = chapters.iter().rposition(|c| c.kind == ChapterKind::Narrative);
    match (first, last) {
        (Some(first), Some(last)) => {
            let mut idx = 0;
            chapters.retain(|_| {
                let keep = idx >= first && idx <= last;
                idx += 1;
                keep
            });
        }
        _ => chapters.clear(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(chapters: Vec<Chapter>) -> Document {
        Document {
            title: None,
            author: None,
            chapters,
        }
    }

    fn narrative_chapter(ordinal: u32, title: &str, body: &str) -> Chapter {
        Chapter::new(ordinal, Some(title.to_string()), vec![Paragraph::new(body)])
    }

    #[test]
    fn title_keyword_chapters_are_dropped() {
        let chapters = vec![
            narrative_chapter(0, "Copyright", "All rights reserved. Published 2020."),
            narrative_chapter(
                1,
                "Chapter 1",
                "She walked into the room and looked around carefully for any signs of danger.",
            ),
            narrative_chapter(2, "Acknowledgments", "Thanks to everyone who helped with this book."),
        ];
        let normalized = normalize(&doc(chapters), &NormalizeOptions::default());
        assert_eq!(normalized.chapters.len(), 1);
        assert_eq!(normalized.chapters[0].title.as_deref(), Some("Chapter 1"));
    }

    #[test]
    fn hyphen_repair_joins_short_fragments() {
        let chapter = Chapter::new(
            0,
            Some("Chapter 1".to_string()),
            vec![Paragraph::new("A beauti-\nful morning came quietly over the quiet valley below.")],
        );
        let repaired = repair_and_strip(&chapter);
        assert!(repaired.paragraphs[0].text.contains("beautiful"));
        assert!(!repaired.paragraphs[0].text.contains("beauti-"));
    }

    #[test]
    fn isbn_lines_are_removed() {
        let chapter = Chapter::new(
            0,
            Some("Chapter 1".to_string()),
            vec![
                Paragraph::new("ISBN-13: 978-0-123456-78-9"),
                Paragraph::new("The story begins on a quiet street in a small coastal town."),
            ],
        );
        let repaired = repair_and_strip(&chapter);
        assert_eq!(repaired.paragraphs.len(), 1);
        assert!(repaired.paragraphs[0].text.starts_with("The story begins"));
    }

    #[test]
    fn boundary_extraction_drops_leading_and_trailing_non_narrative() {
        let chapters = vec![
            narrative_chapter(0, "Foreword", "A short foreword about the author's inspiration."),
            narrative_chapter(1, "Chapter 1", "He stood at the edge of the cliff and stared at the sea below him quietly."),
            narrative_chapter(2, "Index", "A, 1. B, 4. C, 9."),
        ];
        let normalized = normalize(&doc(chapters), &NormalizeOptions::default());
        assert_eq!(normalized.chapters.len(), 1);
    }
}
