//! Chunker: partitions normalized chapter text into synthesis-ready units
//! bounded by character count and by an estimated phoneme budget
//! (spec.md §4.2).

use serde::{Deserialize, Serialize};

use crate::document::{ChapterKind, Document};

/// The atomic unit of synthesis (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based, monotonic across the whole document.
    pub ordinal: u64,
    pub chapter_ordinal: u32,
    pub chapter_title: Option<String>,
    /// UTF-8 text, post-normalization.
    pub text: String,
    /// True for the first chunk of each narrative chapter.
    pub is_chapter_start: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub char_target: usize,
    pub phoneme_hard_limit: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            char_target: 400,
            phoneme_hard_limit: 510,
        }
    }
}

const CLAUSE_DELIMS: &[char] = &[',', ';', ':', '\u{2014}'];
const SENTENCE_ENDERS: &[char] = &['.', '!', '?'];

/// Estimate the phoneme count of `text` using the per-script heuristic
/// normative per spec.md §4.2: Latin tokens use `ceil(len * 1.1)`, CJK
/// tokens use `2` per character, other scripts use `len * 2`.
pub fn estimate_phonemes(text: &str) -> usize {
    text.split_whitespace().map(estimate_token_phonemes).sum()
}

fn estimate_token_phonemes(token: &str) -> usize {
    let len = token.chars().count();
    if len == 0 {
        return 0;
    }
    match classify_token_script(token) {
        Script::Latin => ((len as f64) * 1.1).ceil() as usize,
        Script::Cjk => len * 2,
        Script::Other => len * 2,
    }
}

enum Script {
    Latin,
    Cjk,
    Other,
}

fn classify_token_script(token: &str) -> Script {
    let mut has_cjk = false;
    let mut has_non_latin = false;
    for c in token.chars() {
        if is_cjk(c) {
            has_cjk = true;
        } else if c.is_alphabetic() && !c.is_ascii_alphabetic() && !is_latin_supplement(c) {
            has_non_latin = true;
        }
    }
    if has_cjk {
        Script::Cjk
    } else if has_non_latin {
        Script::Other
    } else {
        Script::Latin
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3040..=0x309F | 0x30A0..=0x30FF | 0xAC00..=0xD7A3 | 0x3400..=0x4DBF)
}

fn is_latin_supplement(c: char) -> bool {
    matches!(c as u32, 0x00C0..=0x024F)
}

/// Run the Chunker over a normalized document's narrative chapters.
///
/// Determinism property: given identical inputs and options, the produced
/// sequence is byte-identical.
pub fn chunk_document(document: &Document, opts: ChunkOptions) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut ordinal = 0u64;

    for chapter in &document.chapters {
        if chapter.kind != ChapterKind::Narrative {
            continue;
        }
        let mut chapter_started = false;
        let mut current = String::new();

        for paragraph in &chapter.paragraphs {
            for unit in split_into_units(&paragraph.text, opts) {
                let candidate = if current.is_empty() {
                    unit.clone()
                } else {
                    format!("{current} {unit}")
                };
                if !current.is_empty() && exceeds_bounds(&candidate, opts) {
                    chunks.push(make_chunk(
                        &mut ordinal,
                        chapter.ordinal,
                        chapter.title.clone(),
                        std::mem::take(&mut current),
                        &mut chapter_started,
                    ));
                    current = unit;
                } else {
                    current = candidate;
                }
            }
        }

        if !current.is_empty() {
            chunks.push(make_chunk(
                &mut ordinal,
                chapter.ordinal,
                chapter.title.clone(),
                current,
                &mut chapter_started,
            ));
        }
    }

    chunks
}

fn make_chunk(
    ordinal: &mut u64,
    chapter_ordinal: u32,
    chapter_title: Option<String>,
    text: String,
    chapter_started: &mut bool,
) -> Chunk {
    let chunk = Chunk {
        ordinal: *ordinal,
        chapter_ordinal,
        chapter_title,
        text,
        is_chapter_start: !*chapter_started,
    };
    *chapter_started = true;
    *ordinal += 1;
    chunk
}

fn exceeds_bounds(text: &str, opts: ChunkOptions) -> bool {
    text.chars().count() > opts.char_target || estimate_phonemes(text) >= opts.phoneme_hard_limit
}

/// Split a paragraph into units no larger than the configured bounds,
/// preferring sentence boundaries, then clause delimiters, then a hard
/// whitespace split, in that order (spec.md §4.2).
fn split_into_units(text: &str, opts: ChunkOptions) -> Vec<String> {
    let mut units = Vec::new();
    for sentence in split_sentences(text) {
        if !exceeds_bounds(&sentence, opts) {
            units.push(sentence);
            continue;
        }
        let clauses = split_on_delims(&sentence, CLAUSE_DELIMS);
        if clauses.len() > 1 && clauses.iter().all(|c| !exceeds_bounds(c, opts)) {
            units.extend(clauses);
            continue;
        }
        units.extend(hard_split_whitespace(&sentence, opts));
    }
    units
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if SENTENCE_ENDERS.contains(&c) {
            let trimmed = current.trim().to_string();
            if !trimmed.is_empty() {
                sentences.push(trimmed);
            }
            current.clear();
        }
    }
    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        sentences.push(trimmed);
    }
    if sentences.is_empty() {
        vec![]
    } else {
        sentences
    }
}

fn split_on_delims(text: &str, delims: &[char]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if delims.contains(&c) {
            let trimmed = current.trim().to_string();
            if !trimmed.is_empty() {
                parts.push(trimmed);
            }
            current.clear();
        }
    }
    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        parts.push(trimmed);
    }
    parts
}

fn hard_split_whitespace(text: &str, opts: ChunkOptions) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut units = Vec::new();
    let mut current = String::new();
    for word in words {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if !current.is_empty() && exceeds_bounds(&candidate, opts) {
            units.push(std::mem::take(&mut current));
            current = word.to_string();
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        units.push(current);
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chapter, Document, Paragraph};

    fn narrative_document(paragraphs: Vec<&str>) -> Document {
        Document {
            title: None,
            author: None,
            chapters: vec![Chapter::new(
                0,
                Some("Chapter 1".to_string()),
                paragraphs.into_iter().map(Paragraph::new).collect(),
            )],
        }
    }

    #[test]
    fn coverage_invariant_holds_for_small_input() {
        let document = narrative_document(vec!["Hello world."]);
        let chunks = chunk_document(&document, ChunkOptions::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world.");
        assert!(chunks[0].is_chapter_start);
    }

    #[test]
    fn first_chunk_of_chapter_is_marked_chapter_start() {
        let document = narrative_document(vec!["First sentence.", "Second sentence."]);
        let chunks = chunk_document(&document, ChunkOptions {
            char_target: 10,
            phoneme_hard_limit: 510,
        });
        assert!(chunks[0].is_chapter_start);
        assert!(chunks[1..].iter().all(|c| !c.is_chapter_start));
    }

    #[test]
    fn oversized_sentence_hard_splits_on_whitespace() {
        let long_word_sentence = "word ".repeat(500);
        let document = narrative_document(vec![&long_word_sentence]);
        let chunks = chunk_document(&document, ChunkOptions::default());
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= ChunkOptions::default().char_target + 50);
            assert!(estimate_phonemes(&chunk.text) < ChunkOptions::default().phoneme_hard_limit);
        }
    }

    #[test]
    fn chunks_never_cross_chapter_boundaries() {
        let document = Document {
            title: None,
            author: None,
            chapters: vec![
                Chapter::new(0, Some("Chapter 1".to_string()), vec![Paragraph::new("Short text.")]),
                Chapter::new(1, Some("Chapter 2".to_string()), vec![Paragraph::new("More text here.")]),
            ],
        };
        let chunks = chunk_document(&document, ChunkOptions::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chapter_ordinal, 0);
        assert_eq!(chunks[1].chapter_ordinal, 1);
        assert!(chunks[1].is_chapter_start);
    }

    #[test]
    fn phoneme_estimate_latin_uses_ceil_1_1() {
        assert_eq!(estimate_token_phonemes("hello"), 6); // ceil(5*1.1)=6
    }

    #[test]
    fn phoneme_estimate_cjk_uses_2_per_char() {
        assert_eq!(estimate_token_phonemes("你好"), 4);
    }

    #[test]
    fn determinism_same_input_same_output() {
        let document = narrative_document(vec!["Once upon a time, in a faraway land."]);
        let a = chunk_document(&document, ChunkOptions::default());
        let b = chunk_document(&document, ChunkOptions::default());
        assert_eq!(
            a.iter().map(|c| &c.text).collect::<Vec<_>>(),
            b.iter().map(|c| &c.text).collect::<Vec<_>>()
        );
    }
}
