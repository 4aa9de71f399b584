//! Paragraph-first text chunking with overlap.
//!
//! Text is split on blank lines; paragraphs that fit are merged greedily, longer
//! ones are packed sentence by sentence. Every chunk after the first is then
//! prefixed with the tail of its predecessor so neighbouring chunks share context.
//!
//! Lengths are counted in characters, never bytes.

use regex::Regex;
use std::sync::OnceLock;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

fn paragraph_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:\r?\n){2,}").expect("paragraph pattern is valid"))
}

fn sentence_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s+").expect("sentence pattern is valid"))
}

/// A chunk produced by the packing pass, before overlap prefixes are added.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedChunk {
    pub text: String,
    /// Set when the chunk is a single sentence longer than the packing budget.
    pub overflow: bool,
}

/// Split `text` into overlapping chunks of at most `max_length` characters.
///
/// A sentence that alone exceeds the packing budget is emitted whole, so such
/// chunks may be longer than `max_length`.
///
/// An `overlap` of `max_length` or more is clamped to `max_length / 2`, so
/// `chunk(text, 20, 50)` behaves like `chunk(text, 20, 10)`. Every chunk after
/// the first then starts with the last `min(clamped overlap, len)` characters
/// of its predecessor.
pub fn chunk(text: &str, max_length: usize, overlap: usize) -> Vec<String> {
    let overlap = effective_overlap(max_length, overlap);
    let packed = pack(text, max_length, overlap);
    apply_overlap(&packed, max_length, overlap)
}

/// Room left for packed content once the overlap prefix is accounted for.
/// Uses the same overlap clamp as [`chunk`].
pub fn packing_budget(max_length: usize, overlap: usize) -> usize {
    let max_length = max_length.max(1);
    let overlap = effective_overlap(max_length, overlap);
    max_length - overlap
}

/// Overlap values that would swallow a whole chunk are halved down to fit.
fn effective_overlap(max_length: usize, overlap: usize) -> usize {
    let max_length = max_length.max(1);
    if overlap >= max_length {
        max_length / 2
    } else {
        overlap
    }
}

/// First pass: paragraphs and sentences packed into chunks within the budget.
pub fn pack(text: &str, max_length: usize, overlap: usize) -> Vec<PackedChunk> {
    let overlap = effective_overlap(max_length, overlap);
    let budget = packing_budget(max_length, overlap);
    let mut chunks: Vec<PackedChunk> = Vec::new();

    for section in paragraph_boundary().split(text) {
        let section = section.trim();
        if section.is_empty() {
            continue;
        }
        let section_len = char_len(section);

        if section_len > budget {
            pack_sentences(section, budget, overlap, &mut chunks);
            continue;
        }

        match chunks.last_mut() {
            Some(last)
                if !last.overflow
                    && char_len(&last.text) + section_len + PARAGRAPH_SEPARATOR.len() <= budget =>
            {
                last.text.push_str(PARAGRAPH_SEPARATOR);
                last.text.push_str(section);
            }
            _ => chunks.push(PackedChunk {
                text: section.to_string(),
                overflow: false,
            }),
        }
    }

    chunks
}

fn pack_sentences(section: &str, budget: usize, overlap: usize, chunks: &mut Vec<PackedChunk>) {
    let mut current = String::new();

    for sentence in split_sentences(section) {
        let sentence_len = char_len(sentence);

        if !current.is_empty() && char_len(&current) + sentence_len + 1 > budget {
            let closed = current.trim().to_string();
            let seed = tail_chars(&closed, overlap);
            // A seed that cannot fit next to the sentence is dropped.
            current = if !seed.is_empty() && char_len(seed) + sentence_len + 1 <= budget {
                seed.to_string()
            } else {
                String::new()
            };
            push_packed(chunks, closed, budget);
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
    }

    let rest = current.trim();
    if !rest.is_empty() {
        push_packed(chunks, rest.to_string(), budget);
    }
}

fn push_packed(chunks: &mut Vec<PackedChunk>, text: String, budget: usize) {
    let overflow = char_len(&text) > budget;
    chunks.push(PackedChunk { text, overflow });
}

/// Sentences end at `.`, `!` or `?` followed by whitespace; the punctuation stays.
pub fn split_sentences(section: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in sentence_boundary().find_iter(section) {
        // The terminator is a single ASCII byte.
        let end = boundary.start() + 1;
        let sentence = section[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }

    let tail = section[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Second pass: prefix every chunk after the first with its predecessor's tail.
pub fn apply_overlap(chunks: &[PackedChunk], max_length: usize, overlap: usize) -> Vec<String> {
    let overlap = effective_overlap(max_length, overlap);
    let max_length = max_length.max(1);

    chunks
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            if i == 0 || overlap == 0 {
                return piece.text.clone();
            }
            let prefix = tail_chars(&chunks[i - 1].text, overlap);
            let combined = format!("{}{}", prefix, piece.text);
            if piece.overflow {
                combined
            } else {
                head_chars(&combined, max_length).to_string()
            }
        })
        .collect()
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// The last `n` characters of `text`, or all of it when shorter.
pub fn tail_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let len = char_len(text);
    if n >= len {
        return text;
    }
    match text.char_indices().nth(len - n) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// The first `n` characters of `text`, or all of it when shorter.
pub fn head_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_paragraphs_merge_with_separator() {
        let chunks = chunk("First part.\n\nSecond part.", 100, 10);
        assert_eq!(chunks, vec!["First part.\n\nSecond part.".to_string()]);
    }

    #[test]
    fn blank_input_yields_nothing() {
        assert!(chunk("", 50, 5).is_empty());
        assert!(chunk("\n\n\n   \n\n", 50, 5).is_empty());
    }

    #[test]
    fn sentences_keep_their_terminators() {
        let sentences = split_sentences("Is it on? Yes! It is.  Done");
        assert_eq!(sentences, vec!["Is it on?", "Yes!", "It is.", "Done"]);
    }

    #[test]
    fn char_helpers_respect_multibyte_text() {
        let text = "añoñeño";
        assert_eq!(tail_chars(text, 3), "eño");
        assert_eq!(head_chars(text, 2), "añ");
        assert_eq!(tail_chars(text, 0), "");
        assert_eq!(tail_chars(text, 50), text);
        assert_eq!(head_chars(text, 50), text);
    }

    #[test]
    fn zero_overlap_adds_no_prefix() {
        let text = "Alpha beta gamma.\n\nDelta epsilon zeta.";
        let chunks = chunk(text, 20, 0);
        assert_eq!(chunks, vec!["Alpha beta gamma.", "Delta epsilon zeta."]);
    }

    #[test]
    fn long_sentence_is_emitted_whole() {
        let long = "word ".repeat(30).trim_end().to_string() + ".";
        let text = format!("Short one. {} Tail here.", long);
        let packed = pack(&text, 40, 5);
        assert!(packed.iter().any(|c| c.overflow && c.text == long));

        let chunks = chunk(&text, 40, 5);
        assert!(chunks.iter().any(|c| c.contains(&long)));
    }

    #[test]
    fn oversized_overlap_is_clamped() {
        let chunks = chunk("One two three.\n\nFour five six.", 30, 40);
        assert_eq!(chunks, vec!["One two three.", "One two three.Four five six."]);
    }

    #[test]
    fn clamped_overlap_matches_explicit_half_overlap() {
        let text = "Red fox. Blue jay. Green frog.\n\nGrey owl. Black cat. White swan.";
        let clamped = chunk(text, 20, 50);
        assert_eq!(clamped, chunk(text, 20, 10));
        assert_eq!(packing_budget(20, 50), 10);

        assert!(clamped.len() > 1);
        let firsts = pack(text, 20, 10);
        for (i, piece) in clamped.iter().enumerate().skip(1) {
            let prev = &firsts[i - 1].text;
            assert!(piece.starts_with(tail_chars(prev, 10)), "{piece:?} after {prev:?}");
        }
    }
}
