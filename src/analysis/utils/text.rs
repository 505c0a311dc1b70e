//! Segmentation helpers shared by the analyzers.
//!
//! All offsets are byte offsets into the original text and always fall on
//! char boundaries.

use super::patterns::CommonPatterns;
use std::ops::Range;

const SENTENCE_TERMINATORS: [char; 4] = ['.', '!', '?', '…'];
const CLOSERS: [char; 7] = ['"', '\'', '”', '’', ')', ']', '*'];
const ABBREVIATIONS: [&str; 9] = ["Mr", "Mrs", "Ms", "Dr", "St", "Prof", "Capt", "Lt", "Sgt"];

/// Word tokens with their byte offsets
pub fn words(text: &str) -> impl Iterator<Item = (usize, &str)> {
    CommonPatterns::word()
        .find_iter(text)
        .map(|m| (m.start(), m.as_str()))
}

/// Number of word tokens
pub fn word_count(text: &str) -> usize {
    CommonPatterns::word().find_iter(text).count()
}

/// Non-blank lines, trimmed. One line is one paragraph.
pub fn lines(text: &str) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        let trimmed_start = content.trim_start();
        if !trimmed_start.is_empty() {
            let lead = content.len() - trimmed_start.len();
            let start = offset + lead;
            let end = offset + content.trim_end().len();
            out.push(start..end);
        }
        offset += line.len();
    }
    out
}

/// Sentence ranges. Sentences never span a line break.
pub fn sentences(text: &str) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    for line in lines(text) {
        split_line_sentences(text, line, &mut out);
    }
    out
}

fn split_line_sentences(text: &str, line: Range<usize>, out: &mut Vec<Range<usize>>) {
    let slice = &text[line.clone()];
    let mut start = 0;
    let mut iter = slice.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if !SENTENCE_TERMINATORS.contains(&c) {
            continue;
        }

        if c == '.' {
            let last_word = slice[start..i]
                .rsplit(|ch: char| !ch.is_alphabetic())
                .next()
                .unwrap_or("");
            if ABBREVIATIONS.contains(&last_word) {
                continue;
            }
        }

        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = iter.peek() {
            if SENTENCE_TERMINATORS.contains(&next) || CLOSERS.contains(&next) {
                end = j + next.len_utf8();
                iter.next();
            } else {
                break;
            }
        }

        let at_boundary = iter.peek().map_or(true, |&(_, next)| next.is_whitespace());
        // `"Who's there?" she asked` keeps the dialogue tag in the same sentence
        let continues_lowercase = slice[end..]
            .trim_start()
            .chars()
            .next()
            .is_some_and(char::is_lowercase);
        if at_boundary && !continues_lowercase {
            push_trimmed(slice, line.start, start..end, out);
            start = end;
        }
    }

    push_trimmed(slice, line.start, start..slice.len(), out);
}

fn push_trimmed(slice: &str, base: usize, range: Range<usize>, out: &mut Vec<Range<usize>>) {
    let piece = &slice[range.clone()];
    let trimmed = piece.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = piece.len() - piece.trim_start().len();
    let trail = piece.len() - piece.trim_end().len();
    out.push(base + range.start + lead..base + range.end - trail);
}

/// Estimated syllables in a single word (vowel-group heuristic, minimum 1)
pub fn count_syllables(word: &str) -> usize {
    let lower: Vec<char> = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();
    if lower.is_empty() {
        return 0;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0;
    let mut prev_vowel = false;
    for &c in &lower {
        let vowel = is_vowel(c);
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }

    let n = lower.len();
    if n > 2 && lower[n - 1] == 'e' && lower[n - 2] != 'l' && !is_vowel(lower[n - 2]) && count > 1 {
        count -= 1;
    }

    count.max(1)
}

/// Byte ranges of quoted dialogue
pub fn dialogue_ranges(text: &str) -> Vec<Range<usize>> {
    CommonPatterns::dialogue()
        .find_iter(text)
        .map(|m| m.start()..m.end())
        .collect()
}

/// Fraction of non-whitespace characters that sit inside dialogue quotes
pub fn dialogue_ratio(text: &str) -> f64 {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return 0.0;
    }
    let quoted: usize = dialogue_ranges(text)
        .into_iter()
        .map(|r| text[r].chars().filter(|c| !c.is_whitespace()).count())
        .sum();
    (quoted as f64 / total as f64).clamp(0.0, 1.0)
}

/// Mean and population variance
pub fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

/// Clamp a byte offset down to the nearest char boundary
pub fn floor_char_boundary(text: &str, mut offset: usize) -> usize {
    if offset >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Overlap test for half-open ranges
pub fn ranges_overlap(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}
