//! Word counting and pagination over generated story text.

use crate::core::story::Section;
use regex::Regex;
use std::sync::LazyLock;

/// Longest line (in words) still treated as a leading title.
const MAX_TITLE_WORDS: usize = 8;

static WORD_COUNT_NOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[\s(\[*_]*(word count|words|kelime sayısı)\s*[:=\-]?\s*(about|approximately|approx\.?|~)?\s*\d+\s*(words)?[\s)\]*_.]*$",
    )
    .expect("static regex")
});

/// Removes the noise generators like to add around a story: short leading
/// title lines ending in a colon (or markdown headings) and trailing
/// "Word count: N" annotations.
pub fn strip_meta(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();

    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    while lines.last().is_some_and(|l| {
        let trimmed = l.trim();
        trimmed.is_empty() || WORD_COUNT_NOTE.is_match(trimmed)
    }) {
        lines.pop();
    }

    let body_start = lines
        .iter()
        .position(|l| {
            let trimmed = l.trim();
            !trimmed.is_empty() && !is_title_line(trimmed)
        })
        .unwrap_or(lines.len());
    lines.drain(..body_start);

    lines.join("\n").trim().to_string()
}

fn is_title_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.starts_with('#') {
        return true;
    }
    trimmed.ends_with(':') && trimmed.split_whitespace().count() <= MAX_TITLE_WORDS
}

/// Canonical word count used by every length check.
pub fn count_words(text: &str) -> usize {
    strip_meta(text).split_whitespace().count()
}

/// Keeps the first `max_words` words, rejoined with single spaces.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    strip_meta(text)
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits text into consecutive sections of at most `max_words` words.
/// A zero limit is treated as one word per section.
pub fn split_sections(text: &str, max_words: usize) -> Vec<Section> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(max_words.max(1))
        .enumerate()
        .map(|(index, chunk)| Section {
            index,
            text: chunk.join(" "),
            word_count: chunk.len(),
        })
        .collect()
}
