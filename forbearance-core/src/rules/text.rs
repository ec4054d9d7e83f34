// Text helpers shared by the detection rules and the report assembler.
//
// Offsets are byte offsets into UTF-8 page text. Anything that widens a span
// by a fixed amount has to snap back onto a character boundary.

use crate::types::EvidenceSpan;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Dollar amounts: "$1,234.56", "$ 980", "12,400.00", "311.27"
    static ref MONEY_PATTERN: Regex = Regex::new(
        r"\$\s?\d{1,3}(?:,\d{3})*(?:\.\d{2})?\b|\$\s?\d+(?:\.\d{2})?\b|\b\d{1,3}(?:,\d{3})+(?:\.\d{2})?\b|\b\d+\.\d{2}\b"
    )
    .unwrap();
}

/// Words that flip the meaning of a nearby keyword ("no forbearance", "not delinquent").
pub const DEFAULT_NEGATIONS: &[&str] = &[
    "no", "not", "never", "without", "none", "denied", "declined",
];

/// Build a case-insensitive matcher for any of the given literal phrases.
/// Longer phrases are tried first so "late fee" wins over "late".
pub fn phrase_regex(phrases: &[String]) -> Result<Regex, regex::Error> {
    let mut sorted: Vec<&String> = phrases.iter().filter(|p| !p.trim().is_empty()).collect();
    sorted.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = sorted
        .iter()
        .map(|p| regex::escape(p.trim()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i)(?:{alternation})"))
}

/// Whole-word, case-insensitive matcher for negation cues.
pub fn negation_regex(words: &[String]) -> Result<Regex, regex::Error> {
    let alternation = words
        .iter()
        .filter(|w| !w.trim().is_empty())
        .map(|w| regex::escape(w.trim()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)(?:\b(?:{alternation})\b)"))
}

pub fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

pub fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Span widened by `before` bytes to the left and `after` bytes to the right,
/// clamped to the text and snapped outward onto character boundaries.
pub fn widen(text: &str, span: EvidenceSpan, before: usize, after: usize) -> EvidenceSpan {
    let start = floor_char_boundary(text, span.start.saturating_sub(before));
    let end = ceil_char_boundary(text, span.end.saturating_add(after));
    EvidenceSpan::new(start, end)
}

/// Take up to `chars` characters immediately before byte offset `at`.
fn chars_before(text: &str, at: usize, chars: usize) -> usize {
    text[..at]
        .char_indices()
        .rev()
        .take(chars)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(at)
}

/// Take up to `chars` characters immediately after byte offset `at`.
fn chars_after(text: &str, at: usize, chars: usize) -> usize {
    text[at..]
        .char_indices()
        .nth(chars)
        .map(|(i, _)| at + i)
        .unwrap_or(text.len())
}

/// The matched text plus up to `context_chars` characters on either side.
pub fn excerpt_with_context(text: &str, span: EvidenceSpan, context_chars: usize) -> &str {
    let start = chars_before(text, span.start, context_chars);
    let end = chars_after(text, span.end, context_chars);
    &text[start..end]
}

/// Collapse whitespace runs and cap the excerpt at `max_chars` characters,
/// marking truncation with an ellipsis.
pub fn normalize_excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}

/// Dollar amounts on a page with their spans.
pub fn find_amounts(text: &str) -> Vec<(EvidenceSpan, f64)> {
    MONEY_PATTERN
        .find_iter(text)
        .filter_map(|m| {
            let digits: String = m
                .as_str()
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            digits
                .parse::<f64>()
                .ok()
                .map(|value| (EvidenceSpan::new(m.start(), m.end()), value))
        })
        .collect()
}

/// Absolute distance in bytes between two spans (0 when they touch or overlap).
pub fn gap(a: &EvidenceSpan, b: &EvidenceSpan) -> usize {
    if a.end <= b.start {
        b.start - a.end
    } else if b.end <= a.start {
        a.start - b.end
    } else {
        0
    }
}
