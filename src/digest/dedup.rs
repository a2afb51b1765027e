//! Fuzzy deduplication of repeated paragraphs and sentences.

use std::collections::HashSet;

/// Words that count toward overlap must be longer than this.
const SIGNIFICANT_WORD_MIN_CHARS: usize = 3;

/// Sentence-level dedup only runs on paragraphs with at least this many
/// sentences.
const SENTENCE_DEDUP_MIN_SENTENCES: usize = 3;

/// Case-folded words longer than three characters.
pub fn significant_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > SIGNIFICANT_WORD_MIN_CHARS)
        .map(str::to_lowercase)
        .collect()
}

/// Shared significant words over the smaller set's size, in [0, 1].
pub fn word_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / smaller as f64
}

/// Splits on blank lines, dropping empty paragraphs.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut paragraphs = Vec::new();
    let mut start = None;
    let mut last_end = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                paragraphs.push(text[s..last_end].trim());
            }
        } else {
            start.get_or_insert(line_start);
            last_end = offset;
        }
    }
    if let Some(s) = start {
        paragraphs.push(text[s..last_end].trim());
    }
    paragraphs
}

/// Splits after `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = paragraph[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
    }
    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Keeps items whose overlap with every kept item is at most `threshold`.
fn dedup_by_overlap<'a>(items: &[&'a str], threshold: f64) -> Vec<&'a str> {
    let mut kept: Vec<(&str, HashSet<String>)> = Vec::with_capacity(items.len());
    for item in items {
        let words = significant_words(item);
        let duplicate = kept
            .iter()
            .any(|(_, prior)| word_overlap(&words, prior) > threshold);
        if duplicate {
            tracing::debug!(dropped = %truncate(item, 60), "dropping near-duplicate text");
        } else {
            kept.push((item, words));
        }
    }
    kept.into_iter().map(|(item, _)| item).collect()
}

/// Paragraph-level then sentence-level dedup; paragraphs rejoin with a
/// blank line.
pub fn deduplicate(text: &str, threshold: f64) -> String {
    let paragraphs = split_paragraphs(text);
    dedup_by_overlap(&paragraphs, threshold)
        .into_iter()
        .map(|paragraph| {
            let sentences = split_sentences(paragraph);
            if sentences.len() < SENTENCE_DEDUP_MIN_SENTENCES {
                return paragraph.to_string();
            }
            let kept = dedup_by_overlap(&sentences, threshold);
            if kept.len() == sentences.len() {
                paragraph.to_string()
            } else {
                kept.join(" ")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// First `max` paragraphs.
pub fn cap_paragraphs(text: &str, max: usize) -> String {
    split_paragraphs(text)
        .into_iter()
        .take(max)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_significant_words() {
        let words = significant_words("The new AI chip, faster than ever!");
        let mut sorted: Vec<_> = words.into_iter().collect();
        sorted.sort();
        assert_eq!(sorted, vec!["chip", "ever", "faster", "than"]);
    }

    #[test]
    fn test_overlap_boundary_is_exclusive() {
        // 2 of 4 shared: exactly 0.5, kept.
        let text = "alpha bravo charlie delta\n\nalpha bravo echoes foxtrot";
        assert_eq!(deduplicate(text, 0.5), text);

        // 3 of 4 shared: 0.75, collapsed.
        let text = "alpha bravo charlie delta\n\nalpha bravo charlie foxtrot";
        assert_eq!(deduplicate(text, 0.5), "alpha bravo charlie delta");
    }

    #[test]
    fn test_sentence_level_dedup() {
        let paragraph = "Chipmaker shares surged after earnings. \
                         Analysts praised the quarterly results. \
                         Chipmaker shares surged following earnings.";
        assert_eq!(
            deduplicate(paragraph, 0.5),
            "Chipmaker shares surged after earnings. Analysts praised the quarterly results."
        );
    }

    #[test]
    fn test_two_sentence_paragraph_untouched() {
        let paragraph = "Chipmaker shares surged after earnings. Chipmaker shares surged again.";
        assert_eq!(deduplicate(paragraph, 0.5), paragraph);
    }

    #[test]
    fn test_split_paragraphs_ignores_whitespace_lines() {
        let text = "\n first \n line two\n  \n\n second\n";
        assert_eq!(split_paragraphs(text), vec!["first \n line two", "second"]);
    }

    #[test]
    fn test_split_sentences_keeps_decimals() {
        assert_eq!(
            split_sentences("Rates rose 0.25 points. Markets fell! Why?"),
            vec!["Rates rose 0.25 points.", "Markets fell!", "Why?"]
        );
    }

    #[test]
    fn test_cap_paragraphs() {
        assert_eq!(cap_paragraphs("a\n\nb\n\nc\n\nd", 3), "a\n\nb\n\nc");
        assert_eq!(cap_paragraphs("a", 3), "a");
    }
}
