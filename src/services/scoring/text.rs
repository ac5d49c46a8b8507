//! Small text helpers shared by the scorers.

use std::collections::BTreeSet;

/// Lowercased alphanumeric tokens.
pub fn token_set(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Collapse every whitespace run to a single space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Last `n` characters of `text`.
pub fn tail_chars(text: &str, n: usize) -> &str {
    let len = char_len(text);
    if n >= len {
        return text;
    }
    let start = text
        .char_indices()
        .nth(len - n)
        .map_or(text.len(), |(i, _)| i);
    &text[start..]
}

/// Non-overlapping occurrences of `needle`.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        0
    } else {
        haystack.matches(needle).count()
    }
}

/// Length of the longest common subsequence of two sequences.
pub fn lcs_len<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for x in a {
        let mut diag = 0;
        for (j, y) in b.iter().enumerate() {
            let up = row[j + 1];
            row[j + 1] = if x == y { diag + 1 } else { up.max(row[j]) };
            diag = up;
        }
    }
    row[b.len()]
}

/// Lines that open or close a fenced code block.
pub fn fence_count(text: &str) -> usize {
    text.lines()
        .filter(|l| l.trim_start().starts_with("```"))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_set_lowercases_and_splits() {
        let tokens = token_set("Hi there, HI! 42x");
        assert_eq!(
            tokens.into_iter().collect::<Vec<_>>(),
            vec!["42x".to_string(), "hi".to_string(), "there".to_string()]
        );
    }

    #[test]
    fn test_tail_chars_is_char_aware() {
        assert_eq!(tail_chars("héllo wörld", 5), "wörld");
        assert_eq!(tail_chars("ab", 5), "ab");
    }

    #[test]
    fn test_lcs_len() {
        assert_eq!(lcs_len(&["a", "b", "c"], &["a", "c", "b"]), 2);
        assert_eq!(lcs_len::<&str>(&[], &["a"]), 0);
        assert_eq!(lcs_len(&[1, 2, 3], &[1, 2, 3]), 3);
    }
}
