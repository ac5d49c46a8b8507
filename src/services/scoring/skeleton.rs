//! Line-skeleton encoding of an output's layout.
//!
//! Each line is reduced to a [`LineClass`] and the classes are concatenated
//! into a string of single-character codes, so two outputs with the same
//! layout but different wording encode identically.

use regex::Regex;
use similar::TextDiff;
use std::sync::LazyLock;

static NUMBERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]\s").expect("valid numbered-line regex"));
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9 _/()-]{0,39}:(\s|$)").expect("valid label-line regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineClass {
    Blank,
    Header,
    Bullet,
    Numbered,
    TableRow,
    TableBorder,
    MarkerLine,
    CodeFence,
    Label,
    Text,
}

impl LineClass {
    pub fn code(self) -> char {
        match self {
            Self::Blank => '_',
            Self::Header => 'H',
            Self::Bullet => 'B',
            Self::Numbered => 'N',
            Self::TableRow => 'R',
            Self::TableBorder => 'T',
            Self::MarkerLine => 'M',
            Self::CodeFence => 'F',
            Self::Label => 'L',
            Self::Text => 'x',
        }
    }

    pub fn classify(line: &str) -> Self {
        let t = line.trim();
        if t.is_empty() {
            return Self::Blank;
        }
        if t.starts_with("```") {
            return Self::CodeFence;
        }
        if t.starts_with('#') || (t.len() > 4 && t.starts_with("**") && t.ends_with("**")) {
            return Self::Header;
        }
        if t.starts_with('|') {
            let border = t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '+'));
            return if border { Self::TableBorder } else { Self::TableRow };
        }
        if t.starts_with("- ") || t.starts_with("* ") || t.starts_with("• ") {
            return Self::Bullet;
        }
        if NUMBERED_RE.is_match(t) {
            return Self::Numbered;
        }
        if t.chars()
            .next()
            .is_some_and(|c| !c.is_ascii() && !c.is_alphanumeric())
        {
            return Self::MarkerLine;
        }
        if LABEL_RE.is_match(t) {
            return Self::Label;
        }
        Self::Text
    }
}

/// Encode `text` as a skeleton string. Lines inside code blocks count as text
/// and runs of blank lines collapse to one.
pub fn encode(text: &str) -> String {
    let mut out = String::new();
    let mut in_code = false;
    let mut last = None;
    for line in text.lines() {
        let class = match LineClass::classify(line) {
            LineClass::CodeFence => {
                in_code = !in_code;
                LineClass::CodeFence
            }
            _ if in_code => LineClass::Text,
            other => other,
        };
        if class == LineClass::Blank && last == Some(LineClass::Blank) {
            continue;
        }
        out.push(class.code());
        last = Some(class);
    }
    out.trim_matches(LineClass::Blank.code()).to_string()
}

/// Similarity between two skeleton encodings, in `0.0..=1.0`.
pub trait SequenceSimilarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Diff ratio from the `similar` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffRatio;

impl SequenceSimilarity for DiffRatio {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        f64::from(TextDiff::from_chars(a, b).ratio())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_lines() {
        assert_eq!(LineClass::classify("## Weather"), LineClass::Header);
        assert_eq!(LineClass::classify("**Markets**"), LineClass::Header);
        assert_eq!(LineClass::classify("- item"), LineClass::Bullet);
        assert_eq!(LineClass::classify("2. second"), LineClass::Numbered);
        assert_eq!(LineClass::classify("| a | b |"), LineClass::TableRow);
        assert_eq!(LineClass::classify("|---|:--:|"), LineClass::TableBorder);
        assert_eq!(LineClass::classify("🌤 Sunny"), LineClass::MarkerLine);
        assert_eq!(LineClass::classify("High: 21C"), LineClass::Label);
        assert_eq!(LineClass::classify("Just a sentence."), LineClass::Text);
        assert_eq!(LineClass::classify("   "), LineClass::Blank);
    }

    #[test]
    fn test_same_layout_encodes_identically() {
        let a = "# Daily\n\n- one\n- two\n\n\nTemp: 20";
        let b = "# Nightly\n\n- uno\n- dos\n\nWind: 5";
        assert_eq!(encode(a), encode(b));
        assert_eq!(encode(a), "H_BB_L");
    }

    #[test]
    fn test_code_block_contents_are_text() {
        assert_eq!(encode("```\n# not a header\n```"), "FxF");
    }

    #[test]
    fn test_diff_ratio_bounds() {
        let metric = DiffRatio;
        assert!((metric.similarity("HBB", "HBB") - 1.0).abs() < 1e-9);
        assert!((metric.similarity("", "") - 1.0).abs() < 1e-9);
        assert!(metric.similarity("HBB", "RRRR") < 0.5);
    }
}
