//! Text heuristics shared by the chapter detectors: heading recognition,
//! title cleanup, and title similarity.

use std::collections::HashSet;

use regex::Regex;

/// Sentence-terminal punctuation, Latin and CJK.
const TERMINAL_PUNCTUATION: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Connective words that mark running prose rather than a heading.
const CONNECTIVE_WORDS: [&str; 5] = ["the", "and", "or", "but", "because"];

/// Leading/trailing glyphs stripped from titles.
const BULLET_GLYPHS: [char; 5] = ['•', '·', '-', '—', '–'];

/// Recognizes text that reads like a chapter or section heading.
pub struct HeadingFilter {
    chapter_patterns: Vec<Regex>,
    numbering: Regex,
}

impl HeadingFilter {
    pub fn new() -> Self {
        let patterns = [
            r"(?i)^(Chapter|章|第\s*\d+章|Part|部分|Section|节)\s*\d+",
            r"^\d+\.\s+",
            r"(?i)^[IVXLCDM]+\.\s+",
            r"(?i)^[A-Z]\.\s+",
        ];
        Self {
            chapter_patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
            numbering: Regex::new(r"(?i)^(Chapter|第|章|Part|部分|Section|节)\s*\d+").unwrap(),
        }
    }

    /// Whether the text looks like a heading: an explicit numbering
    /// pattern, or short text without terminal punctuation or common
    /// connective words.
    pub fn is_likely_heading(&self, text: &str) -> bool {
        let text = text.trim();

        if self.chapter_patterns.iter().any(|p| p.is_match(text)) {
            return true;
        }

        let lower = text.to_lowercase();
        text.chars().count() < 100
            && !matches!(text.chars().last(), Some(c) if TERMINAL_PUNCTUATION.contains(&c))
            && !CONNECTIVE_WORDS.iter().any(|w| lower.contains(w))
    }

    /// Whether the text opens with a chapter/section numbering marker.
    /// Used to boost outline-entry confidence.
    pub fn matches_numbering(&self, text: &str) -> bool {
        self.numbering.is_match(text.trim())
    }
}

impl Default for HeadingFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes detected chapter titles.
pub struct TitleCleaner {
    page_prefix: Regex,
    whitespace: Regex,
}

impl TitleCleaner {
    pub fn new() -> Self {
        Self {
            page_prefix: Regex::new(r"(?i)^Page\s*\d+\s*[:\-]?\s*").unwrap(),
            whitespace: Regex::new(r"\s+").unwrap(),
        }
    }

    /// Strip "Page N:" echoes and bullet glyphs, collapse whitespace,
    /// capitalize the first letter.
    pub fn clean(&self, title: &str) -> String {
        let title = title.trim();
        let title = self.page_prefix.replace(title, "");
        let title = self.whitespace.replace_all(&title, " ");
        let title = title
            .trim_matches(|c: char| BULLET_GLYPHS.contains(&c))
            .trim();

        let mut chars = title.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

impl Default for TitleCleaner {
    fn default() -> Self {
        Self::new()
    }
}

/// Word-overlap title similarity: exact match, or Jaccard index of the
/// whitespace-split word sets at or above `threshold`.
pub fn titles_similar(a: &str, b: &str, threshold: f64) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let a = a.trim();
    let b = b.trim();

    if a == b {
        return true;
    }

    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return false;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64 >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_chapter_headings() {
        let filter = HeadingFilter::new();
        assert!(filter.is_likely_heading("Chapter 1"));
        assert!(filter.is_likely_heading("chapter 12: The Journey"));
        assert!(filter.is_likely_heading("第1章"));
        assert!(filter.is_likely_heading("Section 3"));
        assert!(filter.is_likely_heading("1. Introduction"));
        assert!(filter.is_likely_heading("IV. Results"));
        assert!(filter.is_likely_heading("A. Background"));
    }

    #[test]
    fn test_short_text_without_connectives_is_heading() {
        let filter = HeadingFilter::new();
        assert!(filter.is_likely_heading("Introduction"));
        assert!(filter.is_likely_heading("Getting Started"));
    }

    #[test]
    fn test_prose_rejected() {
        let filter = HeadingFilter::new();
        assert!(!filter.is_likely_heading("This sentence ends with a period."));
        assert!(!filter.is_likely_heading("Setup and configuration"));
        assert!(!filter.is_likely_heading("这是一个完整的句子。"));
    }

    #[test]
    fn test_numbering_boost_patterns() {
        let filter = HeadingFilter::new();
        assert!(filter.matches_numbering("Chapter 5"));
        assert!(filter.matches_numbering("第 3"));
        assert!(!filter.matches_numbering("Introduction"));
    }

    #[test]
    fn test_clean_strips_page_echo() {
        let cleaner = TitleCleaner::new();
        assert_eq!(cleaner.clean("Page 12: getting started"), "Getting started");
        assert_eq!(cleaner.clean("page 3 - intro"), "Intro");
    }

    #[test]
    fn test_clean_collapses_whitespace_and_bullets() {
        let cleaner = TitleCleaner::new();
        assert_eq!(cleaner.clean("• the   long    road"), "The long road");
        assert_eq!(cleaner.clean("— epilogue —"), "Epilogue");
    }

    #[test]
    fn test_clean_empty() {
        let cleaner = TitleCleaner::new();
        assert_eq!(cleaner.clean("   "), "");
    }

    #[test]
    fn test_titles_similar_exact_and_case() {
        assert!(titles_similar("Chapter One", "chapter one", 0.8));
    }

    #[test]
    fn test_titles_similar_word_overlap() {
        // 4 shared words of 5 total = 0.8
        assert!(titles_similar(
            "the quick brown fox",
            "the quick brown dog fox",
            0.8
        ));
        assert!(!titles_similar("alpha beta", "gamma delta", 0.8));
    }

    #[test]
    fn test_titles_similar_empty() {
        assert!(titles_similar("", "", 0.8));
        assert!(!titles_similar("words", "", 0.8));
    }
}
