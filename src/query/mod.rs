//! Query normalization and exact-phrase extraction
//!
//! Turns free text into the canonical token stream every other ranking stage
//! works with. Catalog tags go through the same canonicalization (without
//! stopword removal) so that "CI/CD" in a spreadsheet cell and "cicd" in a
//! query compare equal.

use regex::Regex;
use std::sync::OnceLock;

/// Words that carry no search intent in a directory query
pub const STOPWORDS: &[&str] = &[
    "i", "me", "my", "we", "our", "need", "want", "a", "an", "the", "team", "for", "to", "please",
    "looking", "search", "find", "build", "hire",
];

/// Known spellings of compound terms, rewritten before tokenization
const COMPOUND_TERMS: &[(&str, &str)] = &[
    (r"\bci\s*/\s*cd\b", "ci cd"),
    (r"\bci-cd\b", "ci cd"),
    (r"\bcicd\b", "ci cd"),
    (r"\bui\s*/\s*ux\b", "ui ux"),
    (r"\bux\s*/\s*ui\b", "ui ux"),
    (r"\be-commerce\b", "ecommerce"),
];

fn compound_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        COMPOUND_TERMS
            .iter()
            .filter_map(|(pattern, replacement)| {
                Regex::new(pattern).ok().map(|re| (re, *replacement))
            })
            .collect()
    })
}

fn quoted_pattern() -> Option<&'static Regex> {
    static QUOTED: OnceLock<Option<Regex>> = OnceLock::new();
    QUOTED
        .get_or_init(|| Regex::new(r#""([^"]+)""#).ok())
        .as_ref()
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercase, rewrite compound terms and turn hyphens/underscores into spaces
fn canonicalize(text: &str) -> String {
    let mut out = text.to_lowercase();
    for (re, replacement) in compound_patterns() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *replacement).into_owned();
        }
    }
    out.replace(['-', '_'], " ")
}

/// Split canonicalized text into alphanumeric runs
fn split_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokenize text with the query canonicalization, keeping stopwords
pub fn tokenize(text: &str) -> Vec<String> {
    split_tokens(&canonicalize(text))
}

/// Canonical form of a catalog phrase (a single CSV tag, a display name)
pub fn canonical_phrase(text: &str) -> String {
    tokenize(text).join(" ")
}

/// Normalize a raw query into canonical, stopword-free tokens.
///
/// Falls back to the unfiltered token string when every token is a stopword,
/// then to the trimmed raw input, so non-empty input never yields an empty
/// string. The result is a fixed point: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let tokens = tokenize(raw);

    let filtered: Vec<&str> = tokens
        .iter()
        .map(String::as_str)
        .filter(|t| !is_stopword(t))
        .collect();

    if !filtered.is_empty() {
        return filtered.join(" ");
    }

    let unfiltered = tokens.join(" ");
    if !unfiltered.is_empty() {
        return unfiltered;
    }

    raw.trim().to_string()
}

/// Extract multi-word phrases used as exact-match ranking signals.
///
/// Every contiguous bigram and trigram of the stopword-free tokens, plus any
/// quoted substring. Single words are dropped.
pub fn extract_exact_phrases(raw: &str) -> Vec<String> {
    let tokens: Vec<String> = tokenize(raw)
        .into_iter()
        .filter(|t| !is_stopword(t))
        .collect();

    let mut phrases: Vec<String> = Vec::new();
    let mut push = |phrase: String| {
        if phrase.contains(' ') && !phrases.contains(&phrase) {
            phrases.push(phrase);
        }
    };

    for size in [2usize, 3] {
        for window in tokens.windows(size) {
            push(window.join(" "));
        }
    }

    if let Some(re) = quoted_pattern() {
        for capture in re.captures_iter(raw) {
            if let Some(quoted) = capture.get(1) {
                push(canonical_phrase(quoted.as_str()));
            }
        }
    }

    phrases
}

/// First letters of each word, when the result is 2-5 characters long
pub fn acronym(words: &[&str]) -> Option<String> {
    if words.len() < 2 {
        return None;
    }
    let letters: String = words.iter().filter_map(|w| w.chars().next()).collect();
    (2..=5).contains(&letters.chars().count()).then_some(letters)
}

/// Acronym of an already-canonical phrase
pub fn phrase_acronym(phrase: &str) -> Option<String> {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    acronym(&words)
}

/// Whole-word containment of `needle` inside `haystack` (both canonical)
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    format!(" {} ", haystack).contains(&format!(" {} ", needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drops_stopwords() {
        assert_eq!(normalize("I need a SEO team please"), "seo");
        assert_eq!(normalize("Looking for content_marketing experts"), "content marketing experts");
    }

    #[test]
    fn test_normalize_compound_terms() {
        assert_eq!(normalize("CI/CD pipeline"), "ci cd pipeline");
        assert_eq!(normalize("cicd"), "ci cd");
        assert_eq!(normalize("ci-cd help"), "ci cd help");
        assert_eq!(normalize("UI/UX designers"), "ui ux designers");
    }

    #[test]
    fn test_normalize_all_stopwords_falls_back() {
        assert_eq!(normalize("i need a team"), "i need a team");
        assert_eq!(normalize("  I   NEED a Team "), "i need a team");
    }

    #[test]
    fn test_normalize_punctuation_only_returns_trimmed_raw() {
        assert_eq!(normalize("  ?!  "), "?!");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        let inputs = [
            "I need a SEO team",
            "i need a team",
            "CI/CD + DevOps",
            "ci, the cd",
            "  ?!  ",
            "Growth-hacking for e-commerce",
            "\"public relations\" agency",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
            if !input.trim().is_empty() {
                assert!(!once.is_empty());
            }
        }
    }

    #[test]
    fn test_extract_phrases_ngrams() {
        let phrases = extract_exact_phrases("find a content marketing agency");
        assert_eq!(
            phrases,
            vec![
                "content marketing",
                "marketing agency",
                "content marketing agency"
            ]
        );
    }

    #[test]
    fn test_extract_phrases_quoted() {
        let phrases = extract_exact_phrases("\"Public Relations\" team");
        assert!(phrases.contains(&"public relations".to_string()));

        // Single quoted word is not a phrase
        assert!(extract_exact_phrases("\"seo\"").is_empty());
    }

    #[test]
    fn test_acronym_bounds() {
        assert_eq!(phrase_acronym("search engine optimization").as_deref(), Some("seo"));
        assert_eq!(phrase_acronym("seo"), None);
        assert_eq!(phrase_acronym("a b c d e f"), None);
    }

    #[test]
    fn test_contains_phrase_word_boundaries() {
        assert!(contains_phrase("ci cd pipeline", "ci cd"));
        assert!(!contains_phrase("seoul office", "seo"));
    }
}
