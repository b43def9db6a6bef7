//! Person name normalisation.
//!
//! Scraped names arrive as "Rep. John Smith (R-Boise)", "SMITH, John Jr." or
//! "John Q. Smith". [`NameNormalizer::normalize`] reduces them to a lower-case,
//! punctuation-free token string so the similarity scorer compares names and
//! nothing else.
//!
//! # Rules
//!
//! 1. Bracketed annotations `(...)` and `[...]` are dropped.
//! 2. Lower-cased; commas, semicolons, colons, slashes, ampersands, quotes and
//!    underscores become spaces.
//! 3. Every other non-alphanumeric character except `-` is removed, so
//!    "J.R." becomes "jr" and "O'Brien" becomes "obrien".
//! 4. Hyphens inside a token are kept ("smith-jones"); hyphens at token edges
//!    are trimmed.
//! 5. Honorifics are stripped only before the first name token; suffixes only
//!    after it. A lone token is never stripped.
//! 6. Whitespace collapses to single spaces.

use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Titles stripped from the front of a name.
pub const DEFAULT_HONORIFICS: &[&str] = &[
    "rep",
    "representative",
    "sen",
    "senator",
    "assemblyman",
    "assemblywoman",
    "assemblymember",
    "delegate",
    "del",
    "speaker",
    "chairman",
    "chairwoman",
    "chair",
    "vice",
    "hon",
    "honorable",
    "the",
    "mr",
    "mrs",
    "ms",
    "miss",
    "dr",
];

/// Generational and professional suffixes stripped after the first token.
pub const DEFAULT_SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "esq", "md", "phd", "dds"];

/// Phrases marking a campaign committee rather than a person.
pub const FILER_INDICATORS: &[&str] = &[
    "leadership pac",
    "victory fund",
    "friends of",
    "citizens for",
    "for senate",
    "for house",
    "for governor",
    "for congress",
    "committee",
    "campaign",
    "election",
    "party",
    "caucus",
    "pac",
];

/// Leading phrases removed from committee names before indicator stripping.
const FILER_PREFIXES: &[&str] = &[
    "committee to elect",
    "committee for",
    "friends of",
    "citizens for",
    "elect",
];

/// Offices that may trail a committee name as "for <office>".
const OFFICES: &[&str] = &[
    "senate", "house", "governor", "mayor", "congress", "judge", "district",
];

static DEFAULT_NORMALIZER: LazyLock<NameNormalizer> = LazyLock::new(NameNormalizer::default);

/// Normalise with the default honorific and suffix lists.
pub fn normalize_name(raw: &str) -> String {
    DEFAULT_NORMALIZER.normalize(raw)
}

/// Configurable name normaliser. Pure: holds only its word lists.
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    honorifics: BTreeSet<String>,
    suffixes: BTreeSet<String>,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_HONORIFICS, DEFAULT_SUFFIXES)
    }
}

impl NameNormalizer {
    pub fn new<S: AsRef<str>>(honorifics: &[S], suffixes: &[S]) -> Self {
        Self {
            honorifics: honorifics.iter().map(|s| s.as_ref().to_lowercase()).collect(),
            suffixes: suffixes.iter().map(|s| s.as_ref().to_lowercase()).collect(),
        }
    }

    /// Normalise a raw person name.
    pub fn normalize(&self, raw: &str) -> String {
        self.strip_titles(tokenize(raw)).join(" ")
    }

    fn strip_titles(&self, mut tokens: Vec<String>) -> Vec<String> {
        let lead = tokens
            .iter()
            .take_while(|t| self.honorifics.contains(t.as_str()))
            .count()
            .min(tokens.len().saturating_sub(1));
        tokens.drain(..lead);

        let mut out = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.into_iter().enumerate() {
            if i > 0 && self.suffixes.contains(token.as_str()) {
                continue;
            }
            out.push(token);
        }
        out
    }

    /// Extract a candidate's name from a campaign committee name.
    ///
    /// "Committee to Elect John Smith" → `Some("john smith")`,
    /// "Friends of Jane Doe for Senate" → `Some("jane doe")`.
    /// Returns `None` when the text has no committee indicator, or when fewer
    /// than two name tokens survive.
    pub fn extract_filer_name(&self, committee_name: &str) -> Option<String> {
        let mut tokens = tokenize(committee_name);
        if !FILER_INDICATORS
            .iter()
            .any(|ind| find_phrase(&tokens, ind).is_some())
        {
            return None;
        }

        for prefix in FILER_PREFIXES {
            let words: Vec<&str> = prefix.split(' ').collect();
            if tokens.len() > words.len() && tokens.iter().zip(&words).all(|(t, w)| t == w) {
                tokens.drain(..words.len());
                break;
            }
        }

        for indicator in FILER_INDICATORS {
            while let Some((start, len)) = find_phrase(&tokens, indicator) {
                tokens.drain(start..start + len);
            }
        }

        // Trailing "for <office>" or "for district N".
        let n = tokens.len();
        if n >= 3
            && tokens[n - 3] == "for"
            && tokens[n - 2] == "district"
            && tokens[n - 1].chars().all(|c| c.is_ascii_digit())
        {
            tokens.truncate(n - 3);
        } else if n >= 2 && tokens[n - 2] == "for" && OFFICES.contains(&tokens[n - 1].as_str()) {
            tokens.truncate(n - 2);
        }

        let tokens = self.strip_titles(tokens);
        let name = tokens.join(" ");
        if tokens.len() >= 2 && name.len() > 4 && !name.chars().all(|c| c.is_ascii_digit() || c == ' ') {
            Some(name)
        } else {
            None
        }
    }
}

/// Split a raw string into normalised tokens (rules 1-4 and 6).
fn tokenize(raw: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '(' | '[' => {
                depth += 1;
                cleaned.push(' ');
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                cleaned.push(' ');
            }
            _ if depth > 0 => {}
            ',' | ';' | ':' | '/' | '&' | '"' | '_' => cleaned.push(' '),
            c if c.is_whitespace() => cleaned.push(' '),
            c if c.is_alphanumeric() => cleaned.extend(c.to_lowercase()),
            '-' => cleaned.push('-'),
            _ => {}
        }
    }

    cleaned
        .split(' ')
        .map(|t| t.trim_matches('-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Position and length of the first occurrence of a space-separated phrase.
fn find_phrase(tokens: &[String], phrase: &str) -> Option<(usize, usize)> {
    let words: Vec<&str> = phrase.split(' ').collect();
    if words.len() > tokens.len() {
        return None;
    }
    (0..=tokens.len() - words.len())
        .find(|&i| tokens[i..i + words.len()].iter().zip(&words).all(|(t, w)| t == w))
        .map(|i| (i, words.len()))
}
