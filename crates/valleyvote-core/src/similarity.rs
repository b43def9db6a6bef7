//! Token-order-insensitive string similarity on a 0-100 scale.
//!
//! All scorers expect already-normalised input (see [`crate::names`]) and are
//! pure. [`weighted_ratio`] is the scorer the resolver uses: it takes the best
//! of a plain edit-distance ratio and token-based variants, discounting the
//! token variants slightly so an exact character match always wins.

use std::collections::BTreeSet;

/// Discount applied to token-sort and token-set scores.
const TOKEN_SCALE: f64 = 0.95;
/// Length ratio above which partial (substring) matching is considered.
const PARTIAL_LENGTH_RATIO: f64 = 1.5;
/// Length ratio above which partial scores are discounted heavily.
const LONG_PARTIAL_LENGTH_RATIO: f64 = 8.0;

/// Edit-distance similarity of two strings. Empty input scores 0.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    round2(strsim::normalized_levenshtein(a, b) * 100.0)
}

/// Best [`ratio`] of the shorter string against any equal-length window of
/// the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if short.is_empty() {
        return 0.0;
    }
    let long_chars: Vec<char> = long.chars().collect();
    let width = short.chars().count();
    if width == long_chars.len() {
        return ratio(short, long);
    }

    let mut best = 0.0f64;
    for start in 0..=long_chars.len() - width {
        let window: String = long_chars[start..start + width].iter().collect();
        best = best.max(ratio(short, &window));
        if best >= 100.0 {
            break;
        }
    }
    best
}

/// [`ratio`] after sorting each string's tokens: "smith john" == "john smith".
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Compare the shared tokens against each side's remainder.
///
/// A string whose tokens are a subset of the other's scores 100, so
/// "smith" against "john smith" is a full match before weighting.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let common = join(ta.intersection(&tb).copied());
    let only_a = join(ta.difference(&tb).copied());
    let only_b = join(tb.difference(&ta).copied());

    let with_a = join_nonempty(&common, &only_a);
    let with_b = join_nonempty(&common, &only_b);

    ratio(&common, &with_a)
        .max(ratio(&common, &with_b))
        .max(ratio(&with_a, &with_b))
}

/// Weighted maximum of the scorers above, in `[0, 100]`.
pub fn weighted_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let base = ratio(a, b);
    let (la, lb) = (a.chars().count() as f64, b.chars().count() as f64);
    let length_ratio = la.max(lb) / la.min(lb);

    let score = if length_ratio < PARTIAL_LENGTH_RATIO {
        base.max(token_sort_ratio(a, b) * TOKEN_SCALE)
            .max(token_set_ratio(a, b) * TOKEN_SCALE)
    } else {
        let partial_scale = if length_ratio < LONG_PARTIAL_LENGTH_RATIO {
            0.9
        } else {
            0.6
        };
        let partial_sort = partial_ratio(&sorted_tokens(a), &sorted_tokens(b));
        base.max(partial_ratio(a, b) * partial_scale)
            .max(partial_sort * TOKEN_SCALE * partial_scale)
            .max(token_set_ratio(a, b) * TOKEN_SCALE * partial_scale)
    };
    round2(score.clamp(0.0, 100.0))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join<'a>(tokens: impl Iterator<Item = &'a str>) -> String {
    tokens.collect::<Vec<_>>().join(" ")
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a} {b}"),
    }
}

/// Round to two decimals so float noise never separates equal scores.
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(ratio("john smith", "john smith"), 100.0);
        assert_eq!(weighted_ratio("john smith", "john smith"), 100.0);
    }

    #[test]
    fn empty_scores_zero() {
        assert_eq!(ratio("", "john"), 0.0);
        assert_eq!(weighted_ratio("john", ""), 0.0);
        assert_eq!(token_set_ratio("", ""), 0.0);
        assert_eq!(partial_ratio("", "john"), 0.0);
    }

    #[test]
    fn single_edit_ratio() {
        // One insertion over ten characters.
        assert_eq!(ratio("jon smith", "john smith"), 90.0);
    }

    #[test]
    fn word_order_ignored() {
        assert_eq!(token_sort_ratio("smith john", "john smith"), 100.0);
        assert_eq!(weighted_ratio("smith john", "john smith"), 95.0);
    }

    #[test]
    fn subset_tokens_match_fully() {
        assert_eq!(token_set_ratio("smith", "john smith"), 100.0);
        assert_eq!(token_set_ratio("jane m doe", "jane doe"), 100.0);
    }

    #[test]
    fn partial_finds_substring() {
        assert_eq!(partial_ratio("smith", "john smith"), 100.0);
        assert!(partial_ratio("smyth", "john smith") < 100.0);
    }

    #[test]
    fn symmetric() {
        let pairs = [("jon smith", "john smythe"), ("a b c", "c a"), ("mary", "maria lopez")];
        for (a, b) in pairs {
            assert_eq!(weighted_ratio(a, b), weighted_ratio(b, a), "{a} / {b}");
        }
    }

    #[test]
    fn closer_name_scores_higher() {
        let exactish = weighted_ratio("jon smith", "john smith");
        let other = weighted_ratio("jon smith", "jon smythe");
        assert!(exactish > other, "{exactish} <= {other}");
        assert!(exactish >= 85.0);
    }

    #[test]
    fn scores_bounded() {
        for (a, b) in [("x", "yyyyyyyyyyyyyyyyyy"), ("abc", "abd"), ("q", "q")] {
            let s = weighted_ratio(a, b);
            assert!((0.0..=100.0).contains(&s));
        }
    }
}
