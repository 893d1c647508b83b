//! Jaccard similarity over tokenized, stopword-filtered title sets (§4.E).
//!
//! Grounded on `engine/scanner.rs`'s `text_similarity`, stripped down to the
//! pure Jaccard half — that function additionally blends in a containment
//! bonus for fuzzy cross-platform market matching, which near-duplicate
//! news titles don't call for.

use super::{detect_language, is_stopword, Language};
use std::collections::HashSet;

/// Near-duplicate threshold from the glossary: similarity strictly greater
/// than this counts as the same underlying story.
pub const NEAR_DUPLICATE_THRESHOLD: f64 = 0.6;

/// Tokenize a title into a stopword-filtered set suitable for Jaccard
/// comparison. CJK text is split into individual ideographs (a lightweight
/// stand-in for word segmentation); Latin text is split on non-alphanumeric
/// boundaries and lowercased.
fn token_set(text: &str) -> HashSet<String> {
    let lang = detect_language(text);
    match lang {
        Language::Cjk => text
            .chars()
            .filter(|c| super::is_cjk_char(*c) || c.is_ascii_alphanumeric())
            .map(|c| c.to_string())
            .filter(|s| !is_stopword(s, Language::Cjk))
            .collect(),
        Language::Latin => text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .filter(|w| !is_stopword(w, Language::Latin))
            .map(String::from)
            .collect(),
    }
}

/// Jaccard similarity between two titles: `|A∩B| / |A∪B|`, or `0.0` when
/// the union is empty (both titles tokenize to nothing).
pub fn jaccard(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    intersection as f64 / union as f64
}

/// Two titles are near-duplicates iff their Jaccard similarity exceeds
/// [`NEAR_DUPLICATE_THRESHOLD`].
pub fn is_near_duplicate(a: &str, b: &str) -> bool {
    jaccard(a, b) > NEAR_DUPLICATE_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jaccard_identical() {
        assert_eq!(jaccard("breaking news today", "breaking news today"), 1.0);
    }

    #[test]
    fn test_jaccard_symmetric() {
        let a = "stock market rallies on earnings";
        let b = "earnings rally lifts stock market";
        assert_eq!(jaccard(a, b), jaccard(b, a));
    }

    #[test]
    fn test_jaccard_empty_union() {
        assert_eq!(jaccard("", ""), 0.0);
    }

    #[test]
    fn test_jaccard_one_empty() {
        assert_eq!(jaccard("breaking news today", ""), 0.0);
    }

    #[test]
    fn test_jaccard_disjoint() {
        assert_eq!(jaccard("apples and oranges", "quarterly tax filings"), 0.0);
    }

    #[test]
    fn test_near_duplicate_true_for_identical_titles() {
        assert!(is_near_duplicate(
            "测试热点：一则示例新闻",
            "测试热点：一则示例新闻"
        ));
    }

    #[test]
    fn test_near_duplicate_false_for_unrelated() {
        assert!(!is_near_duplicate(
            "local weather turns cold this weekend",
            "central bank raises interest rates again"
        ));
    }

    #[test]
    fn test_near_duplicate_threshold_boundary() {
        // Equal scores for equal inputs regardless of argument order.
        let a = "economy grows amid inflation fears";
        let b = "inflation fears amid economy growth";
        assert_eq!(is_near_duplicate(a, b), is_near_duplicate(b, a));
    }
}
