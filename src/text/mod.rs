//! Language detection and tokenization shared by the keyword extractor
//! (§4.D) and the cross-source similarity check (§4.E).

pub mod similarity;
pub mod tokenizer;

/// Coarse language family. Only the CJK/Latin distinction matters for
/// tokenization and minimum-token-length rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Cjk,
    Latin,
}

/// A small embedded CJK stopword set (particles, copulas, common function
/// words in Chinese news text).
const CJK_STOPWORDS: &[&str] = &[
    "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一",
    "一个", "上", "也", "很", "到", "说", "要", "去", "你", "会", "着",
    "没有", "看", "好", "自己", "这", "那", "他", "她", "它", "与", "及",
    "对", "为", "被", "把", "从", "但", "而", "或", "等", "将",
];

/// Standard-ish English stopword fallback, embedded since no external
/// stopword package is pulled in for this.
const EN_STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "else", "for", "to",
    "of", "in", "on", "at", "by", "with", "from", "as", "is", "are", "was",
    "were", "be", "been", "being", "this", "that", "these", "those", "it",
    "its", "he", "she", "they", "them", "his", "her", "their", "we", "you",
    "i", "not", "no", "do", "does", "did", "has", "have", "had", "will",
    "would", "can", "could", "should", "may", "might", "about", "into",
    "over", "after", "before", "than", "so", "up", "out", "what", "which",
    "who", "when", "where", "how",
];

/// A character counts as CJK if it falls in the common CJK Unified
/// Ideographs block (the large majority of Chinese/Japanese Kanji text).
pub fn is_cjk_char(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF | 0x20000..=0x2A6DF)
}

/// Detect the dominant language family: CJK if at least 30% of characters
/// are CJK ideographs, Latin otherwise.
pub fn detect_language(text: &str) -> Language {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return Language::Latin;
    }
    let cjk = text.chars().filter(|c| is_cjk_char(*c)).count();
    if (cjk as f64) / (total as f64) >= 0.30 {
        Language::Cjk
    } else {
        Language::Latin
    }
}

/// Returns true if `word` is a stopword for `lang` (case-insensitive for
/// Latin).
pub fn is_stopword(word: &str, lang: Language) -> bool {
    match lang {
        Language::Cjk => CJK_STOPWORDS.contains(&word),
        Language::Latin => {
            let lower = word.to_lowercase();
            EN_STOPWORDS.contains(&lower.as_str())
        }
    }
}

/// Minimum token length to keep, per §4.D step 1: CJK tokens shorter than 2
/// characters and Latin tokens shorter than 3 characters are dropped.
pub fn min_token_len(lang: Language) -> usize {
    match lang {
        Language::Cjk => 2,
        Language::Latin => 3,
    }
}

/// Find a title's colon-prefixed topic, per §4.D step 3: take the prefix
/// before the first fullwidth (`：`) or ASCII (`:`) colon, if its length
/// (in chars) falls in `[4, 20]`.
pub fn extract_topic_prefix(title: &str) -> Option<String> {
    let idx = title.find(['：', ':'])?;
    let prefix = &title[..idx];
    let len = prefix.chars().count();
    if (4..=20).contains(&len) {
        Some(prefix.to_string())
    } else {
        None
    }
}
