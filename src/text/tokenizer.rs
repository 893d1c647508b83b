//! Keyword / phrase / topic extraction, §4.D.
//!
//! No segmenter or POS-tagger crate exists anywhere in the corpus this crate
//! was grown from, so CJK "words" are approximated as adjacent-character
//! bigrams (the standard dependency-free trick for lightweight Chinese text
//! processing) and all non-stopword tokens are treated as content words —
//! see `DESIGN.md` for this as a resolved open question.

use super::{detect_language, extract_topic_prefix, is_cjk_char, is_stopword, min_token_len, Language};
use crate::types::{Keyword, KeywordType};
use std::collections::HashMap;

/// Number of top-ranked single-token keywords to keep for the CJK path.
const CJK_TOP_K: usize = 10;
/// PageRank-style damping factor for the co-occurrence ranking graph.
const DAMPING: f64 = 0.85;
const RANK_ITERATIONS: usize = 20;
/// Co-occurrence window (tokens within this distance are linked).
const COOCCURRENCE_WINDOW: usize = 4;

/// Extract keywords/phrases/topics from a title (weighted by triplication)
/// and an optional body, per §4.D.
pub fn extract_keywords(title: &str, body: Option<&str>) -> Vec<Keyword> {
    let body = body.unwrap_or("");
    let weighted_text = format!("{title} {title} {title} {body}");
    let lang = detect_language(&format!("{title} {body}"));

    let mut keywords = match lang {
        Language::Cjk => extract_cjk(&weighted_text, title),
        Language::Latin => extract_latin(&weighted_text),
    };

    if let Some(topic) = extract_topic_prefix(title) {
        keywords.push(Keyword {
            word: topic,
            weight: 1.0,
            kind: KeywordType::Topic,
        });
    }

    keywords
}

// ---------------------------------------------------------------------------
// CJK path
// ---------------------------------------------------------------------------

fn extract_cjk(weighted_text: &str, title: &str) -> Vec<Keyword> {
    let tokens = cjk_bigram_tokens(weighted_text);
    let filtered: Vec<&String> = tokens
        .iter()
        .filter(|t| t.chars().count() >= min_token_len(Language::Cjk))
        .filter(|t| !is_stopword(t, Language::Cjk))
        .collect();

    if filtered.is_empty() {
        return Vec::new();
    }

    let scores = rank_tokens(&filtered);
    let max_score = scores.values().cloned().fold(0.0_f64, f64::max).max(1e-9);

    let mut ranked: Vec<(&String, f64)> = scores
        .iter()
        .map(|(k, v)| (*k, v / max_score))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(CJK_TOP_K);

    let weight_by_word: HashMap<String, f64> = ranked
        .iter()
        .map(|(w, s)| ((*w).clone(), *s))
        .collect();

    let mut keywords: Vec<Keyword> = ranked
        .into_iter()
        .map(|(word, weight)| Keyword {
            word: word.clone(),
            weight,
            kind: KeywordType::Keyword,
        })
        .collect();

    keywords.extend(build_cjk_phrases(title, &weight_by_word));
    keywords
}

/// Adjacent-character bigrams within each CJK run, plus alphanumeric runs
/// kept whole (titles often mix CJK with Latin brand names or numbers).
fn cjk_bigram_tokens(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if is_cjk_char(chars[i]) {
            let start = i;
            while i < chars.len() && is_cjk_char(chars[i]) {
                i += 1;
            }
            let run = &chars[start..i];
            for w in run.windows(2) {
                tokens.push(w.iter().collect::<String>());
            }
        } else if chars[i].is_alphanumeric() {
            let start = i;
            while i < chars.len() && chars[i].is_alphanumeric() {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if word.chars().count() >= 2 {
                tokens.push(word);
            }
        } else {
            i += 1;
        }
    }
    tokens
}

/// Non-overlapping 2-character chunks per CJK run, grouped by run, used as
/// the building blocks for title phrases (overlapping bigram tokens would
/// produce nonsensical concatenations).
fn cjk_title_chunk_runs(title: &str) -> Vec<Vec<String>> {
    let chars: Vec<char> = title.chars().collect();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if is_cjk_char(chars[i]) {
            let start = i;
            while i < chars.len() && is_cjk_char(chars[i]) {
                i += 1;
            }
            let run = &chars[start..i];
            let mut chunks = Vec::new();
            let mut j = 0;
            while j + 1 < run.len() {
                chunks.push(run[j..j + 2].iter().collect::<String>());
                j += 2;
            }
            if chunks.len() >= 2 {
                runs.push(chunks);
            }
        } else {
            i += 1;
        }
    }
    runs
}

/// Bigram phrases from adjacent title chunks, kept when 4-8 characters
/// long. Phrase weight is the sum of matching ranked-keyword weights,
/// defaulting to 0.5 when none of the phrase's chunks made the keyword cut.
fn build_cjk_phrases(title: &str, weight_by_word: &HashMap<String, f64>) -> Vec<Keyword> {
    let mut phrases = Vec::new();
    for run in cjk_title_chunk_runs(title) {
        for window_len in 2..=4usize {
            if window_len > run.len() {
                break;
            }
            for start in 0..=(run.len() - window_len) {
                let phrase: String = run[start..start + window_len].concat();
                let len = phrase.chars().count();
                if !(4..=8).contains(&len) {
                    continue;
                }
                let matched: f64 = run[start..start + window_len]
                    .iter()
                    .filter_map(|chunk| weight_by_word.get(chunk))
                    .sum();
                let weight = if matched > 0.0 { matched } else { 0.5 };
                phrases.push(Keyword {
                    word: phrase,
                    weight,
                    kind: KeywordType::Phrase,
                });
            }
        }
    }
    phrases
}

/// TextRank-style graph ranking over a token sequence: nodes are distinct
/// tokens, edges link tokens that co-occur within `COOCCURRENCE_WINDOW`.
fn rank_tokens(tokens: &[&String]) -> HashMap<String, f64> {
    let mut edges: HashMap<String, HashMap<String, f64>> = HashMap::new();
    for i in 0..tokens.len() {
        for j in (i + 1)..(i + COOCCURRENCE_WINDOW).min(tokens.len()) {
            if tokens[i] == tokens[j] {
                continue;
            }
            *edges
                .entry(tokens[i].clone())
                .or_default()
                .entry(tokens[j].clone())
                .or_insert(0.0) += 1.0;
            *edges
                .entry(tokens[j].clone())
                .or_default()
                .entry(tokens[i].clone())
                .or_insert(0.0) += 1.0;
        }
    }

    let nodes: Vec<String> = {
        let mut seen: Vec<String> = tokens.iter().map(|t| (*t).clone()).collect();
        seen.sort();
        seen.dedup();
        seen
    };

    let mut scores: HashMap<String, f64> =
        nodes.iter().map(|n| (n.clone(), 1.0)).collect();

    for _ in 0..RANK_ITERATIONS {
        let mut next = HashMap::new();
        for node in &nodes {
            let neighbors = edges.get(node);
            let incoming: f64 = match neighbors {
                Some(map) => map
                    .iter()
                    .map(|(nbr, w)| {
                        let out_weight: f64 = edges.get(nbr).map(|m| m.values().sum()).unwrap_or(1.0);
                        if out_weight > 0.0 {
                            w / out_weight * scores[nbr]
                        } else {
                            0.0
                        }
                    })
                    .sum(),
                None => 0.0,
            };
            next.insert(node.clone(), (1.0 - DAMPING) + DAMPING * incoming);
        }
        scores = next;
    }

    scores
}

// ---------------------------------------------------------------------------
// Latin path
// ---------------------------------------------------------------------------

fn latin_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .filter(|w| w.chars().count() >= min_token_len(Language::Latin))
        .filter(|w| !is_stopword(w, Language::Latin))
        .map(String::from)
        .collect()
}

fn extract_latin(weighted_text: &str) -> Vec<Keyword> {
    let tokens = latin_tokens(weighted_text);
    if tokens.is_empty() {
        return Vec::new();
    }
    let total = tokens.len() as f64;

    let mut freq: HashMap<String, u32> = HashMap::new();
    for t in &tokens {
        *freq.entry(t.clone()).or_insert(0) += 1;
    }
    let mut by_freq: Vec<(String, u32)> = freq.into_iter().collect();
    by_freq.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut keywords: Vec<Keyword> = by_freq
        .into_iter()
        .take(5)
        .map(|(word, count)| Keyword {
            word,
            weight: count as f64 / total,
            kind: KeywordType::Keyword,
        })
        .collect();

    let mut bigram_freq: HashMap<String, u32> = HashMap::new();
    for pair in tokens.windows(2) {
        let phrase = format!("{} {}", pair[0], pair[1]);
        *bigram_freq.entry(phrase).or_insert(0) += 1;
    }
    let total_bigrams = (tokens.len().saturating_sub(1)).max(1) as f64;
    let mut by_bigram_freq: Vec<(String, u32)> = bigram_freq.into_iter().collect();
    by_bigram_freq.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    keywords.extend(by_bigram_freq.into_iter().take(3).map(|(word, count)| Keyword {
        word,
        weight: count as f64 / total_bigrams,
        kind: KeywordType::Phrase,
    }));

    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_keywords_latin_basic() {
        let kws = extract_keywords("Stock market rallies after strong earnings report", None);
        assert!(kws.iter().any(|k| k.kind == KeywordType::Keyword));
        assert!(kws.iter().all(|k| (0.0..=1.0).contains(&k.weight) || k.kind == KeywordType::Topic));
    }

    #[test]
    fn test_extract_keywords_latin_has_phrase() {
        let kws = extract_keywords(
            "central bank raises interest rates amid inflation central bank warns again",
            None,
        );
        assert!(kws.iter().any(|k| k.kind == KeywordType::Phrase));
    }

    #[test]
    fn test_extract_keywords_topic_detected() {
        let kws = extract_keywords("测试热点：一则示例新闻", None);
        let topic = kws.iter().find(|k| k.kind == KeywordType::Topic);
        assert!(topic.is_some());
        assert_eq!(topic.unwrap().word, "测试热点");
        assert_eq!(topic.unwrap().weight, 1.0);
    }

    #[test]
    fn test_extract_keywords_cjk_has_keywords() {
        let kws = extract_keywords("人工智能技术持续突破，产业应用加速落地", None);
        assert!(kws.iter().any(|k| k.kind == KeywordType::Keyword));
    }

    #[test]
    fn test_extract_keywords_cjk_phrase_length_bounds() {
        let kws = extract_keywords("人工智能技术持续突破产业应用加速落地全面推进", None);
        for k in kws.iter().filter(|k| k.kind == KeywordType::Phrase) {
            let len = k.word.chars().count();
            assert!((4..=8).contains(&len), "phrase {} length {len} out of bounds", k.word);
        }
    }

    #[test]
    fn test_extract_keywords_empty_title() {
        let kws = extract_keywords("", None);
        // No content, no topic — should not panic and should be empty or topic-free.
        assert!(kws.iter().all(|k| k.kind != KeywordType::Topic));
    }

    #[test]
    fn test_extract_keywords_with_body_influences_ranking() {
        let title = "Markets react to policy shift";
        let without_body = extract_keywords(title, None);
        let with_body = extract_keywords(
            title,
            Some("policy policy policy policy shift shift shift"),
        );
        assert!(!without_body.is_empty());
        assert!(!with_body.is_empty());
    }
}
