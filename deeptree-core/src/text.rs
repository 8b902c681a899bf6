//! Lightweight lexical helpers shared by the extractor and the validators.
//!
//! Everything here is bag-of-words: lowercase alphanumeric tokens with stop
//! words removed. No stemming beyond what individual validators do themselves.

use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Function words ignored when comparing questions.
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "shall", "should", "may", "might", "must", "can",
    "could", "of", "in", "to", "for", "with", "on", "at", "from", "by", "about", "as", "into",
    "through", "this", "that", "these", "those", "it", "its", "and", "but", "or", "not", "than",
    "which", "what", "who", "whom", "whose", "when", "where", "why", "how", "one", "there",
    "their", "they", "them", "his", "her", "him", "she", "he", "also", "any", "all", "some",
    "such", "same", "other", "only", "most", "more", "name", "known", "called",
];

/// Split text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

/// Tokens longer than two characters that are not stop words, in order.
pub fn content_words(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Distinct content words.
pub fn content_set(text: &str) -> HashSet<String> {
    content_words(text).into_iter().collect()
}

/// Jaccard similarity of two sets (0.0 when either is empty).
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Shared elements relative to the smaller set (0.0 when either is empty).
pub fn overlap_coefficient(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / smaller as f64
}

/// Term-frequency cosine similarity over content words.
pub fn cosine_similarity(a: &str, b: &str) -> f64 {
    let tf_a = term_frequencies(a);
    let tf_b = term_frequencies(b);
    if tf_a.is_empty() || tf_b.is_empty() {
        return 0.0;
    }

    let dot: f64 = tf_a
        .iter()
        .filter_map(|(term, &count)| tf_b.get(term).map(|&other| count * other))
        .sum();
    let norm_a = tf_a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = tf_b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut tf = HashMap::new();
    for word in content_words(text) {
        *tf.entry(word).or_insert(0.0) += 1.0;
    }
    tf
}

/// Case-insensitive whole-word phrase containment.
///
/// `contains_phrase("Who founded Tesla Motors?", "tesla")` is true, while
/// `contains_phrase("Teslas", "tesla")` is not.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let needle = tokenize(needle);
    if needle.is_empty() {
        return false;
    }
    let hay = tokenize(haystack);
    hay.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Lowercase token form used for equality checks between short strings.
pub fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}

/// Case-insensitive regex for `needle` as a whole phrase. Word boundaries
/// are only required at alphanumeric edges, so "45%" still matches.
pub fn phrase_regex(needle: &str) -> Option<Regex> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }
    let boundary = |c: Option<char>| {
        if c.is_some_and(char::is_alphanumeric) { r"\b" } else { "" }
    };
    let pattern = format!(
        "(?i){}{}{}",
        boundary(needle.chars().next()),
        regex::escape(needle),
        boundary(needle.chars().last())
    );
    Regex::new(&pattern).ok()
}

/// True if any of `terms` occurs in `text` as a whole word or phrase.
pub fn any_phrase(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| contains_phrase(text, t))
}
