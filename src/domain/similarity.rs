//! Query tokenization and Jaccard similarity for the result cache.
//!
//! The tokenizer is deterministic and locale-aware without a segmenter
//! dependency: alphanumeric runs become lowercased word tokens, while CJK
//! ideographs are treated as ideographic words and emitted one codepoint
//! at a time. Stop words and one-character non-CJK tokens are dropped.

use std::collections::BTreeSet;

/// Common English stop words.
const STOP_WORDS_EN: [&str; 22] = [
    "the", "a", "an", "and", "or", "of", "in", "on", "to", "for", "is", "are", "was", "at",
    "by", "with", "from", "it", "this", "that", "be", "as",
];

/// Common Chinese stop characters.
const STOP_WORDS_ZH: [char; 30] = [
    '的', '了', '在', '是', '我', '有', '和', '就', '不', '人', '都', '一', '上', '也', '很',
    '到', '说', '要', '去', '你', '会', '着', '看', '好', '这', '个', '没', '自', '己', '么',
];

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'        // CJK Unified Ideographs
        | '\u{3400}'..='\u{4DBF}'      // Extension A
        | '\u{F900}'..='\u{FAFF}'      // Compatibility Ideographs
    )
}

/// Tokenize a query into its similarity token set.
///
/// Pure: the same input always yields the same set. A query with no
/// usable tokens (all stop words, all punctuation) yields an empty set,
/// which disables similarity matching for it.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    let mut word = String::new();

    let mut flush = |word: &mut String, tokens: &mut BTreeSet<String>| {
        if word.chars().count() > 1 && !STOP_WORDS_EN.contains(&word.as_str()) {
            tokens.insert(std::mem::take(word));
        } else {
            word.clear();
        }
    };

    for c in text.chars() {
        if is_cjk(c) {
            flush(&mut word, &mut tokens);
            if !STOP_WORDS_ZH.contains(&c) {
                tokens.insert(c.to_string());
            }
        } else if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
        } else {
            flush(&mut word, &mut tokens);
        }
    }
    flush(&mut word, &mut tokens);

    tokens
}

/// Jaccard similarity of two token sets: `|A ∩ B| / |A ∪ B|`.
///
/// Either set being empty yields 0.0.
pub fn jaccard_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}
