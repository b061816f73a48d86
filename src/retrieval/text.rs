//! Token sets for lexical overlap

use ahash::AHashSet;

/// Lowercased tokens longer than two characters, punctuation stripped
pub fn tokenize(text: &str) -> AHashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Jaccard similarity of two token sets. Two empty sets share nothing.
pub fn jaccard(a: &AHashSet<String>, b: &AHashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}

pub fn text_similarity(a: &str, b: &str) -> f32 {
    jaccard(&tokenize(a), &tokenize(b))
}
