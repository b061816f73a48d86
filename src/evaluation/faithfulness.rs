//! Answer faithfulness and hallucination heuristics
//!
//! Literal-overlap signals only. They are logged alongside answers and never
//! change what the pipeline returns.

use crate::segment::split_sentences;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Below this supported-sentence fraction an answer is flagged unfaithful
pub const FAITHFULNESS_THRESHOLD: f32 = 0.7;

/// Only tokens longer than this count as content words
const MIN_TOKEN_CHARS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaithfulnessReport {
    /// Fraction of sentences supported by the context
    pub score: f32,
    pub supported_sentences: usize,
    pub total_sentences: usize,
    pub unsupported: Vec<String>,
    pub is_faithful: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallucinationReport {
    /// Absolute claims ("always ...", "every X is ...") absent from the sources
    pub absolute_claims: Vec<String>,
    /// Numbers and quantities absent from the sources
    pub unsupported_numbers: Vec<String>,
}

impl HallucinationReport {
    pub fn is_flagged(&self) -> bool {
        !self.absolute_claims.is_empty() || !self.unsupported_numbers.is_empty()
    }
}

fn long_tokens(sentence: &str) -> Vec<String> {
    sentence
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > MIN_TOKEN_CHARS)
        .map(|t| t.to_lowercase())
        .collect()
}

/// A sentence is supported when at least half of its long tokens occur in
/// the context. An answer without sentences scores 1.
pub fn answer_faithfulness(answer: &str, context: &str) -> FaithfulnessReport {
    let context = context.to_lowercase();
    let sentences = split_sentences(answer);

    let mut supported = 0;
    let mut unsupported = Vec::new();

    for sentence in &sentences {
        let tokens = long_tokens(sentence);
        let found = tokens.iter().filter(|t| context.contains(t.as_str())).count();
        if found * 2 >= tokens.len() {
            supported += 1;
        } else {
            unsupported.push(sentence.to_string());
        }
    }

    let score = if sentences.is_empty() {
        1.0
    } else {
        supported as f32 / sentences.len() as f32
    };

    FaithfulnessReport {
        score,
        supported_sentences: supported,
        total_sentences: sentences.len(),
        unsupported,
        is_faithful: score >= FAITHFULNESS_THRESHOLD,
    }
}

fn absolute_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\b(?:always|never)\s+\w+",
            r"(?i)\ball\s+\w+\s+(?:are|must|should)\b",
            r"(?i)\bevery\s+\w+\s+(?:is|are)\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("absolute claim regex"))
        .collect()
    })
}

fn number_pattern() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| {
        Regex::new(r"(?i)\b\d+(?:[.,]\d+)*(?:\s?%|\s?(?:ms|sec|min|kb|mb|gb|tb|kg|km|cm|mm|s|h|g|m|x)\b)?")
            .expect("number regex")
    })
}

/// Flag absolute claims and numeric tokens in `answer` that do not appear
/// literally in any of `sources`
pub fn hallucination_check(answer: &str, sources: &[&str]) -> HallucinationReport {
    let corpus = sources.join("\n").to_lowercase();
    let compact_corpus: String = corpus.chars().filter(|c| !c.is_whitespace()).collect();

    let absent = |phrase: &str| !corpus.contains(&phrase.to_lowercase());

    let mut absolute_claims: Vec<String> = Vec::new();
    for pattern in absolute_patterns() {
        for m in pattern.find_iter(answer) {
            let phrase = m.as_str().to_string();
            if absent(&phrase) && !absolute_claims.contains(&phrase) {
                absolute_claims.push(phrase);
            }
        }
    }

    let mut unsupported_numbers: Vec<String> = Vec::new();
    for m in number_pattern().find_iter(answer) {
        let token = m.as_str().to_string();
        let compact: String = token.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
        if absent(&token) && !compact_corpus.contains(&compact) && !unsupported_numbers.contains(&token) {
            unsupported_numbers.push(token);
        }
    }

    HallucinationReport {
        absolute_claims,
        unsupported_numbers,
    }
}
