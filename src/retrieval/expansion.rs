//! Query expansion
//!
//! Paraphrases come from the generation provider when one is configured;
//! otherwise, or when it fails, from interrogative rewrite rules.

use crate::generation::{parse_lines, GenerationProvider, GenerationRequest};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

const PARAPHRASE_PROMPT: &str = "You rewrite search queries. \
Reply with one alternative phrasing per line and nothing else.";

struct Rule {
    pattern: &'static str,
    templates: &'static [&'static str],
}

/// `{}` in a template is replaced by the captured remainder
const RULES: &[Rule] = &[
    Rule {
        pattern: r"(?i)^how (?:do|can|should|would) (?:i|we|you) (.+)$",
        templates: &["{}", "steps to {}"],
    },
    Rule {
        pattern: r"(?i)^how to (.+)$",
        templates: &["{}", "steps to {}"],
    },
    Rule {
        pattern: r"(?i)^what (?:is|are) (?:an? |the )?(.+)$",
        templates: &["{}", "{} definition"],
    },
    Rule {
        pattern: r"(?i)^why (?:does|do|is|are|did|would) (.+)$",
        templates: &["reason {}", "{} cause"],
    },
    Rule {
        pattern: r"(?i)^why (.+)$",
        templates: &["reason {}", "{} cause"],
    },
];

const GENERIC_QUALIFIERS: &[&str] = &["overview", "explanation", "example"];

fn compiled_rules() -> &'static [(Regex, &'static [&'static str])] {
    static RULES_RE: OnceLock<Vec<(Regex, &'static [&'static str])>> = OnceLock::new();
    RULES_RE.get_or_init(|| {
        RULES
            .iter()
            .map(|rule| {
                (
                    Regex::new(rule.pattern).expect("expansion rule regex"),
                    rule.templates,
                )
            })
            .collect()
    })
}

/// Rule-based variants of `query`, original first, at most `max_variants`
pub fn rule_based_variants(query: &str, max_variants: usize) -> Vec<String> {
    let original = query.trim();
    let stem = original.trim_end_matches('?').trim();

    let mut variants = vec![original.to_string()];

    let rewritten: Vec<String> = compiled_rules()
        .iter()
        .find_map(|(re, templates)| {
            re.captures(stem).and_then(|caps| caps.get(1)).map(|rest| {
                templates
                    .iter()
                    .map(|t| t.replace("{}", rest.as_str().trim()))
                    .collect()
            })
        })
        .unwrap_or_else(|| {
            GENERIC_QUALIFIERS
                .iter()
                .map(|q| format!("{} {}", stem, q))
                .collect()
        });

    variants.extend(rewritten);
    finalize(variants, max_variants)
}

/// Drop blanks and case-insensitive repeats, then cap the list
fn finalize(variants: Vec<String>, max_variants: usize) -> Vec<String> {
    let mut seen = ahash::AHashSet::new();
    variants
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && seen.insert(v.to_lowercase()))
        .take(max_variants.max(1))
        .collect()
}

/// Produces query variants for multi-query retrieval
pub struct QueryExpander {
    generator: Option<Arc<dyn GenerationProvider>>,
    max_variants: usize,
}

impl QueryExpander {
    pub fn new(max_variants: usize) -> Self {
        Self {
            generator: None,
            max_variants: max_variants.max(1),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn GenerationProvider>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Up to `max_variants` variants, the original query always first
    pub async fn expand(&self, query: &str) -> Vec<String> {
        if self.max_variants == 1 {
            return vec![query.trim().to_string()];
        }

        if let Some(generator) = &self.generator {
            let request = GenerationRequest::new(
                PARAPHRASE_PROMPT,
                "",
                format!(
                    "Write {} alternative phrasings of this search query: {}",
                    self.max_variants - 1,
                    query.trim()
                ),
            );

            match generator.generate(&request).await {
                Ok(reply) => {
                    let mut variants = vec![query.trim().to_string()];
                    variants.extend(parse_lines(&reply, self.max_variants - 1));
                    let variants = finalize(variants, self.max_variants);
                    if variants.len() > 1 {
                        debug!(variants = variants.len(), "Expanded query with generator");
                        return variants;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Query expansion failed, using rule-based variants");
                }
            }
        }

        rule_based_variants(query, self.max_variants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use async_trait::async_trait;

    struct Paraphraser(Result<String, GenerationError>);

    #[async_trait]
    impl GenerationProvider for Paraphraser {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            self.0.clone()
        }

        fn model_name(&self) -> &str {
            "paraphraser"
        }
    }

    #[test]
    fn test_how_do_i_rewrite() {
        let variants = rule_based_variants("How do I reset my password?", 3);
        assert_eq!(
            variants,
            vec!["How do I reset my password?", "reset my password", "steps to reset my password"]
        );
    }

    #[test]
    fn test_what_is_rewrite() {
        let variants = rule_based_variants("what is the write-ahead log", 3);
        assert_eq!(variants[1], "write-ahead log");
        assert_eq!(variants[2], "write-ahead log definition");
    }

    #[test]
    fn test_why_rewrite() {
        let variants = rule_based_variants("Why does the build fail?", 3);
        assert_eq!(variants[1], "reason the build fail");
    }

    #[test]
    fn test_generic_fallback_and_cap() {
        let variants = rule_based_variants("replication lag", 2);
        assert_eq!(variants, vec!["replication lag", "replication lag overview"]);
        assert_eq!(rule_based_variants("replication lag", 0).len(), 1);
    }

    #[tokio::test]
    async fn test_generator_variants_preferred() {
        let expander = QueryExpander::new(3)
            .with_generator(Arc::new(Paraphraser(Ok("1. reset a password\n2. password recovery".into()))));
        let variants = expander.expand("how do i reset my password").await;
        assert_eq!(
            variants,
            vec!["how do i reset my password", "reset a password", "password recovery"]
        );
    }

    #[tokio::test]
    async fn test_generator_failure_falls_back() {
        let expander = QueryExpander::new(3)
            .with_generator(Arc::new(Paraphraser(Err(GenerationError::Unavailable("down".into())))));
        let variants = expander.expand("how to rotate keys").await;
        assert_eq!(variants, vec!["how to rotate keys", "rotate keys", "steps to rotate keys"]);
    }

    #[tokio::test]
    async fn test_single_variant_skips_generator() {
        let expander = QueryExpander::new(1)
            .with_generator(Arc::new(Paraphraser(Err(GenerationError::Unavailable("down".into())))));
        assert_eq!(expander.expand("  anything ").await, vec!["anything"]);
    }
}
