use crate::config::Config;
use crate::error::{RaglineError, Result, ValidationError};

/// Generation providers the CLI knows how to construct
pub const SUPPORTED_PROVIDERS: [&str; 1] = ["ollama"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_generation(config, &mut errors);
        Self::validate_retry(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_context(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RaglineError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_generation(config: &Config, errors: &mut Vec<ValidationError>) {
        let temp = config.generation.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "generation.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.generation.provider;
        if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "generation.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    SUPPORTED_PROVIDERS, provider
                ),
            ));
        }

        if config.generation.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "generation.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_retry(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retry.max_attempts == 0 {
            errors.push(ValidationError::new(
                "retry.max_attempts",
                "At least one attempt is required",
            ));
        }

        if config.retry.base_delay_ms > config.retry.max_delay_ms {
            errors.push(ValidationError::new(
                "retry.base_delay_ms",
                "Base delay cannot exceed max delay",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;

        if chunking.max_chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.max_chunk_size",
                "Max chunk size must be greater than 0",
            ));
        }

        if chunking.overlap >= chunking.max_chunk_size {
            errors.push(ValidationError::new(
                "chunking.overlap",
                format!(
                    "Overlap ({}) must be smaller than max chunk size ({})",
                    chunking.overlap, chunking.max_chunk_size
                ),
            ));
        }

        if chunking.min_chunk_size > chunking.max_chunk_size {
            errors.push(ValidationError::new(
                "chunking.min_chunk_size",
                "Min chunk size cannot exceed max chunk size",
            ));
        }

        if !(chunking.structure_oversize_factor >= 1.0) {
            errors.push(ValidationError::new(
                "chunking.structure_oversize_factor",
                format!(
                    "Oversize factor must be at least 1.0, got {}",
                    chunking.structure_oversize_factor
                ),
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        for (path, weight) in [
            ("retrieval.intent_weight", retrieval.intent_weight),
            ("retrieval.content_weight", retrieval.content_weight),
        ] {
            if !(weight >= 0.0) || !weight.is_finite() {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be a non-negative number, got {}", weight),
                ));
            }
        }
        if retrieval.intent_weight == 0.0 && retrieval.content_weight == 0.0 {
            errors.push(ValidationError::new(
                "retrieval.intent_weight",
                "Intent and content weights cannot both be zero",
            ));
        }

        for (path, value) in [
            ("retrieval.dedup_threshold", retrieval.dedup_threshold),
            ("retrieval.mmr_lambda", retrieval.mmr_lambda),
            (
                "retrieval.default_min_similarity",
                retrieval.default_min_similarity,
            ),
        ] {
            Self::check_unit_interval(path, value, errors);
        }

        if retrieval.default_top_k == 0 || retrieval.default_top_k > retrieval.max_top_k {
            errors.push(ValidationError::new(
                "retrieval.default_top_k",
                format!(
                    "Default top_k must be between 1 and max_top_k ({}), got {}",
                    retrieval.max_top_k, retrieval.default_top_k
                ),
            ));
        }

        if retrieval.search_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.search_multiplier",
                "Search multiplier must be greater than 0",
            ));
        }

        if !(retrieval.rrf_k >= 0.0) {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                "RRF k must be non-negative",
            ));
        }

        if retrieval.hnsw_m == 0 || retrieval.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "retrieval.hnsw_m",
                "HNSW M and ef_construction must be greater than 0",
            ));
        }
    }

    fn validate_context(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.context.max_context_length == 0 {
            errors.push(ValidationError::new(
                "context.max_context_length",
                "Max context length must be greater than 0",
            ));
        }

        Self::check_unit_interval(
            "context.overlap_threshold",
            config.context.overlap_threshold,
            errors,
        );
        Self::check_unit_interval(
            "context.adjacent_discount",
            config.context.adjacent_discount,
            errors,
        );
    }

    fn check_unit_interval(path: &str, value: f32, errors: &mut Vec<ValidationError>) {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ValidationError::new(
                path,
                format!("Value must be between 0.0 and 1.0, got {}", value),
            ));
        }
    }
}
