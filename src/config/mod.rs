//! Configuration management for ragline
//!
//! Configuration is loaded from TOML, then environment overrides
//! (`RAGLINE_SECTION__KEY=value`), then an optional named profile, and is
//! finally checked by [`ConfigValidator`].

use crate::error::{RaglineError, Result};
use crate::segment::SegmentStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(rename = "_meta", default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            created_at: current_timestamp(),
            last_modified: current_timestamp(),
        }
    }
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `ragline.db`; a leading `~` is expanded
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.ragline"),
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    /// Maximum cached embeddings; 0 disables the cache
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            batch_size: 32,
            cache_capacity: 10_000,
        }
    }
}

/// Generation provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub system_prompt: String,
    /// Hypothetical questions generated per chunk at ingestion; 0 disables
    pub intents_per_chunk: usize,
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You answer questions using only the provided context. \
Cite sources with their bracketed markers. If the context does not contain the answer, say so.";

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            temperature: 0.1,
            timeout_secs: 120,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            intents_per_chunk: 3,
        }
    }
}

/// Retry policy for provider calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 4000,
        }
    }
}

/// Segmentation limits, all in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub strategy: SegmentStrategy,
    pub max_chunk_size: usize,
    pub overlap: usize,
    pub min_chunk_size: usize,
    /// Structured blocks up to `max_chunk_size * factor` may share a chunk
    pub structure_oversize_factor: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: SegmentStrategy::Fixed,
            max_chunk_size: 1800,
            overlap: 400,
            min_chunk_size: 50,
            structure_oversize_factor: 1.5,
        }
    }
}

/// Hybrid search and candidate reduction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub intent_weight: f32,
    pub content_weight: f32,
    /// KNN over-fetch factor relative to top_k
    pub search_multiplier: usize,
    pub rrf_k: f32,
    pub query_expansion: bool,
    pub max_query_variants: usize,
    pub dedup_enabled: bool,
    pub dedup_threshold: f32,
    /// Deduplicate before the similarity threshold instead of after
    pub dedup_before_threshold: bool,
    pub mmr_enabled: bool,
    pub mmr_lambda: f32,
    pub rerank_enabled: bool,
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub default_min_similarity: f32,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            intent_weight: 0.7,
            content_weight: 0.3,
            search_multiplier: 3,
            rrf_k: 60.0,
            query_expansion: true,
            max_query_variants: 3,
            dedup_enabled: true,
            dedup_threshold: 0.95,
            dedup_before_threshold: false,
            mmr_enabled: false,
            mmr_lambda: 0.7,
            rerank_enabled: true,
            default_top_k: 5,
            max_top_k: 100,
            default_min_similarity: 0.3,
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
        }
    }
}

/// Heuristic rerank adjustments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub term_boost: f32,
    pub position_boost: f32,
    pub short_penalty: f32,
    /// Texts shorter than this many characters are penalized
    pub short_length: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            term_boost: 0.1,
            position_boost: 0.05,
            short_penalty: 0.05,
            short_length: 100,
        }
    }
}

/// Context assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_context_length: usize,
    pub expand_adjacent: bool,
    pub diversify: bool,
    pub overlap_threshold: f32,
    pub adjacent_discount: f32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_length: 8000,
            expand_adjacent: true,
            diversify: false,
            overlap_threshold: 0.7,
            adjacent_discount: 0.9,
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand_adjacent: Option<bool>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RaglineError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RaglineError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RaglineError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RaglineError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| RaglineError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(model) = overrides.generation_model {
            self.generation.model = model;
        }
        if let Some(weight) = overrides.intent_weight {
            self.retrieval.intent_weight = weight;
        }
        if let Some(weight) = overrides.content_weight {
            self.retrieval.content_weight = weight;
        }
        if let Some(expand) = overrides.expand_adjacent {
            self.context.expand_adjacent = expand;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: RAGLINE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("RAGLINE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__CACHE_CAPACITY" => {
                self.embedding.cache_capacity = parse_env(path, value)?
            }
            "GENERATION__BASE_URL" => self.generation.base_url = value.to_string(),
            "GENERATION__MODEL" => self.generation.model = value.to_string(),
            "GENERATION__TEMPERATURE" => self.generation.temperature = parse_env(path, value)?,
            "GENERATION__INTENTS_PER_CHUNK" => {
                self.generation.intents_per_chunk = parse_env(path, value)?
            }
            "CHUNKING__STRATEGY" => self.chunking.strategy = parse_env(path, value)?,
            "CHUNKING__MAX_CHUNK_SIZE" => self.chunking.max_chunk_size = parse_env(path, value)?,
            "CHUNKING__OVERLAP" => self.chunking.overlap = parse_env(path, value)?,
            "RETRIEVAL__INTENT_WEIGHT" => self.retrieval.intent_weight = parse_env(path, value)?,
            "RETRIEVAL__CONTENT_WEIGHT" => {
                self.retrieval.content_weight = parse_env(path, value)?
            }
            "RETRIEVAL__QUERY_EXPANSION" => {
                self.retrieval.query_expansion = parse_env(path, value)?
            }
            "RETRIEVAL__MMR_ENABLED" => self.retrieval.mmr_enabled = parse_env(path, value)?,
            "CONTEXT__MAX_CONTEXT_LENGTH" => {
                self.context.max_context_length = parse_env(path, value)?
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Data directory with a leading `~` expanded
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_home(&self.storage.data_dir)
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("ragline.db"))
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RaglineError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("ragline").join("config.toml"))
    }
}

fn parse_env<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| RaglineError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| RaglineError::Config("Cannot determine home directory".to_string()))?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.meta.schema_version, "1.0.0");
        assert_eq!(config.chunking.max_chunk_size, 1800);
        assert_eq!(config.chunking.overlap, 400);
        assert_eq!(config.retrieval.intent_weight, 0.7);
        assert_eq!(config.retrieval.content_weight, 0.3);
        assert_eq!(config.retrieval.rrf_k, 60.0);
        assert_eq!(config.context.max_context_length, 8000);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.chunking.strategy = SegmentStrategy::Structure;
        config.retrieval.mmr_enabled = true;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.chunking.strategy, SegmentStrategy::Structure);
        assert!(loaded.retrieval.mmr_enabled);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[_meta]\nschema_version = \"1.0.0\"\n\n[retrieval]\nintent_weight = 0.5\ncontent_weight = 0.5\ndedup_before_threshold = true\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.retrieval.intent_weight, 0.5);
        assert!(config.retrieval.dedup_before_threshold);
        assert_eq!(config.embedding.dimension, 384);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/ragline/config.toml")).unwrap_err();
        assert!(matches!(err, RaglineError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.profiles.insert(
            "precise".to_string(),
            ProfileOverrides {
                intent_weight: Some(0.5),
                content_weight: Some(0.5),
                expand_adjacent: Some(false),
                ..ProfileOverrides::default()
            },
        );

        config.apply_profile("precise").unwrap();
        assert_eq!(config.retrieval.intent_weight, 0.5);
        assert!(!config.context.expand_adjacent);
        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_env_value_parsing() {
        let mut config = Config::default();
        config
            .set_value_from_env("CHUNKING__STRATEGY", "structure")
            .unwrap();
        config
            .set_value_from_env("RETRIEVAL__INTENT_WEIGHT", "0.4")
            .unwrap();
        assert_eq!(config.chunking.strategy, SegmentStrategy::Structure);
        assert_eq!(config.retrieval.intent_weight, 0.4);
        assert!(config
            .set_value_from_env("CHUNKING__OVERLAP", "lots")
            .is_err());
    }

    #[test]
    fn test_expand_home() {
        let plain = expand_home(Path::new("/var/lib/ragline")).unwrap();
        assert_eq!(plain, PathBuf::from("/var/lib/ragline"));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/.ragline")).unwrap(), home.join(".ragline"));
        }
    }
}
