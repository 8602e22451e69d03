//! Configuration management for wattson
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Embedding backend configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Generation backend configuration (reformulation + answers)
    #[serde(default)]
    pub llm: LlmConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Web crawling configuration
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding backend base URL (OpenAI-style /embeddings endpoint)
    #[serde(default = "default_embedding_backend_url")]
    pub backend_url: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend_url: default_embedding_backend_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Chat-completions backend base URL
    #[serde(default = "default_llm_backend_url")]
    pub backend_url: String,

    /// Model name/identifier
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Hard timeout for a single generation call, in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend_url: default_llm_backend_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            temperature: 0.0,
        }
    }
}

/// Chunking configuration. Window and overlap drive a deterministic sliding
/// split: identical input text always yields identical chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_max_chars")]
    pub max_chars: usize,

    /// Overlap characters between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub overlap_chars: usize,

    /// Minimum chunk size (don't create tiny chunks)
    #[serde(default = "default_chunk_min_chars")]
    pub min_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_max_chars(),
            overlap_chars: default_chunk_overlap(),
            min_chars: default_chunk_min_chars(),
        }
    }
}

/// Web crawling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Maximum crawl depth from seed URL
    #[serde(default = "default_crawl_max_depth")]
    pub max_depth: u32,

    /// Maximum pages to fetch per run
    #[serde(default = "default_crawl_max_pages")]
    pub max_pages: u32,

    /// Case-insensitive path keywords that exclude a URL from crawling
    #[serde(default = "default_exclude_keywords")]
    pub exclude_keywords: Vec<String>,

    /// File extensions recognized as downloadable attachments
    #[serde(default = "default_attachment_extensions")]
    pub attachment_extensions: Vec<String>,

    /// Requests per second per host
    #[serde(default = "default_crawl_rate_limit")]
    pub rate_limit_per_host: f64,

    /// Overall requests per second across all hosts
    #[serde(default = "default_crawl_global_rate_limit")]
    pub global_rate_limit: u32,

    /// User agent string
    #[serde(default = "default_crawl_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "default_crawl_timeout")]
    pub timeout_secs: u64,

    /// Whether to respect robots.txt
    #[serde(default = "default_respect_robots")]
    pub respect_robots_txt: bool,

    /// Maximum fetch retries per URL, with exponential backoff between attempts
    #[serde(default = "default_crawl_max_retries")]
    pub max_retries: u32,

    /// Upper bound on the visited set, against pathological link farms
    #[serde(default = "default_visited_cap")]
    pub visited_cap: usize,

    /// Hours a staged download survives without being parsed and committed
    #[serde(default = "default_staging_retention_hours")]
    pub staging_retention_hours: u64,

    /// Default refresh cadence recorded for crawled pages, in days
    #[serde(default = "default_refresh_frequency_days")]
    pub refresh_frequency_days: i64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: default_crawl_max_depth(),
            max_pages: default_crawl_max_pages(),
            exclude_keywords: default_exclude_keywords(),
            attachment_extensions: default_attachment_extensions(),
            rate_limit_per_host: default_crawl_rate_limit(),
            global_rate_limit: default_crawl_global_rate_limit(),
            user_agent: default_crawl_user_agent(),
            timeout_secs: default_crawl_timeout(),
            respect_robots_txt: default_respect_robots(),
            max_retries: default_crawl_max_retries(),
            visited_cap: default_visited_cap(),
            staging_retention_hours: default_staging_retention_hours(),
            refresh_frequency_days: default_refresh_frequency_days(),
        }
    }
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Number of chunks retrieved per question
    #[serde(default = "default_query_k")]
    pub top_k: usize,

    /// Minimum similarity score (0.0 - 1.0)
    #[serde(default = "default_query_min_score")]
    pub min_score: f32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_query_k(),
            min_score: default_query_min_score(),
        }
    }
}

/// Filesystem paths used by wattson
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Base data directory
    pub base_dir: PathBuf,

    /// SQLite metadata database file
    pub db_file: PathBuf,

    /// Directory for staged attachment downloads
    pub staging_dir: PathBuf,

    /// Config file path
    pub config_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let base_dir = default_base_dir();
        Self {
            db_file: base_dir.join("wattson.db"),
            staging_dir: base_dir.join("staging"),
            config_file: base_dir.join("config.toml"),
            base_dir,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            collection_name: default_collection_name(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            chunk: ChunkConfig::default(),
            crawl: CrawlConfig::default(),
            query: QueryConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the given path, or the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let paths = PathsConfig::default();
        let config_path = path.unwrap_or(&paths.config_file);

        if !config_path.exists() {
            debug!("No config file at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        debug!("Loading config from {:?}", config_path);
        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.paths = paths;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to its config file
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.base_dir)?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.chunk.max_chars == 0 {
            return Err(Error::Config("chunk.max_chars must be > 0".to_string()));
        }
        if self.chunk.overlap_chars >= self.chunk.max_chars {
            return Err(Error::Config(
                "chunk.overlap_chars must be smaller than chunk.max_chars".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Config("embedding.dimension must be > 0".to_string()));
        }
        if self.query.top_k == 0 {
            return Err(Error::Config("query.top_k must be > 0".to_string()));
        }
        if self.crawl.max_pages == 0 {
            return Err(Error::Config("crawl.max_pages must be > 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.chunk.max_chars, config.chunk.max_chars);
        assert_eq!(parsed.crawl.exclude_keywords, config.crawl.exclude_keywords);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let mut config = Config::default();
        config.chunk.overlap_chars = config.chunk.max_chars;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("[chunk]\nmax_chars = 800\n").unwrap();
        assert_eq!(parsed.chunk.max_chars, 800);
        assert_eq!(parsed.chunk.overlap_chars, default_chunk_overlap());
        assert_eq!(parsed.query.top_k, default_query_k());
    }
}
