//! Default values for configuration

use std::path::PathBuf;

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default collection name
pub fn default_collection_name() -> String {
    "wattson_docs".to_string()
}

/// Default embedding backend URL
pub fn default_embedding_backend_url() -> String {
    std::env::var("WATTSON_EMBEDDING_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension (matches bge-small)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default generation backend URL
pub fn default_llm_backend_url() -> String {
    std::env::var("WATTSON_LLM_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:11434/v1".to_string())
}

/// Default generation model
pub fn default_llm_model() -> String {
    "llama3.1:8b".to_string()
}

/// Default generation timeout in seconds
pub fn default_llm_timeout() -> u64 {
    120
}

/// Default maximum characters per chunk
pub fn default_chunk_max_chars() -> usize {
    1500
}

/// Default minimum characters per chunk
pub fn default_chunk_min_chars() -> usize {
    100
}

/// Default overlap characters between chunks
pub fn default_chunk_overlap() -> usize {
    200
}

/// Default maximum crawl depth
pub fn default_crawl_max_depth() -> u32 {
    3
}

/// Default maximum pages per crawl run
pub fn default_crawl_max_pages() -> u32 {
    1000
}

/// Default path keywords that exclude a URL from crawling
pub fn default_exclude_keywords() -> Vec<String> {
    [
        "about", "contact", "privacy", "login", "signin", "signup", "terms",
        "careers", "cookie", "legal", "subscribe", "donate",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Default attachment extensions recognized during crawling
pub fn default_attachment_extensions() -> Vec<String> {
    ["pdf", "xlsx", "xls", "csv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Default rate limit (requests per second per host)
pub fn default_crawl_rate_limit() -> f64 {
    2.0
}

/// Default global rate limit (requests per second across hosts)
pub fn default_crawl_global_rate_limit() -> u32 {
    8
}

/// Default user agent
pub fn default_crawl_user_agent() -> String {
    format!("wattson/{} (Clean Energy Indexer)", env!("CARGO_PKG_VERSION"))
}

/// Default request timeout in seconds
pub fn default_crawl_timeout() -> u64 {
    30
}

/// Default: respect robots.txt
pub fn default_respect_robots() -> bool {
    true
}

/// Default fetch retries per URL
pub fn default_crawl_max_retries() -> u32 {
    2
}

/// Default visited-set cap
pub fn default_visited_cap() -> usize {
    50_000
}

/// Default staging retention window in hours
pub fn default_staging_retention_hours() -> u64 {
    48
}

/// Default refresh cadence for crawled pages, in days
pub fn default_refresh_frequency_days() -> i64 {
    7
}

/// Default number of query results
pub fn default_query_k() -> usize {
    6
}

/// Default minimum similarity score
pub fn default_query_min_score() -> f32 {
    0.0
}

/// Default base data directory (~/.local/share/wattson or platform equivalent)
pub fn default_base_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WATTSON_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wattson")
}
