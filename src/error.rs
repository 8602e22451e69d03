//! Custom error types for wattson

use thiserror::Error;

/// Main error type for wattson operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Network-level fetch failure (non-2xx status, timeout, DNS). Retryable
    /// with backoff up to the configured cap.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The byte stream is not the format its extension/content-type claims.
    /// Fatal for that document only.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Document-level parse failure. Unit-level failures inside a multi-unit
    /// document are skipped and counted instead.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Vector store and metadata store disagree after bounded reconciliation
    /// attempts; the ingest needs manual attention.
    #[error("Ingest error for {identity}: {detail}")]
    Ingest { identity: String, detail: String },

    #[error("Generation timed out after {0}s")]
    GenerationTimeout(u64),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Robots.txt disallowed: {0}")]
    RobotsDisallowed(String),
}

impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::VectorStore(err.to_string())
    }
}

/// Result type alias for wattson
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_error_names_the_identity() {
        let err = Error::Ingest {
            identity: "https://example.org/grid".to_string(),
            detail: "metadata commit failed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Ingest error for https://example.org/grid: metadata commit failed"
        );
    }
}
