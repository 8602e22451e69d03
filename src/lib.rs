//! wattson: clean-energy document acquisition and grounded retrieval.
//!
//! The crate covers two halves of a RAG assistant:
//! - ingestion: web crawling, checksum-based dedup/refresh, multi-format
//!   parsing, chunking, embedding, and the two-sided commit into the vector
//!   store and the metadata store
//! - querying: history-aware query reformulation, top-k retrieval, and
//!   citation-enforced answer generation
//!
//! Embedding and answer generation are injected capabilities (see [`embed`]
//! and [`llm`]); the vector index is reached through the [`store`] trait.

pub mod answer;
pub mod checksum;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod crawl;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod meta;
pub mod parse;
pub mod store;
