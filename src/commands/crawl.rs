//! Crawl command implementation
//!
//! Runs the crawler over a seed URL, ingests every fetched page, then drains
//! the staged attachments in a second pass. Per-document failures are counted
//! and logged; they never abort the run.

use crate::config::Config;
use crate::crawl::{CrawledPage, Crawler, StagingRecord};
use crate::error::{Error, Result};
use crate::ingest::{IngestOutcome, IngestPipeline, IngestStatus};
use crate::meta::MetaDb;
use crate::parse::DocumentKind;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Concurrent ingest tasks per drain pass. Same-identity ingests still
/// serialize on the pipeline's per-identity locks.
const INGEST_WORKERS: usize = 4;

/// Per-run overrides for the configured crawl bounds
#[derive(Debug, Clone, Default)]
pub struct CrawlOverrides {
    pub max_depth: Option<u32>,
    pub max_pages: Option<u32>,
    pub refresh_frequency_days: Option<i64>,
}

/// Crawl run statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    pub pages_fetched: usize,
    pub pages_ingested: usize,
    pub pages_refreshed: usize,
    pub pages_skipped: usize,
    pub pages_failed: usize,
    pub attachments_staged: usize,
    pub attachments_ingested: usize,
    pub attachments_failed: usize,
    pub attachments_deduped: u32,
    pub chunks_created: usize,
    pub filtered_out: u32,
    pub fetch_failures: u32,
    pub staged_swept: usize,
}

/// Crawl a seed URL and ingest what it finds
pub async fn cmd_crawl(
    config: &Config,
    db: &MetaDb,
    pipeline: &Arc<IngestPipeline>,
    seed_url: &str,
    overrides: CrawlOverrides,
    language: &str,
) -> Result<CrawlStats> {
    let mut crawl_config = config.crawl.clone();
    if let Some(depth) = overrides.max_depth {
        crawl_config.max_depth = depth;
    }
    if let Some(pages) = overrides.max_pages {
        crawl_config.max_pages = pages;
    }
    let refresh_days = overrides
        .refresh_frequency_days
        .unwrap_or(crawl_config.refresh_frequency_days);

    let crawler = Crawler::new(crawl_config, config.paths.staging_dir.clone())?;

    info!("Crawling {}", seed_url);
    let report = crawler.crawl(seed_url, db).await?;

    let mut stats = CrawlStats {
        pages_fetched: report.pages.len(),
        attachments_staged: report.staged.len(),
        attachments_deduped: report.deduped_attachments,
        filtered_out: report.filtered_out,
        fetch_failures: report.fetch_failures,
        ..CrawlStats::default()
    };

    // Ingest fetched pages, a bounded number in flight at once. Distinct
    // identities run in parallel; the pipeline's lock map serializes repeats.
    let pb = start_progress_bar(report.pages.len(), "Ingesting pages");
    let mut queue: VecDeque<CrawledPage> = report.pages.iter().cloned().collect();
    let mut tasks: JoinSet<(String, Result<IngestOutcome>)> = JoinSet::new();
    while !queue.is_empty() || !tasks.is_empty() {
        while tasks.len() < INGEST_WORKERS {
            let Some(page) = queue.pop_front() else { break };
            let pipeline = Arc::clone(pipeline);
            let language = language.to_string();
            tasks.spawn(async move {
                let outcome = pipeline
                    .ingest_bytes(
                        &page.url,
                        page.content.as_bytes(),
                        DocumentKind::WebPage,
                        &language,
                        Some(refresh_days),
                    )
                    .await;
                (page.url, outcome)
            });
        }
        let Some(joined) = tasks.join_next().await else { break };
        match joined {
            Ok((_, Ok(outcome))) => {
                stats.chunks_created += outcome.chunk_count;
                match outcome.status {
                    IngestStatus::Ingested => stats.pages_ingested += 1,
                    IngestStatus::Refreshed => stats.pages_refreshed += 1,
                    IngestStatus::Skipped => stats.pages_skipped += 1,
                }
            }
            Ok((url, Err(e))) => {
                warn!("Failed to ingest page {}: {}", url, e);
                stats.pages_failed += 1;
            }
            Err(e) => {
                warn!("Page ingest task failed: {}", e);
                stats.pages_failed += 1;
            }
        }
        advance_progress(&pb);
    }
    finish_progress(pb, "Pages ingested");

    // Drain staged attachments; decoupled from the crawl itself
    let pb = start_progress_bar(report.staged.len(), "Ingesting attachments");
    let mut queue: VecDeque<StagingRecord> = report.staged.iter().cloned().collect();
    let mut tasks: JoinSet<(StagingRecord, Result<usize>)> = JoinSet::new();
    while !queue.is_empty() || !tasks.is_empty() {
        while tasks.len() < INGEST_WORKERS {
            let Some(record) = queue.pop_front() else { break };
            let pipeline = Arc::clone(pipeline);
            let language = language.to_string();
            tasks.spawn(async move {
                let outcome = ingest_staged(pipeline.as_ref(), &record, &language).await;
                (record, outcome)
            });
        }
        let Some(joined) = tasks.join_next().await else { break };
        match joined {
            Ok((record, Ok(chunk_count))) => {
                stats.attachments_ingested += 1;
                stats.chunks_created += chunk_count;
                if let Err(e) = crawler.staging().remove(&record) {
                    warn!("Failed to remove staged file {:?}: {}", record.local_path, e);
                }
            }
            // Unsupported or broken attachments are skipped, not fatal; the
            // staged file stays for the retention window in case of a retry.
            Ok((record, Err(e))) => {
                warn!("Failed to ingest attachment {}: {}", record.url, e);
                stats.attachments_failed += 1;
            }
            Err(e) => {
                warn!("Attachment ingest task failed: {}", e);
                stats.attachments_failed += 1;
            }
        }
        advance_progress(&pb);
    }
    finish_progress(pb, "Attachments ingested");

    stats.staged_swept = crawler.staging().sweep_expired()?;
    Ok(stats)
}

async fn ingest_staged(
    pipeline: &IngestPipeline,
    record: &StagingRecord,
    language: &str,
) -> Result<usize> {
    let kind = DocumentKind::from_extension(&record.local_path)
        .ok_or_else(|| Error::UnsupportedFormat(record.url.clone()))?;
    let bytes = std::fs::read(&record.local_path)?;

    let outcome = pipeline
        .ingest_bytes(&record.url, &bytes, kind, language, None)
        .await?;
    Ok(outcome.chunk_count)
}

fn start_progress_bar(len: usize, message: &str) -> Option<ProgressBar> {
    if len == 0 {
        return None;
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_message(message.to_string());
    Some(pb)
}

fn advance_progress(pb: &Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.inc(1);
    }
}

fn finish_progress(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}

/// Print crawl stats to console
pub fn print_crawl_stats(stats: &CrawlStats) {
    println!("\n✓ Crawl complete");
    println!("  Pages fetched: {}", stats.pages_fetched);
    println!(
        "  Pages ingested: {} new, {} refreshed, {} unchanged, {} failed",
        stats.pages_ingested, stats.pages_refreshed, stats.pages_skipped, stats.pages_failed
    );
    println!(
        "  Attachments: {} staged, {} ingested, {} deduped, {} failed",
        stats.attachments_staged,
        stats.attachments_ingested,
        stats.attachments_deduped,
        stats.attachments_failed
    );
    println!("  Chunks created: {}", stats.chunks_created);
    println!(
        "  Filtered out: {}, fetch failures: {}",
        stats.filtered_out, stats.fetch_failures
    );
    if stats.staged_swept > 0 {
        println!("  Expired staged files swept: {}", stats.staged_swept);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::Embedder;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct TinyEmbedder;

    #[async_trait]
    impl Embedder for TinyEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "tiny"
        }
    }

    async fn setup(tmp: &TempDir) -> (Config, MetaDb, Arc<IngestPipeline>, Arc<InMemoryStore>) {
        let mut config = Config::default();
        config.paths.base_dir = tmp.path().to_path_buf();
        config.paths.db_file = tmp.path().join("wattson.db");
        config.paths.staging_dir = tmp.path().join("staging");
        config.crawl.rate_limit_per_host = 1000.0;
        config.crawl.global_rate_limit = 1000;
        config.crawl.max_retries = 0;
        config.crawl.respect_robots_txt = false;
        config.chunk.max_chars = 300;
        config.chunk.overlap_chars = 30;
        config.chunk.min_chars = 10;

        let db = MetaDb::new(&config.paths.db_file).await.unwrap();
        let store = Arc::new(InMemoryStore::new());
        let pipeline = Arc::new(IngestPipeline::new(
            db.clone(),
            store.clone(),
            Arc::new(TinyEmbedder),
            &config,
        ));
        (config, db, pipeline, store)
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_raw(format!("<html><body>{}</body></html>", body), "text/html")
    }

    #[tokio::test]
    async fn test_crawl_ingests_pages_then_skips_on_rerun() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/index.html"))
            .respond_with(html(&format!(
                "<p>{}</p>",
                "district heating cuts emissions. ".repeat(15)
            )))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let (config, db, pipeline, store) = setup(&tmp).await;
        let seed = format!("{}/docs/index.html", server.uri());

        let first = cmd_crawl(&config, &db, &pipeline, &seed, CrawlOverrides::default(), "en")
            .await
            .unwrap();
        assert_eq!(first.pages_ingested, 1);
        assert!(first.chunks_created > 0);
        assert_eq!(store.len(), first.chunks_created);

        let second = cmd_crawl(&config, &db, &pipeline, &seed, CrawlOverrides::default(), "en")
            .await
            .unwrap();
        assert_eq!(second.pages_ingested, 0);
        assert_eq!(second.pages_skipped, 1);
        assert_eq!(store.len(), first.chunks_created);
    }

    #[tokio::test]
    async fn test_unsupported_attachment_does_not_abort_run() {
        // .csv routes to the spreadsheet parser, which rejects garbage bytes;
        // the page itself must still be ingested.
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/index.html"))
            .respond_with(html(&format!(
                r#"<a href="/files/data.csv">data</a><p>{}</p>"#,
                "grid interconnection queues are growing. ".repeat(15)
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/data.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe, 0x00]))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let (config, db, pipeline, _store) = setup(&tmp).await;
        let seed = format!("{}/docs/index.html", server.uri());

        let stats = cmd_crawl(&config, &db, &pipeline, &seed, CrawlOverrides::default(), "en")
            .await
            .unwrap();
        assert_eq!(stats.pages_ingested, 1);
        assert_eq!(stats.attachments_staged, 1);
        assert_eq!(stats.attachments_failed, 1);
        assert_eq!(stats.attachments_ingested, 0);
    }

    #[tokio::test]
    async fn test_concurrent_page_ingest_keeps_counts_consistent() {
        // More pages than ingest workers; chunk counts and vector counts must
        // still line up when the drain runs in parallel.
        let server = MockServer::start().await;
        let children: Vec<String> = (0..6)
            .map(|i| format!(r#"<a href="/docs/{}.html">page {}</a>"#, i, i))
            .collect();
        Mock::given(method("GET"))
            .and(path("/docs/index.html"))
            .respond_with(html(&children.join("")))
            .mount(&server)
            .await;
        for i in 0..6 {
            Mock::given(method("GET"))
                .and(path(format!("/docs/{}.html", i)))
                .respond_with(html(&format!(
                    "<p>{}</p>",
                    format!("page {} on transmission planning. ", i).repeat(12)
                )))
                .mount(&server)
                .await;
        }

        let tmp = TempDir::new().unwrap();
        let (config, db, pipeline, store) = setup(&tmp).await;
        let seed = format!("{}/docs/index.html", server.uri());

        let stats = cmd_crawl(&config, &db, &pipeline, &seed, CrawlOverrides::default(), "en")
            .await
            .unwrap();

        assert_eq!(stats.pages_fetched, 7);
        assert_eq!(stats.pages_ingested, 7);
        assert_eq!(stats.pages_failed, 0);
        assert_eq!(store.len(), stats.chunks_created);
    }
}
