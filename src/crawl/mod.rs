//! Web crawling with robots.txt support and rate limiting
//!
//! This module provides:
//! - Breadth-first crawling from a seed URL, bounded by depth and page count
//! - Same-domain, subpath-restricted link following
//! - Exclusion-keyword URL filtering
//! - Attachment discovery with dedup-before-download and staging
//! - robots.txt respect, per-host and global rate limiting
//! - Bounded fetch retries with exponential backoff

mod rate_limit;
mod robots;
mod staging;

pub use rate_limit::*;
pub use robots::*;
pub use staging::*;

use crate::checksum::{checksum_bytes, checksum_text};
use crate::config::CrawlConfig;
use crate::error::{Error, Result};
use crate::meta::ParsedLookup;
use crate::parse::{parse_html, ExtractedLink};
use reqwest::Client;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// A crawled page
#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub url: String,
    pub content: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub links: Vec<ExtractedLink>,
    pub depth: u32,
}

/// Outcome of one crawl run
#[derive(Debug, Default)]
pub struct CrawlReport {
    /// Pages fetched and parsed, in crawl order
    pub pages: Vec<CrawledPage>,

    /// Attachments staged for the decoupled ingest pass
    pub staged: Vec<StagingRecord>,

    /// URLs dropped by exclusion keywords or robots.txt
    pub filtered_out: u32,

    /// URLs that failed after all retries
    pub fetch_failures: u32,

    /// Attachments skipped because their identity was already parsed
    pub deduped_attachments: u32,
}

/// Per-run crawl state. Owned by one crawl call; no global state.
struct CrawlSession {
    frontier: VecDeque<(String, u32)>,
    visited: HashSet<String>,
    visited_cap: usize,
    report: CrawlReport,
}

impl CrawlSession {
    fn new(seed_url: &str, visited_cap: usize) -> Self {
        let mut frontier = VecDeque::new();
        frontier.push_back((seed_url.to_string(), 0));
        Self {
            frontier,
            visited: HashSet::new(),
            visited_cap,
            report: CrawlReport::default(),
        }
    }

    /// Mark a normalized URL visited. Returns false if it was already seen.
    fn mark_visited(&mut self, normalized: String) -> bool {
        self.visited.insert(normalized)
    }

    fn at_visited_cap(&self) -> bool {
        self.visited.len() >= self.visited_cap
    }
}

/// Web crawler
pub struct Crawler {
    client: Client,
    config: CrawlConfig,
    staging: StagingArea,
    // Both caches key on origin (host:port): robots.txt and pacing are
    // per-server, and two ports on one host are two servers.
    robots_cache: Arc<RwLock<HashMap<String, RobotsRules>>>,
    throttle: FetchThrottle,
}

impl Crawler {
    /// Create a new crawler
    pub fn new(config: CrawlConfig, staging_dir: impl Into<std::path::PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Fetch(format!("Failed to create HTTP client: {}", e)))?;

        let staging = StagingArea::new(staging_dir, config.staging_retention_hours)?;
        let throttle = FetchThrottle::new(config.rate_limit_per_host, config.global_rate_limit);

        Ok(Self {
            client,
            config,
            staging,
            robots_cache: Arc::new(RwLock::new(HashMap::new())),
            throttle,
        })
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Crawl breadth-first from a seed URL. Link following stays on the seed
    /// host, under the seed's directory path. `lookup` answers the
    /// dedup-before-download question for attachments; parsing of staged
    /// files is a separate pass and never blocks the crawl.
    pub async fn crawl(&self, seed_url: &str, lookup: &dyn ParsedLookup) -> Result<CrawlReport> {
        let seed = Url::parse(seed_url)?;
        let seed_host = seed
            .host_str()
            .ok_or_else(|| Error::Fetch("Seed URL has no host".to_string()))?
            .to_string();
        let path_prefix = seed_path_prefix(&seed);

        if path_prefix != "/" {
            info!("Restricting crawl to path prefix: {}", path_prefix);
        }

        let mut session = CrawlSession::new(seed_url, self.config.visited_cap);

        while let Some((url, depth)) = session.frontier.pop_front() {
            if depth > self.config.max_depth {
                continue;
            }
            if session.report.pages.len() as u32 >= self.config.max_pages {
                info!("Reached max pages limit ({})", self.config.max_pages);
                break;
            }
            if session.at_visited_cap() {
                warn!("Visited set reached cap ({}); stopping", self.config.visited_cap);
                break;
            }

            let normalized = normalize_url(&url);
            if !session.mark_visited(normalized) {
                continue;
            }

            if is_excluded_url(&url, &self.config.exclude_keywords) {
                debug!("Filtered out by exclusion keywords: {}", url);
                session.report.filtered_out += 1;
                continue;
            }

            // Only the seed can reach here as an attachment; discovered
            // attachment links are handled inline below, where the referring
            // page's checksum is known.
            if is_attachment_url(&url, &self.config.attachment_extensions) {
                self.handle_attachment(&url, None, lookup, &mut session).await;
                continue;
            }

            match self.fetch_page(&url).await {
                Ok(content) => {
                    let parsed = match parse_html(&content, Some(&url)) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!("Failed to parse {}: {}", url, e);
                            session.report.fetch_failures += 1;
                            continue;
                        }
                    };

                    // Same text-level checksum the ingest pipeline records
                    // for this page; staged attachments carry it as their
                    // discovery origin.
                    let page_checksum = checksum_text(&parsed.full_text());

                    let page = CrawledPage {
                        url: url.clone(),
                        content,
                        title: parsed.title.clone(),
                        description: parsed.description.clone(),
                        links: parsed.links.clone(),
                        depth,
                    };

                    // Enqueue in-scope children; download attachments here,
                    // while the referring page's checksum is in hand.
                    let mut enqueued = 0usize;
                    for link in &parsed.links {
                        if !link.is_internal {
                            continue;
                        }
                        let Ok(link_url) = Url::parse(&link.url) else {
                            continue;
                        };
                        if link_url.host_str() != Some(seed_host.as_str()) {
                            continue;
                        }
                        let is_attachment =
                            is_attachment_url(&link.url, &self.config.attachment_extensions);
                        // Attachments may live outside the path prefix; pages
                        // must stay under it.
                        if !is_attachment && !link_url.path().starts_with(&path_prefix) {
                            debug!("Skipping {} - outside path prefix {}", link.url, path_prefix);
                            continue;
                        }
                        if is_attachment {
                            if depth + 1 > self.config.max_depth {
                                continue;
                            }
                            let link_normalized = normalize_url(&link.url);
                            if session.mark_visited(link_normalized) {
                                if is_excluded_url(&link.url, &self.config.exclude_keywords) {
                                    session.report.filtered_out += 1;
                                } else {
                                    self.handle_attachment(
                                        &link.url,
                                        Some(page_checksum.clone()),
                                        lookup,
                                        &mut session,
                                    )
                                    .await;
                                }
                            }
                            continue;
                        }
                        let link_normalized = normalize_url(&link.url);
                        if !session.visited.contains(&link_normalized) {
                            session.frontier.push_back((link.url.clone(), depth + 1));
                            enqueued += 1;
                        }
                    }

                    debug!(url = %page.url, depth, enqueued, "Fetched page");
                    session.report.pages.push(page);
                }
                Err(Error::RobotsDisallowed(_)) => {
                    session.report.filtered_out += 1;
                }
                Err(e) => {
                    warn!("Failed to fetch {}: {}", url, e);
                    session.report.fetch_failures += 1;
                }
            }
        }

        info!(
            pages = session.report.pages.len(),
            staged = session.report.staged.len(),
            failures = session.report.fetch_failures,
            "Crawl finished for {}",
            seed_url
        );
        Ok(session.report)
    }

    /// Download and stage one attachment, skipping work the index already
    /// holds: identity-level dedup before the download, checksum-level
    /// discard after it.
    async fn handle_attachment(
        &self,
        url: &str,
        origin_checksum: Option<String>,
        lookup: &dyn ParsedLookup,
        session: &mut CrawlSession,
    ) {
        match lookup.is_parsed(url).await {
            Ok(true) => {
                debug!("Attachment already parsed, skipping download: {}", url);
                session.report.deduped_attachments += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Dedup lookup failed for {}: {}", url, e);
            }
        }

        let bytes = match self.fetch_bytes(url).await {
            Ok(b) => b,
            Err(Error::RobotsDisallowed(_)) => {
                session.report.filtered_out += 1;
                return;
            }
            Err(e) => {
                warn!("Failed to download attachment {}: {}", url, e);
                session.report.fetch_failures += 1;
                return;
            }
        };

        let checksum = checksum_bytes(&bytes);
        match lookup.is_version_parsed(url, &checksum).await {
            Ok(true) => {
                debug!("Attachment content unchanged, discarding: {}", url);
                session.report.deduped_attachments += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => warn!("Version lookup failed for {}: {}", url, e),
        }

        match self.staging.stage(url, &bytes, origin_checksum) {
            Ok(record) => session.report.staged.push(record),
            Err(e) => warn!("Failed to stage {}: {}", url, e),
        }
    }

    /// Fetch a page body as text, with robots/rate-limit gates and retries
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self.fetch_with_retry(url).await?;
        Ok(response.text().await?)
    }

    /// Fetch raw bytes (attachments)
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.fetch_with_retry(url).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let parsed_url = Url::parse(url)?;
        let origin = origin_key(&parsed_url)
            .ok_or_else(|| Error::Fetch(format!("URL has no host: {}", url)))?;

        if self.config.respect_robots_txt {
            self.ensure_robots_loaded(&origin, &parsed_url).await?;
            let cache = self.robots_cache.read().await;
            if let Some(rules) = cache.get(&origin) {
                if !rules.is_allowed(parsed_url.path(), &self.config.user_agent) {
                    return Err(Error::RobotsDisallowed(url.to_string()));
                }
            }
        }

        let mut last_error = Error::Fetch(format!("no attempts made for {}", url));
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(250 * (1 << (attempt - 1).min(6)));
                debug!("Retry {} for {} after {:?}", attempt, url, backoff);
                tokio::time::sleep(backoff).await;
            }

            self.throttle.acquire(&origin).await;

            debug!("Fetching: {}", url);
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    last_error = Error::Fetch(format!("HTTP {}: {}", status, url));
                    // Client errors won't improve with retries
                    if status.is_client_error() {
                        return Err(last_error);
                    }
                }
                Err(e) => {
                    last_error = Error::Fetch(format!("{}: {}", url, e));
                }
            }
        }

        Err(last_error)
    }

    async fn ensure_robots_loaded(&self, origin: &str, url: &Url) -> Result<()> {
        {
            let cache = self.robots_cache.read().await;
            if cache.contains_key(origin) {
                return Ok(());
            }
        }

        // Joining keeps the scheme, host and port of the request URL
        let robots_url = url.join("/robots.txt")?;
        debug!("Fetching robots.txt from {}", robots_url);

        let rules = match self.client.get(robots_url.as_str()).send().await {
            Ok(response) if response.status().is_success() => {
                let text = response.text().await.unwrap_or_default();
                RobotsRules::parse(&text)
            }
            // No robots.txt or unreachable - allow all
            _ => RobotsRules::allow_all(),
        };

        if let Some(delay) = rules.crawl_delay(&self.config.user_agent) {
            self.throttle.set_crawl_delay(origin, delay).await;
        }

        let mut cache = self.robots_cache.write().await;
        cache.insert(origin.to_string(), rules);
        Ok(())
    }
}

/// Cache key for per-server state: host plus explicit port when present
fn origin_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host.to_string()),
    }
}

/// Normalize a URL for visited-set deduplication: drop the fragment and any
/// trailing slash.
pub fn normalize_url(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        let mut normalized = parsed.clone();
        normalized.set_fragment(None);

        let path = parsed.path().trim_end_matches('/');
        if path.is_empty() {
            normalized.set_path("/");
        } else {
            normalized.set_path(path);
        }

        normalized.to_string()
    } else {
        url.to_string()
    }
}

/// Case-insensitive path-substring exclusion check
pub fn is_excluded_url(url: &str, keywords: &[String]) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());

    keywords
        .iter()
        .any(|keyword| path.contains(&keyword.to_lowercase()))
}

/// Check if a URL points at a downloadable attachment
pub fn is_attachment_url(url: &str, extensions: &[String]) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());

    Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            extensions.iter().any(|allowed| allowed.to_lowercase() == ext)
        })
        .unwrap_or(false)
}

/// Directory prefix a crawl is confined to, derived from the seed URL path
fn seed_path_prefix(seed: &Url) -> String {
    let seed_path = seed.path();
    if seed_path.ends_with('/') {
        seed_path.to_string()
    } else {
        match seed_path.rfind('/') {
            Some(idx) => seed_path[..=idx].to_string(),
            None => "/".to_string(),
        }
    }
}
