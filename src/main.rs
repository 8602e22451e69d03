//! wattson CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wattson::{
    answer::AnswerChain,
    commands::{
        cmd_ask, cmd_crawl, cmd_ingest_file, cmd_init, cmd_list_sources, cmd_status,
        print_answer, print_crawl_stats, print_file_ingest_stats, print_init_summary,
        print_sources, print_status, CrawlOverrides,
    },
    config::Config,
    embed::HttpEmbedder,
    error::Result,
    ingest::IngestPipeline,
    llm::HttpGenerator,
    meta::MetaDb,
    store::QdrantStore,
};

#[derive(Parser)]
#[command(name = "wattson")]
#[command(version, about = "Clean-energy document pipeline and grounded Q&A", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and metadata database
    Init {
        /// Data directory (defaults to the platform data dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Crawl a site and ingest its pages and attachments
    Crawl {
        /// Seed URL; crawling stays on this host, under this path
        url: String,

        /// Maximum crawl depth
        #[arg(long)]
        max_depth: Option<u32>,

        /// Maximum pages to fetch
        #[arg(long)]
        max_pages: Option<u32>,

        /// Re-check cadence recorded for crawled pages, in days
        #[arg(long)]
        refresh_days: Option<i64>,

        /// Content language tag
        #[arg(long, default_value = "en")]
        language: String,
    },

    /// Ingest a local file (pdf, xlsx, xls, csv, ods, html)
    Ingest {
        /// Path to the file
        file: PathBuf,

        /// Content language tag
        #[arg(long, default_value = "en")]
        language: String,
    },

    /// Ask a question against the index
    Ask {
        /// The question
        question: String,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// List indexed sources
    Sources,

    /// Show system status
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // init needs no existing config or backends
    if let Commands::Init { data_dir, force } = cli.command {
        let config = cmd_init(data_dir, force).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            print_init_summary(&config);
        }
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    let db = MetaDb::connect(&config).await?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Crawl {
            url,
            max_depth,
            max_pages,
            refresh_days,
            language,
        } => {
            let store = connect_store(&config).await?;
            let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);
            let pipeline = Arc::new(IngestPipeline::new(db.clone(), store, embedder, &config));

            let overrides = CrawlOverrides {
                max_depth,
                max_pages,
                refresh_frequency_days: refresh_days,
            };
            let stats = cmd_crawl(&config, &db, &pipeline, &url, overrides, &language).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_crawl_stats(&stats);
            }
        }

        Commands::Ingest { file, language } => {
            let store = connect_store(&config).await?;
            let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);
            let pipeline = IngestPipeline::new(db.clone(), store, embedder, &config);

            let stats = cmd_ingest_file(&pipeline, &file, &language).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_file_ingest_stats(&stats);
            }
        }

        Commands::Ask { question, top_k } => {
            if let Some(k) = top_k {
                config.query.top_k = k;
            }
            let store = connect_store(&config).await?;
            let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);
            let generator = Arc::new(HttpGenerator::new(&config.llm)?);
            let chain = AnswerChain::new(store, embedder, generator, &config);

            let answer = cmd_ask(&chain, &[], &question).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }

        Commands::Sources => {
            let sources = cmd_list_sources(&db).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else {
                print_sources(&sources);
            }
        }

        Commands::Status => {
            let store = QdrantStore::connect(&config).await?;
            let status = cmd_status(&config, &db, &store).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

async fn connect_store(config: &Config) -> Result<Arc<QdrantStore>> {
    let store = QdrantStore::connect(config).await?;
    store.ensure_collection().await?;
    Ok(Arc::new(store))
}
