//! Init command implementation

use crate::config::{Config, PathsConfig};
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use std::path::PathBuf;
use tracing::info;

/// Initialize the data directory, write the default config, and create the
/// metadata database schema.
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    let mut config = Config::default();
    if let Some(base) = base_dir {
        config.paths = PathsConfig {
            db_file: base.join("wattson.db"),
            staging_dir: base.join("staging"),
            config_file: base.join("config.toml"),
            base_dir: base,
        };
    }

    if config.paths.config_file.exists() && !force {
        return Err(Error::Config(format!(
            "Config file already exists at {}. Use --force to overwrite.",
            config.paths.config_file.display()
        )));
    }

    std::fs::create_dir_all(&config.paths.base_dir)?;
    std::fs::create_dir_all(&config.paths.staging_dir)?;
    config.save()?;

    // Connecting creates the schema
    MetaDb::new(&config.paths.db_file).await?;

    info!("Initialized wattson at {:?}", config.paths.base_dir);
    Ok(config)
}

/// Print the post-init summary
pub fn print_init_summary(config: &Config) {
    println!("✓ wattson initialized");
    println!("  Config:   {}", config.paths.config_file.display());
    println!("  Database: {}", config.paths.db_file.display());
    println!("  Staging:  {}", config.paths.staging_dir.display());
    println!("\nNext steps:");
    println!("  1. Edit the config file to set crawl bounds and backend URLs");
    println!("  2. Start Qdrant: docker run -p 6333:6333 -p 6334:6334 qdrant/qdrant");
    println!("  3. Crawl a site: wattson crawl https://example.org/reports/");
}
