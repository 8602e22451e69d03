//! Sources listing command

use crate::error::Result;
use crate::meta::{MetaDb, SourceOverview};
use tracing::info;

/// List every known source with version and chunk counts
pub async fn cmd_list_sources(db: &MetaDb) -> Result<Vec<SourceOverview>> {
    info!("Listing sources");
    db.list_sources().await
}

/// Print the sources list to console
pub fn print_sources(sources: &[SourceOverview]) {
    if sources.is_empty() {
        println!("No sources indexed. Use 'wattson crawl' or 'wattson ingest' to add some.");
        return;
    }

    println!("\nIndexed sources:\n");
    for source in sources {
        println!("• {} [{}] ({})", source.source, source.kind, source.language);
        println!(
            "  Versions: {}, live chunks: {}, last checked: {}",
            source.versions,
            source.live_chunks,
            source.last_checked.format("%Y-%m-%d %H:%M UTC")
        );
        println!();
    }
}
