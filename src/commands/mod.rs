//! CLI command implementations

pub mod ask;
pub mod crawl;
pub mod ingest;
pub mod init;
pub mod sources;
pub mod status;

pub use ask::*;
pub use crawl::*;
pub use ingest::*;
pub use init::*;
pub use sources::*;
pub use status::*;
