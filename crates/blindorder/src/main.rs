//! Server binary: config from the environment, SQLite persistence,
//! structured logging.

use std::path::Path;

use blindorder::{BlindorderServerBuilder, ServerConfig};
use blindorder_store::SqliteStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();

    // SQLite creates the file, not its directory.
    if let Some(parent) = Path::new(&config.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = SqliteStore::connect(&config.database_path).await?;

    tracing::info!(
        addr = %config.bind_addr,
        db = %config.database_path,
        "starting blindorder server"
    );

    let server = BlindorderServerBuilder::from_config(&config)
        .build(store)
        .await?;
    server.run().await?;
    Ok(())
}
