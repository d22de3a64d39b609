use std::env;

use anyhow::{bail, Context};

use sitechat::config::AppConfig;
use sitechat::ingest;
use sitechat::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    logging::init(&config.log_dir);

    let url = match env::args().nth(1).or_else(|| env::var("SOURCE_URL").ok()) {
        Some(url) => url,
        None => bail!("usage: ingest <url> (or set SOURCE_URL)"),
    };

    let report = ingest::ingest_url(&config, &url).await?;
    tracing::info!(
        "ingested {} chunks from {} (index now holds {} chunks)",
        report.chunk_count,
        report.source,
        report.index_size
    );

    Ok(())
}
