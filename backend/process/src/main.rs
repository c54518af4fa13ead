use anyhow::Context;
use clap::Parser;
use storefront::database::Database;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Seed the storefront device catalog.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON array of devices, a file path or with `--remote` a URL
    catalog: String,

    /// Fetch the catalog over HTTP
    #[arg(long)]
    remote: bool,

    /// Drop every stored device before seeding
    #[arg(long)]
    replace: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let entries = if args.remote {
        shop::get_catalog_remote(&args.catalog).await
    } else {
        shop::get_catalog(&args.catalog)
    }
    .with_context(|| format!("Failed to load catalog {}", args.catalog))?;
    info!("Loaded {} catalog entries", entries.len());

    let redis_url = std::env::var("REDIS_URL").context("REDIS_URL must be set to seed the catalog")?;
    let database = Database::connect(&redis_url)
        .await
        .context("Failed to connect to Redis")?;

    let report = process::seed_catalog(&database, entries, args.replace).await?;

    info!("Inserted: {}", report.inserted);
    info!("Duplicates skipped: {}", report.duplicates);
    for (index, reason) in &report.rejected {
        warn!("Entry {index} rejected: {reason}");
    }

    Ok(())
}
