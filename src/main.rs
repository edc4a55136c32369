use anyhow::Context;
use clap::Parser;
use rental_scout::models::{Bedrooms, ExtractionRequest};
use rental_scout::run_log::{InMemoryLogStore, LogSink};
use rental_scout::scrapers::{ExtractionWorkflow, StagehandLauncher};
use rental_scout::session_pool::{InMemorySessionStore, SessionPool};
use rental_scout::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Search apartments.com through a remote browser and print matching rentals
#[derive(Debug, Parser)]
#[command(name = "rental-scout", version)]
struct Cli {
    /// City or neighborhood, e.g. "Jersey City, NJ"
    #[arg(short, long)]
    query: Option<String>,

    /// Maximum monthly rent in USD
    #[arg(long)]
    max_price: Option<u32>,

    /// Bedroom count, or "studio"
    #[arg(short, long)]
    bedrooms: Option<Bedrooms>,

    /// Only show pet-friendly listings
    #[arg(long)]
    pets: bool,

    /// Number of listings to return
    #[arg(short, long)]
    limit: Option<u32>,

    /// Conversation thread to persist progress logs under
    #[arg(long)]
    thread: Option<String>,

    /// Where to write the listings as JSON
    #[arg(short, long, default_value = "scraped_listings.json")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    info!("🏠 Rental Scout - apartments.com extraction");

    let log_store = Arc::new(InMemoryLogStore::new());
    let workflow = ExtractionWorkflow::new(
        config.clone(),
        Arc::new(StagehandLauncher::new(config)),
        SessionPool::new(Arc::new(InMemorySessionStore::new())),
    )
    .with_log_sink(log_store.clone());

    let request = ExtractionRequest {
        query: cli.query,
        max_price: cli.max_price,
        bedrooms: cli.bedrooms,
        pets: cli.pets.then_some(true),
        limit: cli.limit,
        thread_id: cli.thread.clone(),
        ..Default::default()
    };

    let result = workflow
        .run(&request)
        .await
        .context("Listing extraction failed")?;

    if !result.live_view_url.is_empty() {
        info!("Live view: {}", result.live_view_url);
    }
    info!(
        "✅ Extracted {} listings, {} matched, {} rejected",
        result.extracted_count, result.filtered_count, result.rejected_count
    );

    for (i, listing) in result.listings.iter().enumerate() {
        println!("{}. {} ({})", i + 1, listing.title, listing.price_raw);
        if let Some(address) = &listing.address {
            println!("   {}", address);
        }
        match listing.beds {
            Some(0) => println!("   Studio"),
            Some(beds) => println!("   {} bed", beds),
            None => {}
        }
        if let Some(image) = &listing.image_url {
            println!("   Image: {}", image);
        }
        println!();
    }

    if let Some(thread) = &cli.thread {
        let entries = log_store
            .list_logs_by_thread(thread)
            .await
            .context("Failed to read run logs")?;
        info!("📝 {} log entries stored for thread {}", entries.len(), thread);
    }

    let json = serde_json::to_string_pretty(&result)?;
    tokio::fs::write(&cli.output, json)
        .await
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;
    info!("💾 Saved results to {}", cli.output.display());

    Ok(())
}
