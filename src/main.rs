mod config;
mod error;
mod models;
mod scrapers;
mod storage;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::ScrapeConfig;
use error::RunError;
use models::ListingRecord;
use scrapers::{collector, walker, BrowserFetcher, PageFetcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ScrapeConfig::parse();
    info!(
        city = %config.city,
        pages = config.pages,
        workers = config.workers,
        output = %config.output.display(),
        "starting scrape run"
    );

    let fetcher = Arc::new(BrowserFetcher::launch(&config)?);
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ListingRecord>();

    let outcome = tokio::select! {
        result = run(fetcher.clone(), &config, progress_tx) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received, saving what we have");
            let mut salvaged = Vec::new();
            while let Ok(record) = progress_rx.try_recv() {
                salvaged.push(record);
            }
            if salvaged.is_empty() {
                warn!("nothing scraped yet, nothing to save");
            } else {
                let report = storage::merge(&salvaged, &config.output)?;
                info!(
                    added = report.added,
                    total = report.total,
                    "partial results merged"
                );
            }
            fetcher.close();
            return Ok(());
        }
    };

    fetcher.close();

    let report = outcome?;
    info!(
        added = report.added,
        total = report.total,
        "run complete: {} new records merged into table of size {}",
        report.added,
        report.total
    );
    Ok(())
}

/// Walk listing pages, collect every discovered detail page, merge the
/// batch into the on-disk table.
async fn run(
    fetcher: Arc<BrowserFetcher>,
    config: &ScrapeConfig,
    progress: mpsc::UnboundedSender<ListingRecord>,
) -> anyhow::Result<storage::MergeReport> {
    let fetcher: Arc<dyn PageFetcher> = fetcher;

    let urls = walker::walk(fetcher.clone(), config).await;
    if urls.is_empty() {
        return Err(RunError::NoListingUrls.into());
    }

    let outcome = collector::collect(fetcher, urls, config.workers, Some(progress)).await;
    if outcome.records.is_empty() {
        return Err(RunError::NoRecords.into());
    }
    if outcome.skipped > 0 {
        warn!(skipped = outcome.skipped, "some detail pages were skipped");
    }

    Ok(storage::merge(&outcome.records, &config.output)?)
}
