use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::models::ListingRecord;
use crate::scrapers::extract;
use crate::scrapers::traits::{PageFetcher, PageKind};

/// What came back from fanning out over the detail URLs. Record order is
/// completion order and carries no meaning.
#[derive(Debug, Default)]
pub struct CollectOutcome {
    pub records: Vec<ListingRecord>,
    pub skipped: usize,
}

/// Fan out over `urls` with at most `concurrency` in-flight fetches
/// (callers pass the fetcher's pool size, so tasks never outnumber
/// sessions). A per-URL failure, whether the fetch gave up or the page
/// had no usable title, is logged and counted as a skip; it never
/// aborts the batch.
///
/// Results are drained from the join set by this caller alone; each
/// record is also teed to `progress` so an interrupt handler can salvage
/// partial output.
pub async fn collect(
    fetcher: Arc<dyn PageFetcher>,
    urls: Vec<String>,
    concurrency: usize,
    progress: Option<mpsc::UnboundedSender<ListingRecord>>,
) -> CollectOutcome {
    let total = urls.len();
    let mut tasks: JoinSet<Option<ListingRecord>> = JoinSet::new();
    let mut outcome = CollectOutcome::default();

    for url in urls {
        while tasks.len() >= concurrency.max(1) {
            if let Some(joined) = tasks.join_next().await {
                absorb(joined, &mut outcome, &progress, total);
            }
        }
        let fetcher = fetcher.clone();
        tasks.spawn(async move { scrape_one(fetcher.as_ref(), &url).await });
    }
    while let Some(joined) = tasks.join_next().await {
        absorb(joined, &mut outcome, &progress, total);
    }

    info!(
        collected = outcome.records.len(),
        skipped = outcome.skipped,
        "detail collection finished"
    );
    outcome
}

async fn scrape_one(fetcher: &dyn PageFetcher, url: &str) -> Option<ListingRecord> {
    let html = match fetcher.fetch(url, PageKind::Detail).await {
        Ok(html) => html,
        Err(err) => {
            warn!(url, %err, "detail fetch failed, skipping URL");
            return None;
        }
    };
    match extract::detail_record(&html, url) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(url, %err, "detail page rejected, skipping URL");
            None
        }
    }
}

fn absorb(
    joined: Result<Option<ListingRecord>, tokio::task::JoinError>,
    outcome: &mut CollectOutcome,
    progress: &Option<mpsc::UnboundedSender<ListingRecord>>,
    total: usize,
) {
    match joined {
        Ok(Some(record)) => {
            if let Some(tx) = progress {
                let _ = tx.send(record.clone());
            }
            outcome.records.push(record);
            let done = outcome.records.len() + outcome.skipped;
            if outcome.records.len() % 10 == 0 {
                info!(done, total, "progress");
            }
        }
        Ok(None) => outcome.skipped += 1,
        Err(err) => {
            warn!(%err, "detail worker panicked, counting as skip");
            outcome.skipped += 1;
        }
    }
}
