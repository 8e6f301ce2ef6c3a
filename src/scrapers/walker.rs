use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::ScrapeConfig;
use crate::scrapers::extract;
use crate::scrapers::traits::{PageFetcher, PageKind};

/// Walk the configured range of listing pages and collect candidate
/// detail-page URLs, deduplicated first-seen-wins across pages.
///
/// Pages are independent, so they are fetched concurrently up to the
/// worker bound; a failed page is logged and skipped. Output ordering
/// carries no meaning.
pub async fn walk(fetcher: Arc<dyn PageFetcher>, config: &ScrapeConfig) -> Vec<String> {
    let mut tasks: JoinSet<(u32, Vec<String>)> = JoinSet::new();
    let base = config.base_url.clone();
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for page in config.page_range() {
        while tasks.len() >= config.workers.max(1) {
            if let Some(joined) = tasks.join_next().await {
                drain_page(joined, &mut urls, &mut seen);
            }
        }
        let fetcher = fetcher.clone();
        let url = config.listing_page_url(page);
        let base = base.clone();
        tasks.spawn(async move {
            match fetcher.fetch(&url, PageKind::Listing).await {
                Ok(html) => {
                    let urls = extract::listing_urls(&html, &base);
                    info!(page, found = urls.len(), "listing page walked");
                    (page, urls)
                }
                Err(err) => {
                    warn!(page, %err, "listing page failed, skipping");
                    (page, Vec::new())
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        drain_page(joined, &mut urls, &mut seen);
    }
    info!(total = urls.len(), "detail URLs discovered");
    urls
}

fn drain_page(
    joined: Result<(u32, Vec<String>), tokio::task::JoinError>,
    urls: &mut Vec<String>,
    seen: &mut HashSet<String>,
) {
    match joined {
        Ok((_, page_urls)) => {
            for url in page_urls {
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        }
        Err(err) => warn!(%err, "listing walker task failed"),
    }
}
