use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::scrapers::retry::RetryPolicy;

/// Configuration for one scrape run.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rent-scout",
    version,
    about = "Concurrent rental-listing scraper with resumable CSV output"
)]
pub struct ScrapeConfig {
    /// Site root the listing and detail URLs hang off.
    #[arg(long, default_value = "https://www.99acres.com")]
    pub base_url: String,

    /// Transaction type segment of the search path.
    #[arg(long, default_value = "rent")]
    pub transaction: String,

    /// City segment of the search path.
    #[arg(long, default_value = "delhi")]
    pub city: String,

    /// Query filters appended to every listing page URL.
    #[arg(
        long,
        default_value = "city=1075722&preference=R&area_unit=1&res_com=R&isPreLeased=N"
    )]
    pub filters: String,

    /// First listing page to walk.
    #[arg(long, default_value_t = 1)]
    pub start_page: u32,

    /// Number of listing pages to walk.
    #[arg(long, default_value_t = 5)]
    pub pages: u32,

    /// Parallel workers; also the browser session pool size.
    #[arg(long, default_value_t = 3)]
    pub workers: usize,

    /// Attempts per page load before giving up.
    #[arg(long, default_value_t = 2)]
    pub retries: u32,

    /// Base backoff between attempts, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub retry_delay_ms: u64,

    /// Seconds to wait for the readiness tag before proceeding anyway.
    #[arg(long, default_value_t = 8)]
    pub ready_timeout_secs: u64,

    /// Scroll steps per page to trigger lazy-loaded content.
    #[arg(long, default_value_t = 3)]
    pub scroll_steps: u32,

    /// Path of the persisted CSV table.
    #[arg(long, default_value = "data/listings.csv")]
    pub output: PathBuf,

    /// Directory for failure dumps (HTML, screenshot, metadata).
    #[arg(long, default_value = "debug_pages")]
    pub debug_dir: PathBuf,

    /// Run Chrome with a visible window.
    #[arg(long, default_value_t = false)]
    pub headed: bool,
}

impl ScrapeConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retries.max(1),
            base_delay: Duration::from_millis(self.retry_delay_ms),
            jitter: Duration::from_millis(1500),
        }
    }

    /// Canonical listing URL for one page of search results. Page 1
    /// carries no page parameter; later pages do.
    pub fn listing_page_url(&self, page: u32) -> String {
        let mut url = format!(
            "{}/search/property/{}/{}?{}",
            self.base_url.trim_end_matches('/'),
            self.transaction,
            self.city,
            self.filters
        );
        if page > 1 {
            url.push_str(&format!("&page={page}"));
        }
        url
    }

    pub fn page_range(&self) -> Range<u32> {
        self.start_page..self.start_page.saturating_add(self.pages)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ScrapeConfig {
        ScrapeConfig::parse_from(["rent-scout"])
    }

    #[test]
    fn first_page_has_no_page_parameter() {
        let cfg = config();
        let url = cfg.listing_page_url(1);
        assert!(url.starts_with("https://www.99acres.com/search/property/rent/delhi?"));
        assert!(!url.contains("page="));
    }

    #[test]
    fn later_pages_carry_the_page_parameter() {
        let cfg = config();
        assert!(cfg.listing_page_url(7).ends_with("&page=7"));
    }

    #[test]
    fn page_range_starts_where_configured() {
        let mut cfg = config();
        cfg.start_page = 36;
        cfg.pages = 20;
        let range: Vec<u32> = cfg.page_range().collect();
        assert_eq!(range.first(), Some(&36));
        assert_eq!(range.len(), 20);
    }
}
