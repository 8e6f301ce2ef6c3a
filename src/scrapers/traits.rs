use async_trait::async_trait;

use crate::error::FetchError;

/// What kind of page a fetch expects, which decides the readiness signal
/// the fetcher waits for before declaring the page rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// A paginated search page linking to many listings.
    Listing,
    /// A page describing one specific listing.
    Detail,
}

impl PageKind {
    /// Tag whose presence signals the page has rendered enough to scrape.
    pub fn ready_tag(self) -> &'static str {
        match self {
            PageKind::Listing => "a",
            PageKind::Detail => "h1",
        }
    }
}

/// Source of rendered page content. The walker and the detail collector
/// both go through this seam, so tests can swap in canned fixtures.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Navigate to `url` and return the fully rendered page content.
    async fn fetch(&self, url: &str, kind: PageKind) -> Result<String, FetchError>;
}
