use std::path::PathBuf;

use thiserror::Error;

/// Failure while rendering a page in the browser. Retried by the fetcher
/// up to its retry budget before surfacing.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page load timed out")]
    Timeout,

    #[error("browser session unavailable: {0}")]
    Session(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Failure to turn page content into a record. A single missing optional
/// field is never an error; only the mandatory title rejects the page.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("mandatory title missing")]
    MissingTitle,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("table at {0} has no recognizable header")]
    MalformedHeader(PathBuf),
}

/// Run-aborting conditions. Per-page and per-URL failures are contained
/// and logged; only these end the run with no file written.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no detail URLs discovered across the configured page range")]
    NoListingUrls,

    #[error("no records survived detail collection")]
    NoRecords,
}
