pub mod browser;
pub mod collector;
pub mod extract;
pub mod retry;
pub mod traits;
pub mod walker;

pub use browser::BrowserFetcher;
pub use traits::{PageFetcher, PageKind};
