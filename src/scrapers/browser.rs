use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info, warn};

use crate::config::ScrapeConfig;
use crate::error::FetchError;
use crate::scrapers::retry::{with_retry, RetryPolicy};
use crate::scrapers::traits::{PageFetcher, PageKind};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const SCROLL_PAUSE: Duration = Duration::from_millis(300);
const SCROLL_STEP_PX: u32 = 800;

/// Fetches rendered pages through a bounded pool of headless Chrome tabs.
///
/// Tabs are created lazily up to the configured worker count, borrowed
/// around each fetch and returned afterward. Failed loads are retried
/// under the configured policy; a load that exhausts its budget leaves a
/// dump in the debug directory for offline diagnosis.
pub struct BrowserFetcher {
    browser: Browser,
    idle: Mutex<Vec<Arc<Tab>>>,
    live: AtomicUsize,
    capacity: usize,
    retry: RetryPolicy,
    ready_timeout: Duration,
    scroll_steps: u32,
    debug_dir: PathBuf,
}

impl BrowserFetcher {
    /// Launch Chrome with the anti-automation flags every scrape needs
    /// (no images, fixed window, custom user agent).
    pub fn launch(config: &ScrapeConfig) -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(!config.headed)
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(Duration::from_secs(600))
            .args(vec![
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--blink-settings=imagesEnabled=false"),
                OsStr::new("--disable-extensions"),
            ])
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self {
            browser,
            idle: Mutex::new(Vec::new()),
            live: AtomicUsize::new(0),
            capacity: config.workers.max(1),
            retry: config.retry_policy(),
            ready_timeout: config.ready_timeout(),
            scroll_steps: config.scroll_steps,
            debug_dir: config.debug_dir.clone(),
        })
    }

    /// Pop an idle tab, or open a fresh one while under the cap. Waits
    /// when every session is busy; callers never exceed the pool bound.
    async fn borrow_tab(&self) -> Result<Arc<Tab>, FetchError> {
        loop {
            if let Some(tab) = self.idle.lock().unwrap().pop() {
                return Ok(tab);
            }
            let live = self.live.load(Ordering::SeqCst);
            if live < self.capacity
                && self
                    .live
                    .compare_exchange(live, live + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                return self.open_tab().map_err(|err| {
                    self.live.fetch_sub(1, Ordering::SeqCst);
                    err
                });
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn open_tab(&self) -> Result<Arc<Tab>, FetchError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| FetchError::Session(e.to_string()))?;
        if let Err(e) = tab.set_user_agent(USER_AGENT, None, None) {
            debug!(error = %e, "could not override user agent");
        }
        Ok(tab)
    }

    fn return_tab(&self, tab: Arc<Tab>) {
        self.idle.lock().unwrap().push(tab);
    }

    /// Close every pooled session. Called on normal completion and on
    /// interrupt, after results have been saved.
    pub fn close(&self) {
        let mut idle = self.idle.lock().unwrap();
        for tab in idle.drain(..) {
            if let Err(e) = tab.close(true) {
                debug!(error = %e, "tab close failed");
            }
        }
        self.live.store(0, Ordering::SeqCst);
        info!("Browser sessions closed");
    }

    fn dump_failure(&self, tab: &Tab, url: &str, err: &FetchError) {
        if let Err(e) = self.write_dump(tab, url, err) {
            warn!(url, error = %e, "failed to write debug dump");
        }
    }

    /// Timestamped page dump: whatever HTML the tab still holds, a
    /// screenshot when the session allows one, and an error sidecar.
    fn write_dump(&self, tab: &Tab, url: &str, err: &FetchError) -> Result<()> {
        fs::create_dir_all(&self.debug_dir)?;
        let stem = format!(
            "{}_{}",
            sanitize_for_filename(url),
            Local::now().format("%Y%m%d_%H%M%S")
        );

        if let Ok(html) = tab.evaluate("document.documentElement.outerHTML", false) {
            if let Some(content) = html.value.as_ref().and_then(|v| v.as_str()) {
                fs::write(self.debug_dir.join(format!("{stem}.html")), content)?;
            }
        }
        if let Ok(png) =
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
        {
            fs::write(self.debug_dir.join(format!("{stem}.png")), png)?;
        }
        let meta = serde_json::json!({
            "url": url,
            "error": err.to_string(),
            "captured_at": Local::now().to_rfc3339(),
        });
        fs::write(
            self.debug_dir.join(format!("{stem}.json")),
            serde_json::to_vec_pretty(&meta)?,
        )?;
        info!(url, dir = %self.debug_dir.display(), "saved failure dump");
        Ok(())
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, kind: PageKind) -> Result<String, FetchError> {
        let tab = self.borrow_tab().await?;
        let result = with_retry(&self.retry, tokio::time::sleep, |_attempt| {
            let tab = tab.clone();
            let url = url.to_string();
            let ready_timeout = self.ready_timeout;
            let scroll_steps = self.scroll_steps;
            async move {
                tokio::task::spawn_blocking(move || {
                    render_page(&tab, &url, kind.ready_tag(), ready_timeout, scroll_steps)
                })
                .await
                .map_err(|e| FetchError::Session(e.to_string()))?
            }
        })
        .await;

        if let Err(err) = &result {
            self.dump_failure(&tab, url, err);
        }
        self.return_tab(tab);
        result
    }
}

/// Drive one page load to rendered content. Blocking; runs on the
/// blocking pool. The readiness wait is advisory: if the tag never
/// shows up within the timeout we scrape whatever has rendered.
fn render_page(
    tab: &Tab,
    url: &str,
    ready_tag: &str,
    ready_timeout: Duration,
    scroll_steps: u32,
) -> Result<String, FetchError> {
    tab.navigate_to(url).map_err(classify)?;
    tab.wait_until_navigated().map_err(classify)?;

    if tab
        .wait_for_element_with_custom_timeout(ready_tag, ready_timeout)
        .is_err()
    {
        debug!(url, ready_tag, "readiness wait elapsed, proceeding anyway");
    }

    // Lazy-loaded cards only render once the viewport has moved.
    for _ in 0..scroll_steps {
        let _ = tab.evaluate(&format!("window.scrollBy(0, {SCROLL_STEP_PX});"), false);
        thread::sleep(SCROLL_PAUSE);
    }

    let html = tab
        .evaluate("document.documentElement.outerHTML", false)
        .map_err(|e| FetchError::Session(e.to_string()))?;
    let content = html
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    if content.is_empty() {
        return Err(FetchError::Navigation("rendered page was empty".to_string()));
    }
    Ok(content)
}

fn classify(err: anyhow::Error) -> FetchError {
    let text = err.to_string().to_lowercase();
    if text.contains("timeout") || text.contains("timed out") {
        FetchError::Timeout
    } else {
        FetchError::Navigation(err.to_string())
    }
}

fn sanitize_for_filename(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(60)
        .collect()
}
