//! Headless browser lifecycle.

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{FilerError, Result};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One live browser with its CDP event pump and a blank page.
///
/// Teardown happens exactly once: either through [`BrowserSession::shutdown`]
/// on a normal path, or through `Drop` when the owning future is cancelled
/// (for example by the worker's wall-clock timeout).
pub struct BrowserSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    page: Page,
}

impl BrowserSession {
    pub fn page(&self) -> Page {
        self.page.clone()
    }

    /// Close the browser and stop the event pump. Close failures are logged,
    /// never propagated; an error here must not mask the run's real outcome.
    pub async fn shutdown(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("browser close failed: {e}");
            }
        }
        if let Some(handle) = self.handler.take() {
            handle.abort();
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let (Some(mut browser), Some(handle)) = (self.browser.take(), self.handler.take()) {
            warn!("browser session dropped without shutdown, closing in background");
            tokio::spawn(async move {
                let _ = browser.close().await;
                handle.abort();
            });
        }
    }
}

/// Launch a fresh headless browser with a blank page.
///
/// Each filing job gets its own browser so no cookies or portal state leak
/// between jobs.
pub async fn launch_headless() -> Result<BrowserSession> {
    debug!("launching headless browser");

    let user_agent_arg = format!("--user-agent={USER_AGENT}");
    let config = BrowserConfig::builder()
        .new_headless_mode()
        .window_size(1280, 800)
        .args(vec![
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
            user_agent_arg.as_str(),
        ])
        .build()
        .map_err(FilerError::Browser)?;

    let (browser, mut handler) = Browser::launch(config).await?;

    // Drive browser events in the background for the life of the session.
    let handle = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // Brief pause so the browser state settles before the first command.
    sleep(tokio::time::Duration::from_millis(300)).await;

    let page = browser.new_page("about:blank").await?;
    debug!("headless browser ready");

    Ok(BrowserSession {
        browser: Some(browser),
        handler: Some(handle),
        page,
    })
}
