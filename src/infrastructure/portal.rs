//! Portal interaction capability.
//!
//! The navigator's page-state heuristics live on top of this trait so the
//! underlying browser driver is swappable and the whole flow is testable
//! against a fake. `ChromiumPage` is the only owner of the live `Page`; it
//! exposes capabilities, not the page itself.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use tokio::time::{sleep, timeout, Instant};

use crate::error::{FilerError, Result};

/// How often element polls re-check the DOM.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Browser-page capabilities the filing flow needs.
///
/// Every wait is bounded; the remote page is not under our control and must
/// never be able to wedge a worker.
#[async_trait]
pub trait PortalPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    /// Wait until `selector` is visible, erroring after `timeout`.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn is_visible(&self, selector: &str) -> Result<bool>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Set a `<select>` value directly; fallback for typeahead-hostile fields.
    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;

    /// Visible text of the first match, `None` when the element is absent.
    async fn inner_text(&self, selector: &str) -> Result<Option<String>>;

    /// Wait for a navigation; `Ok(false)` on timeout, which callers may
    /// tolerate when the page completed a synchronous transition instead.
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<bool>;

    /// Fixed settle delay for pages that re-render after a click.
    async fn settle(&self, delay: Duration);

    async fn screenshot(&self, path: &Path, full_page: bool) -> Result<()>;
}

/// Real portal page backed by a chromiumoxide `Page`.
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval<T: DeserializeOwned>(&self, js: String) -> Result<T> {
        let value = self
            .page
            .evaluate(js)
            .await?
            .into_value()
            .map_err(|e| FilerError::Browser(format!("evaluate result: {e}")))?;
        Ok(value)
    }

    /// Quote a CSS selector or value as a JS string literal.
    fn js_str(raw: &str) -> Result<String> {
        Ok(serde_json::to_string(raw)?)
    }
}

#[async_trait]
impl PortalPage for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, wait: Duration) -> Result<()> {
        let deadline = Instant::now() + wait;
        loop {
            if self.is_visible(selector).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(FilerError::Timeout(wait, selector.to_string()));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let sel = Self::js_str(selector)?;
        self.eval(format!(
            "(() => {{ const el = document.querySelector({sel}); \
             return !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length); }})()"
        ))
        .await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let sel = Self::js_str(selector)?;
        let val = Self::js_str(value)?;
        // A strict <select> silently rejects unknown values, so the write is
        // verified; a failed write must error for the caller's fallback.
        let outcome: String = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({sel}); if (!el) return 'missing'; \
                 el.value = {val}; \
                 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                 el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                 return el.value === {val} ? 'ok' : 'rejected'; }})()"
            ))
            .await?;
        match outcome.as_str() {
            "ok" => Ok(()),
            "missing" => Err(FilerError::Browser(format!("no element to fill: {selector}"))),
            _ => Err(FilerError::Browser(format!(
                "element rejected value {value:?}: {selector}"
            ))),
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page.find_element(selector).await?.click().await?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let sel = Self::js_str(selector)?;
        let val = Self::js_str(value)?;
        let ok: bool = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
                 el.value = {val}; \
                 el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                 return el.value === {val}; }})()"
            ))
            .await?;
        if !ok {
            return Err(FilerError::Browser(format!(
                "could not select {value:?} on {selector}"
            )));
        }
        Ok(())
    }

    async fn inner_text(&self, selector: &str) -> Result<Option<String>> {
        let sel = Self::js_str(selector)?;
        self.eval(format!(
            "(() => {{ const el = document.querySelector({sel}); \
             return el ? el.innerText : null; }})()"
        ))
        .await
    }

    async fn wait_for_navigation(&self, wait: Duration) -> Result<bool> {
        match timeout(wait, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(false),
        }
    }

    async fn settle(&self, delay: Duration) {
        sleep(delay).await;
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> Result<()> {
        self.page
            .save_screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(full_page)
                    .build(),
                path,
            )
            .await?;
        Ok(())
    }
}
