//! Annual report filing flow.
//!
//! Drives the portal's multi-page flow for one document number: landing →
//! docid entry → post-submit validation → entity verification → mailing
//! address reconciliation → form continuation → review → payment page. The
//! flow never submits payment; reaching the payment page with a capturable
//! screenshot is the success condition.
//!
//! The portal's markup is not versioned, so every interaction is guarded by
//! a visibility check and every wait is bounded. Optional controls that are
//! absent get a log line and the run continues.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{FilerError, Result};
use crate::infrastructure::PortalPage;
use crate::models::FilingPayload;
use crate::services::address::{addresses_match, clean_address, parse_address};
use crate::services::artifacts::{ArtifactStore, Stage};

// Portal selectors and button labels. Known but unversioned; any change on
// the portal side is an external breaking change.
pub const SEL_DOC_INPUT: &str = "#DocumentId";
pub const SEL_SUBMIT: &str = "input[value='Submit']";
pub const SEL_VALIDATION_ERRORS: &str = ".validation-summary-errors";
pub const SEL_CONTINUE_OR_SUBMIT: &str = "input[value='Continue'], input[value='Submit']";
pub const SEL_MAILING_SECTION: &str = ".mailing-address .section-box-content";
pub const SEL_EDIT_MAILING: &str = "input[value='Edit Mailing Address']";
pub const SEL_ADDR_STREET: &str = "#Address_Address1";
pub const SEL_ADDR_CITY: &str = "#Address_City";
pub const SEL_ADDR_ZIP: &str = "#Address_Zip";
pub const SEL_ADDR_STATE: &str = "#Address_State";
pub const SEL_UPDATE: &str = "input[value='Update']";
pub const SEL_CONTINUE: &str = "input[value='Continue']";
pub const SEL_REVIEW_CONTINUE: &str = "input[value='Continue to Payment'], input[value='Continue']";

/// A failed run together with the crash screenshot, when one was captured.
#[derive(Debug)]
pub struct NavigationFailure {
    pub error: FilerError,
    pub screenshot: Option<PathBuf>,
}

/// Stateful driver of the remote filing flow.
pub struct Navigator {
    portal_url: String,
    selector_timeout: Duration,
    navigation_timeout: Duration,
    settle_delay: Duration,
}

impl Navigator {
    pub fn new(config: &Config) -> Self {
        Self {
            portal_url: config.portal_url.clone(),
            selector_timeout: config.selector_timeout(),
            navigation_timeout: config.navigation_timeout(),
            settle_delay: config.settle_delay(),
        }
    }

    /// Run the filing flow; on failure, capture a crash screenshot before
    /// reporting the error so the failure state is auditable.
    pub async fn execute(
        &self,
        page: &dyn PortalPage,
        doc_id: &str,
        payload: &FilingPayload,
        artifacts: &ArtifactStore,
    ) -> Result<PathBuf, NavigationFailure> {
        match self.file_annual_report(page, doc_id, payload, artifacts).await {
            Ok(proof) => Ok(proof),
            Err(error) => {
                let crash_path = artifacts.path_for(doc_id, Stage::Crash);
                let screenshot = match page.screenshot(&crash_path, true).await {
                    Ok(()) => Some(crash_path),
                    Err(shot_err) => {
                        warn!("could not capture crash screenshot: {shot_err}");
                        None
                    }
                };
                Err(NavigationFailure { error, screenshot })
            }
        }
    }

    async fn file_annual_report(
        &self,
        page: &dyn PortalPage,
        doc_id: &str,
        payload: &FilingPayload,
        artifacts: &ArtifactStore,
    ) -> Result<PathBuf> {
        info!("starting annual report filing for {doc_id}");

        // Stage 1: landing. The debug screenshot is taken unconditionally;
        // it is useful even on success and mandatory evidence on failure.
        page.goto(&self.portal_url).await?;
        let landing = artifacts.path_for(doc_id, Stage::Landing);
        if let Err(e) = page.screenshot(&landing, false).await {
            warn!("landing screenshot failed: {e}");
        }

        // Stage 2: document number entry.
        info!("submitting document number {doc_id}");
        page.wait_for(SEL_DOC_INPUT, self.selector_timeout).await?;
        page.fill(SEL_DOC_INPUT, doc_id).await?;
        page.click(SEL_SUBMIT).await?;

        // Stage 3: post-submit. A navigation timeout is tolerated here; the
        // page may have already completed a synchronous transition.
        if !page.wait_for_navigation(self.navigation_timeout).await? {
            debug!("no navigation observed after submit; continuing");
        }

        if let Some(text) = page.inner_text(SEL_VALIDATION_ERRORS).await.ok().flatten() {
            if text.contains("Invalid") {
                return Err(FilerError::InvalidDocId(text.trim().to_string()));
            }
        }

        // Stage 4: entity verification. Some entities show a confirmation
        // interstitial; absence is not an error.
        if page.is_visible(SEL_CONTINUE_OR_SUBMIT).await? {
            debug!("collapsing verification interstitial");
            page.click(SEL_CONTINUE_OR_SUBMIT).await?;
            page.settle(self.settle_delay).await;
        }

        // Stage 5: mailing address reconciliation.
        if let Some(wanted) = payload.mailing_address.as_deref() {
            self.sync_mailing_address(page, wanted).await?;
        }

        if !payload.officers.is_empty() {
            // Officer changes are not automated; the filing proceeds with
            // what is on file and the order notes reach a human reviewer.
            info!(
                "payload carries {} officer change(s); not handled by automation",
                payload.officers.len()
            );
        }

        // Stage 6: form continuation.
        if page.is_visible(SEL_CONTINUE).await? {
            page.click(SEL_CONTINUE).await?;
            page.settle(self.settle_delay).await;
        }

        // Stage 7: review.
        if page.is_visible(SEL_REVIEW_CONTINUE).await? {
            info!("on review page, proceeding to payment");
            page.click(SEL_REVIEW_CONTINUE).await?;
            page.settle(self.settle_delay).await;
        }

        // Stage 8: payment page. Settle, then capture the proof-of-filing
        // screenshot. Payment itself is out of scope.
        page.settle(self.settle_delay).await;
        let proof = artifacts.path_for(doc_id, Stage::Payment);
        page.screenshot(&proof, true).await?;
        info!("reached payment page; proof saved to {}", proof.display());

        Ok(proof)
    }

    /// Bring the on-file mailing address in line with the payload.
    ///
    /// Reapplying an identical address is a no-op: it saves a round trip and
    /// avoids a spurious audit trail on the portal side. A scrape failure
    /// degrades to "assume different, proceed with update"; a missing edit
    /// control is logged and skipped, never fatal.
    async fn sync_mailing_address(&self, page: &dyn PortalPage, wanted: &str) -> Result<()> {
        info!("checking mailing address sync");

        let on_file = match page.inner_text(SEL_MAILING_SECTION).await {
            Ok(text) => text,
            Err(e) => {
                warn!("could not scrape on-file mailing address ({e}); defaulting to update");
                None
            }
        };

        if let Some(current) = on_file.as_deref() {
            if addresses_match(current, wanted) {
                info!("mailing address already matches payload, skipping update");
                return Ok(());
            }
            info!("mailing address differs, updating to payload value");
        } else {
            info!("no on-file mailing address visible, proceeding with update");
        }

        if !page.is_visible(SEL_EDIT_MAILING).await? {
            info!("edit mailing address control not found; continuing without update");
            return Ok(());
        }

        page.click(SEL_EDIT_MAILING).await?;
        page.wait_for(SEL_ADDR_STREET, self.selector_timeout).await?;

        let addr = parse_address(&clean_address(wanted));
        debug!("parsed payload address: {addr:?}");

        page.fill(SEL_ADDR_STREET, &addr.street).await?;
        if !addr.city.is_empty() {
            page.fill(SEL_ADDR_CITY, &addr.city).await?;
        }
        if !addr.zip.is_empty() {
            page.fill(SEL_ADDR_ZIP, &addr.zip).await?;
        }
        if !addr.state.is_empty() {
            // The state field is sometimes a typeahead, sometimes a strict
            // select; try direct fill first.
            if page.fill(SEL_ADDR_STATE, &addr.state).await.is_err() {
                if let Err(e) = page.select_option(SEL_ADDR_STATE, &addr.state).await {
                    warn!("could not set state field: {e}");
                }
            }
        }

        if page.is_visible(SEL_UPDATE).await? {
            page.click(SEL_UPDATE).await?;
        } else if page.is_visible(SEL_CONTINUE).await? {
            page.click(SEL_CONTINUE).await?;
        }
        page.settle(self.settle_delay).await;
        info!("saved mailing address update");

        Ok(())
    }
}
