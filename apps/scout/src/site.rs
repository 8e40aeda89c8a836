//! Recruiter-site adapter: runs a search, lists the result cards, opens a
//! profile and reads its fields.
//!
//! Selectors are comma-joined alternatives because the site has shipped
//! several layouts; the first element matching any of them wins.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::browser::{Browser, ElementHandle, ExtractionError, PageHandle};

pub const RESUME_LINK_SELECTOR: &str = "div.new-resume-personal-name";
pub const CV_TEXT_SELECTOR: &str = "#resume-detail-single";
pub const LOGIN_AREA_SELECTOR: &str = "#resume-detail-single .ant-tabs-extra-content";
pub const NEXT_PAGE_SELECTOR: &str = "li.ant-pagination-next:not(.ant-pagination-disabled) button";
pub const SEARCH_INPUT_SELECTOR: &str =
    "input#rc_select_1, input.search-input, input.company-position-input, .search-box, .search-input";
pub const SEARCH_BUTTON_SELECTOR: &str = ".search-btn, .submit-btn, button[type='submit']";
pub const WORK_TIME_SELECTOR: &str =
    "div.work-time, .work-duration, .time-text, .work-time-text, .contact-time, span.rd-work-time";
pub const NAME_SELECTOR: &str =
    "div.resume-preview-name, .person-name, .resume-name, .name-text, .contact-name, h4.name";
pub const INFO_SELECTOR: &str = "div.basic-cont > div.sep-info";
pub const TITLE_SELECTOR: &str =
    "div.position-name, .work-position, .position-text, .position-title, .contact-position, h6.job-name";
pub const COMPANY_SELECTOR: &str =
    "div.company-name, .work-company, .company-text, .company-title, .contact-company, div.rd-work-comp > h5";
pub const CONTACT_SELECTOR: &str = "div.contact-info, .resume-contact, .contact-cont";

const SHORT_TIMEOUT: Duration = Duration::from_secs(3);
const FIELD_TIMEOUT: Duration = Duration::from_secs(5);
const SEARCH_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_SETTLE: Duration = Duration::from_secs(3);
const LISTING_SETTLE: Duration = Duration::from_secs(1);
const PROFILE_SETTLE: Duration = Duration::from_secs(2);

// ────────────────────────────────────────────────────────────────────────────
// Traits consumed by the filter chain and the coordinator
// ────────────────────────────────────────────────────────────────────────────

/// Field access on one opened candidate profile.
#[async_trait]
pub trait ProfileView: Send + Sync {
    async fn url(&self) -> String;
    async fn login_area_text(&self) -> Result<String, ExtractionError>;
    async fn header_text(&self) -> Result<String, ExtractionError>;
    async fn tenure_text(&self) -> Result<String, ExtractionError>;
    async fn name(&self) -> Result<String, ExtractionError>;
    /// The "男 | 35岁 | 本科" line the gender is read from.
    async fn info_text(&self) -> Result<String, ExtractionError>;
    async fn title(&self) -> Result<String, ExtractionError>;
    async fn employer(&self) -> Result<String, ExtractionError>;
    async fn resume_text(&self) -> Result<String, ExtractionError>;
    async fn html(&self) -> Result<String, ExtractionError>;
    async fn capture_contact(&self, path: &Path) -> Result<(), ExtractionError>;
}

/// A paged stream of candidates for one (employer, position) search.
#[async_trait]
pub trait CandidateFeed: Send + Sync {
    type Entry: Send + Sync;
    type Profile: ProfileView;

    async fn begin_search(&self, employer: &str, position: &str) -> Result<(), ExtractionError>;

    /// Entries on the current result page, in page order.
    async fn listing(&self) -> Result<Vec<Self::Entry>, ExtractionError>;

    async fn open_profile(&self, entry: &Self::Entry) -> Result<Self::Profile, ExtractionError>;

    async fn close_profile(&self, profile: Self::Profile);

    /// Moves to the next result page; false when there is none.
    async fn next_page(&self) -> Result<bool, ExtractionError>;
}

// ────────────────────────────────────────────────────────────────────────────
// RecruiterSite
// ────────────────────────────────────────────────────────────────────────────

pub struct RecruiterSite<B: Browser> {
    browser: Arc<B>,
    search_url: String,
    settle: bool,
}

impl<B: Browser> RecruiterSite<B> {
    pub fn new(browser: Arc<B>, search_url: impl Into<String>) -> Self {
        Self {
            browser,
            search_url: search_url.into(),
            settle: true,
        }
    }

    /// Skips the fixed settle delays after navigation.
    #[cfg(test)]
    pub fn without_settle_delays(mut self) -> Self {
        self.settle = false;
        self
    }

    async fn pause(&self, duration: Duration) {
        if self.settle {
            tokio::time::sleep(duration).await;
        }
    }
}

#[async_trait]
impl<B: Browser + 'static> CandidateFeed for RecruiterSite<B> {
    type Entry = ElementHandle;
    type Profile = RecruiterProfile<B>;

    async fn begin_search(&self, employer: &str, position: &str) -> Result<(), ExtractionError> {
        let page = self.browser.main_page();
        let query = format!("{employer} {position}");
        let query = query.trim();

        self.browser.navigate(page, &self.search_url).await?;
        self.browser.fill(page, SEARCH_INPUT_SELECTOR, query).await?;
        if let Err(e) = self.browser.click(page, SEARCH_BUTTON_SELECTOR).await {
            debug!("Search button not found ({e}); submitting with Enter");
            self.browser.press_key(page, "Enter").await?;
        }
        if let Err(e) = self.browser.wait_for_network_idle(page, SEARCH_IDLE_TIMEOUT).await {
            warn!("Search results for '{query}' did not settle: {e}");
        }
        self.pause(SEARCH_SETTLE).await;
        Ok(())
    }

    async fn listing(&self) -> Result<Vec<ElementHandle>, ExtractionError> {
        self.pause(LISTING_SETTLE).await;
        self.browser
            .locate_all(self.browser.main_page(), RESUME_LINK_SELECTOR)
            .await
    }

    async fn open_profile(&self, entry: &ElementHandle) -> Result<RecruiterProfile<B>, ExtractionError> {
        let page = self.browser.open_linked_page(entry).await?;
        self.pause(PROFILE_SETTLE).await;
        Ok(RecruiterProfile {
            browser: Arc::clone(&self.browser),
            page,
        })
    }

    async fn close_profile(&self, profile: RecruiterProfile<B>) {
        if let Err(e) = self.browser.close_page(profile.page).await {
            warn!("Failed to close profile page: {e}");
        }
    }

    async fn next_page(&self) -> Result<bool, ExtractionError> {
        let page = self.browser.main_page();
        if self.browser.locate_all(page, NEXT_PAGE_SELECTOR).await?.is_empty() {
            return Ok(false);
        }
        self.browser.click(page, NEXT_PAGE_SELECTOR).await?;
        if let Err(e) = self.browser.wait_for_network_idle(page, SEARCH_IDLE_TIMEOUT).await {
            warn!("Next result page did not settle: {e}");
        }
        Ok(true)
    }
}

pub struct RecruiterProfile<B: Browser> {
    browser: Arc<B>,
    page: PageHandle,
}

impl<B: Browser> RecruiterProfile<B> {
    async fn first_text(&self, selector: &str, timeout: Duration) -> Result<String, ExtractionError> {
        self.browser
            .extract_text(&ElementHandle::first(self.page, selector), timeout)
            .await
    }
}

#[async_trait]
impl<B: Browser + 'static> ProfileView for RecruiterProfile<B> {
    async fn url(&self) -> String {
        self.browser.current_url(self.page).await.unwrap_or_default()
    }

    async fn login_area_text(&self) -> Result<String, ExtractionError> {
        self.first_text(LOGIN_AREA_SELECTOR, SHORT_TIMEOUT).await
    }

    async fn header_text(&self) -> Result<String, ExtractionError> {
        self.first_text(CV_TEXT_SELECTOR, SHORT_TIMEOUT).await
    }

    async fn tenure_text(&self) -> Result<String, ExtractionError> {
        self.first_text(WORK_TIME_SELECTOR, FIELD_TIMEOUT).await
    }

    async fn name(&self) -> Result<String, ExtractionError> {
        self.first_text(NAME_SELECTOR, FIELD_TIMEOUT).await
    }

    async fn info_text(&self) -> Result<String, ExtractionError> {
        self.first_text(INFO_SELECTOR, FIELD_TIMEOUT).await
    }

    async fn title(&self) -> Result<String, ExtractionError> {
        self.first_text(TITLE_SELECTOR, FIELD_TIMEOUT).await
    }

    async fn employer(&self) -> Result<String, ExtractionError> {
        self.first_text(COMPANY_SELECTOR, FIELD_TIMEOUT).await
    }

    async fn resume_text(&self) -> Result<String, ExtractionError> {
        self.first_text(CV_TEXT_SELECTOR, FIELD_TIMEOUT).await
    }

    async fn html(&self) -> Result<String, ExtractionError> {
        self.browser.get_html(self.page).await
    }

    async fn capture_contact(&self, path: &Path) -> Result<(), ExtractionError> {
        let element = ElementHandle::first(self.page, CONTACT_SELECTOR);
        self.browser.screenshot(&element, path).await
    }
}
