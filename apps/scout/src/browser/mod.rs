//! Browsing collaborator: the few page operations the qualification core
//! consumes. Every failure surfaces as an `ExtractionError`; a missing or
//! drifted selector never crashes the run.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod chrome;

pub use chrome::ChromeBrowser;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no element matches '{selector}'")]
    Missing { selector: String },

    #[error("timed out after {}ms waiting for '{selector}'", timeout.as_millis())]
    Timeout { selector: String, timeout: Duration },

    #[error("page {0:?} is not open")]
    UnknownPage(PageHandle),

    #[error("browser error: {0}")]
    Browser(String),
}

impl ExtractionError {
    pub fn browser(err: impl std::fmt::Display) -> Self {
        ExtractionError::Browser(err.to_string())
    }
}

/// Opaque handle to one open page (tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageHandle(pub u64);

/// The `index`-th element matching `selector` on `page`, resolved lazily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub page: PageHandle,
    pub selector: String,
    pub index: usize,
}

impl ElementHandle {
    pub fn first(page: PageHandle, selector: &str) -> Self {
        Self {
            page,
            selector: selector.to_string(),
            index: 0,
        }
    }
}

#[async_trait]
pub trait Browser: Send + Sync {
    /// The page searches run on.
    fn main_page(&self) -> PageHandle;

    async fn navigate(&self, page: PageHandle, url: &str) -> Result<(), ExtractionError>;

    async fn fill(&self, page: PageHandle, selector: &str, text: &str) -> Result<(), ExtractionError>;

    async fn click(&self, page: PageHandle, selector: &str) -> Result<(), ExtractionError>;

    async fn press_key(&self, page: PageHandle, key: &str) -> Result<(), ExtractionError>;

    async fn wait_for_network_idle(&self, page: PageHandle, timeout: Duration) -> Result<(), ExtractionError>;

    /// Every element currently matching `selector`; empty when none match.
    async fn locate_all(&self, page: PageHandle, selector: &str) -> Result<Vec<ElementHandle>, ExtractionError>;

    async fn extract_text(&self, element: &ElementHandle, timeout: Duration) -> Result<String, ExtractionError>;

    /// Clicks `trigger` and returns the page it opened.
    async fn open_linked_page(&self, trigger: &ElementHandle) -> Result<PageHandle, ExtractionError>;

    async fn get_html(&self, page: PageHandle) -> Result<String, ExtractionError>;

    async fn current_url(&self, page: PageHandle) -> Result<String, ExtractionError>;

    async fn screenshot(&self, element: &ElementHandle, path: &Path) -> Result<(), ExtractionError>;

    async fn close_page(&self, page: PageHandle) -> Result<(), ExtractionError>;
}
