//! Headless Chrome adapter for the `Browser` trait.
//!
//! `headless_chrome` is a blocking API, so every call runs on the blocking
//! pool. Tabs are tracked by `PageHandle` id; id 0 is the main search tab.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::{Cookie, CookieParam};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{LaunchOptions, Tab};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{Browser, ElementHandle, ExtractionError, PageHandle};

const MAIN_PAGE: PageHandle = PageHandle(0);
const DEFAULT_TAB_TIMEOUT: Duration = Duration::from_secs(20);
const NEW_PAGE_TIMEOUT: Duration = Duration::from_secs(10);
const NEW_PAGE_POLL: Duration = Duration::from_millis(200);
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

pub struct ChromeBrowser {
    browser: headless_chrome::Browser,
    pages: Mutex<HashMap<u64, Arc<Tab>>>,
    next_id: AtomicU64,
}

impl ChromeBrowser {
    pub async fn launch(headless: bool) -> anyhow::Result<Self> {
        tokio::task::spawn_blocking(move || Self::launch_blocking(headless)).await?
    }

    fn launch_blocking(headless: bool) -> anyhow::Result<Self> {
        let options = LaunchOptions {
            headless,
            args: vec![OsStr::new("--disable-blink-features=AutomationControlled")],
            idle_browser_timeout: IDLE_BROWSER_TIMEOUT,
            ..Default::default()
        };
        let browser = headless_chrome::Browser::new(options).context("Failed to launch Chrome")?;
        let main = browser.new_tab().context("Failed to open main tab")?;
        info!("Chrome launched (headless: {headless})");

        let mut pages = HashMap::new();
        pages.insert(MAIN_PAGE.0, main);
        Ok(Self {
            browser,
            pages: Mutex::new(pages),
            next_id: AtomicU64::new(MAIN_PAGE.0 + 1),
        })
    }

    fn tab(&self, page: PageHandle) -> Result<Arc<Tab>, ExtractionError> {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&page.0)
            .cloned()
            .ok_or(ExtractionError::UnknownPage(page))
    }

    fn register(&self, tab: Arc<Tab>) -> PageHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tab);
        PageHandle(id)
    }

    /// Writes the main tab's cookies to `path`. Returns the cookie count.
    pub async fn save_session(&self, path: &Path) -> anyhow::Result<usize> {
        let tab = self.tab(MAIN_PAGE)?;
        let cookies = tokio::task::spawn_blocking(move || tab.get_cookies()).await??;
        let session = SessionFile {
            cookies: cookies.iter().map(StoredCookie::from).collect(),
        };

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(&session)?.as_bytes())?;
        tmp.persist(path)
            .with_context(|| format!("Failed to write session file {}", path.display()))?;

        info!("Saved {} cookies to {}", session.cookies.len(), path.display());
        Ok(session.cookies.len())
    }

    /// Restores cookies saved by `save_session` into the main tab.
    pub async fn load_session(&self, path: &Path) -> anyhow::Result<usize> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read session file {}", path.display()))?;
        let session: SessionFile = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed session file {}", path.display()))?;
        let params = session
            .cookies
            .iter()
            .map(StoredCookie::to_param)
            .collect::<Result<Vec<_>, _>>()?;
        let count = params.len();

        let tab = self.tab(MAIN_PAGE)?;
        tokio::task::spawn_blocking(move || tab.set_cookies(params)).await??;
        info!("Restored {count} cookies from {}", path.display());
        Ok(count)
    }
}

async fn blocking<T, F>(op: F) -> Result<T, ExtractionError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ExtractionError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(ExtractionError::browser)?
}

#[async_trait]
impl Browser for ChromeBrowser {
    fn main_page(&self) -> PageHandle {
        MAIN_PAGE
    }

    async fn navigate(&self, page: PageHandle, url: &str) -> Result<(), ExtractionError> {
        let tab = self.tab(page)?;
        let url = url.to_string();
        blocking(move || {
            tab.navigate_to(&url)
                .and_then(|t| t.wait_until_navigated())
                .map_err(ExtractionError::browser)?;
            Ok(())
        })
        .await
    }

    async fn fill(&self, page: PageHandle, selector: &str, text: &str) -> Result<(), ExtractionError> {
        let tab = self.tab(page)?;
        let (selector, text) = (selector.to_string(), text.to_string());
        blocking(move || {
            let element = tab.wait_for_element(&selector).map_err(|_| ExtractionError::Missing {
                selector: selector.clone(),
            })?;
            element.click().map_err(ExtractionError::browser)?;
            element.type_into(&text).map_err(ExtractionError::browser)?;
            Ok(())
        })
        .await
    }

    async fn click(&self, page: PageHandle, selector: &str) -> Result<(), ExtractionError> {
        let tab = self.tab(page)?;
        let selector = selector.to_string();
        blocking(move || {
            let element = tab.wait_for_element(&selector).map_err(|_| ExtractionError::Missing {
                selector: selector.clone(),
            })?;
            element.click().map_err(ExtractionError::browser)?;
            Ok(())
        })
        .await
    }

    async fn press_key(&self, page: PageHandle, key: &str) -> Result<(), ExtractionError> {
        let tab = self.tab(page)?;
        let key = key.to_string();
        blocking(move || {
            tab.press_key(&key).map_err(ExtractionError::browser)?;
            Ok(())
        })
        .await
    }

    async fn wait_for_network_idle(&self, page: PageHandle, timeout: Duration) -> Result<(), ExtractionError> {
        let tab = self.tab(page)?;
        blocking(move || {
            tab.set_default_timeout(timeout);
            let waited = tab.wait_until_navigated().map(|_| ());
            tab.set_default_timeout(DEFAULT_TAB_TIMEOUT);
            waited.map_err(|_| ExtractionError::Timeout {
                selector: "<navigation>".to_string(),
                timeout,
            })
        })
        .await
    }

    async fn locate_all(&self, page: PageHandle, selector: &str) -> Result<Vec<ElementHandle>, ExtractionError> {
        let tab = self.tab(page)?;
        let selector = selector.to_string();
        blocking(move || {
            // find_elements reports "no match" as an error; that is an empty listing here.
            let count = tab.find_elements(&selector).map(|e| e.len()).unwrap_or(0);
            Ok((0..count)
                .map(|index| ElementHandle {
                    page,
                    selector: selector.clone(),
                    index,
                })
                .collect())
        })
        .await
    }

    async fn extract_text(&self, element: &ElementHandle, timeout: Duration) -> Result<String, ExtractionError> {
        let tab = self.tab(element.page)?;
        let ElementHandle { selector, index, .. } = element.clone();
        blocking(move || {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)
                .map_err(|_| ExtractionError::Timeout {
                    selector: selector.clone(),
                    timeout,
                })?;
            let elements = tab.find_elements(&selector).map_err(|_| ExtractionError::Missing {
                selector: selector.clone(),
            })?;
            let element = elements.get(index).ok_or_else(|| ExtractionError::Missing {
                selector: selector.clone(),
            })?;
            element
                .get_inner_text()
                .map(|t| t.trim().to_string())
                .map_err(ExtractionError::browser)
        })
        .await
    }

    async fn open_linked_page(&self, trigger: &ElementHandle) -> Result<PageHandle, ExtractionError> {
        let tab = self.tab(trigger.page)?;
        let browser = self.browser.clone();
        let ElementHandle { selector, index, .. } = trigger.clone();

        let opened = blocking(move || {
            let known: HashSet<String> = open_target_ids(&browser)?;

            let elements = tab.find_elements(&selector).map_err(|_| ExtractionError::Missing {
                selector: selector.clone(),
            })?;
            let element = elements.get(index).ok_or_else(|| ExtractionError::Missing {
                selector: selector.clone(),
            })?;
            element.click().map_err(ExtractionError::browser)?;

            let deadline = Instant::now() + NEW_PAGE_TIMEOUT;
            loop {
                let fresh = browser
                    .get_tabs()
                    .lock()
                    .map_err(|_| ExtractionError::browser("tab list lock poisoned"))?
                    .iter()
                    .find(|t| !known.contains(t.get_target_id()))
                    .cloned();
                if let Some(new_tab) = fresh {
                    new_tab.wait_until_navigated().map_err(ExtractionError::browser)?;
                    return Ok(new_tab);
                }
                if Instant::now() >= deadline {
                    return Err(ExtractionError::Timeout {
                        selector: format!("new page from '{selector}'"),
                        timeout: NEW_PAGE_TIMEOUT,
                    });
                }
                std::thread::sleep(NEW_PAGE_POLL);
            }
        })
        .await?;

        let handle = self.register(opened);
        debug!("Opened linked page {handle:?}");
        Ok(handle)
    }

    async fn get_html(&self, page: PageHandle) -> Result<String, ExtractionError> {
        let tab = self.tab(page)?;
        blocking(move || tab.get_content().map_err(ExtractionError::browser)).await
    }

    async fn current_url(&self, page: PageHandle) -> Result<String, ExtractionError> {
        let tab = self.tab(page)?;
        Ok(tab.get_url())
    }

    async fn screenshot(&self, element: &ElementHandle, path: &Path) -> Result<(), ExtractionError> {
        let tab = self.tab(element.page)?;
        let ElementHandle { selector, index, .. } = element.clone();
        let path = path.to_path_buf();
        blocking(move || {
            let elements = tab.find_elements(&selector).map_err(|_| ExtractionError::Missing {
                selector: selector.clone(),
            })?;
            let element = elements.get(index).ok_or_else(|| ExtractionError::Missing {
                selector: selector.clone(),
            })?;
            let png = element
                .capture_screenshot(CaptureScreenshotFormatOption::Png)
                .map_err(ExtractionError::browser)?;
            std::fs::write(&path, png).map_err(ExtractionError::browser)
        })
        .await
    }

    async fn close_page(&self, page: PageHandle) -> Result<(), ExtractionError> {
        let tab = self
            .pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&page.0)
            .ok_or(ExtractionError::UnknownPage(page))?;
        blocking(move || {
            tab.close(true).map_err(ExtractionError::browser)?;
            Ok(())
        })
        .await
    }
}

fn open_target_ids(browser: &headless_chrome::Browser) -> Result<HashSet<String>, ExtractionError> {
    let tabs = browser
        .get_tabs()
        .lock()
        .map_err(|_| ExtractionError::browser("tab list lock poisoned"))?;
    Ok(tabs.iter().map(|t| t.get_target_id().to_string()).collect())
}

// ────────────────────────────────────────────────────────────────────────────
// Session file
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    cookies: Vec<StoredCookie>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    /// Seconds since the epoch; negative for session cookies.
    expires: f64,
    http_only: bool,
    secure: bool,
}

impl From<&Cookie> for StoredCookie {
    fn from(c: &Cookie) -> Self {
        Self {
            name: c.name.clone(),
            value: c.value.clone(),
            domain: c.domain.clone(),
            path: c.path.clone(),
            expires: c.expires,
            http_only: c.http_only,
            secure: c.secure,
        }
    }
}

impl StoredCookie {
    fn param_json(&self) -> serde_json::Value {
        let mut param = json!({
            "name": self.name,
            "value": self.value,
            "domain": self.domain,
            "path": self.path,
            "secure": self.secure,
            "httpOnly": self.http_only,
        });
        if self.expires > 0.0 {
            param["expires"] = json!(self.expires);
        }
        param
    }

    fn to_param(&self) -> anyhow::Result<CookieParam> {
        serde_json::from_value(self.param_json())
            .map_err(|e| anyhow!("Cookie '{}' cannot be restored: {e}", self.name))
    }
}
