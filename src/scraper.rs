use anyhow::anyhow;
use async_trait::async_trait;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::plugins::traits::{AutomationFactory, ElementHandle, Locator, PageAutomation};
use crate::{AppError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const WINDOW_SIZE: (u32, u32) = (1080, 720);
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(300);

/// Launches a fresh Chrome process for every session.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    headless: bool,
    chrome_path: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            headless: config.headless,
            chrome_path: config.chrome_path.as_ref().map(PathBuf::from),
        }
    }

    fn launch_options(&self) -> Result<LaunchOptions<'static>> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(self.headless)
            .sandbox(false) // Often needed in containerized environments
            .window_size(Some(WINDOW_SIZE))
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-background-timer-throttling"),
                OsStr::new("--disable-renderer-backgrounding"),
            ])
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &self.chrome_path {
            launch_options.path = Some(chrome_path.clone());
        }

        Ok(launch_options)
    }
}

#[async_trait]
impl AutomationFactory for ChromeLauncher {
    async fn open(&self) -> Result<Box<dyn PageAutomation>> {
        let launch_options = self.launch_options()?;

        let (browser, tab) = tokio::task::spawn_blocking(move || -> anyhow::Result<(Browser, Arc<Tab>)> {
            let browser = Browser::new(launch_options).map_err(|e| anyhow!("Failed to launch browser: {}", e))?;
            let tab = browser.new_tab().map_err(|e| anyhow!("Failed to create tab: {}", e))?;
            Ok((browser, tab))
        })
        .await
        .map_err(|e| AppError::Browser(format!("browser launch task failed: {}", e)))?
        .map_err(|e| AppError::Browser(e.to_string()))?;

        tracing::debug!(headless = self.headless, "Chrome session opened");
        Ok(Box::new(ChromeSession {
            browser: Mutex::new(Some(browser)),
            tab,
        }))
    }
}

/// A single Chrome process with one tab.
///
/// Dropping the session kills the process, so a session abandoned mid-tick
/// (for instance by a forced shutdown) does not leak a browser.
pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    tab: Arc<Tab>,
}

impl ChromeSession {
    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| AppError::Browser(format!("browser task failed: {}", e)))?
            .map_err(|e| AppError::Browser(e.to_string()))
    }

    async fn with_element<T, F>(&self, element: &ElementHandle, f: F) -> Result<T>
    where
        F: FnOnce(&Element<'_>) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let locator = element.locator().clone();
        self.run_blocking(move |tab| {
            let found = match &locator {
                Locator::XPath(xpath) => tab.find_element_by_xpath(xpath),
                other => {
                    let selector = other.as_css().ok_or_else(|| anyhow!("no CSS form for {}", other))?;
                    tab.find_element(&selector)
                }
            }
            .map_err(|e| anyhow!("{} not found: {}", locator, e))?;
            f(&found)
        })
        .await
    }

    async fn element_state(&self, locator: &Locator) -> Result<ElementState> {
        let script = state_script(locator);
        let value = self
            .run_blocking(move |tab| Ok(tab.evaluate(&script, false)?.value))
            .await?;

        match value.as_ref().and_then(|v| v.as_str()) {
            Some(state) => state
                .parse()
                .map_err(|_| AppError::Browser(format!("unexpected element state '{}'", state))),
            None => Err(AppError::Browser(format!("no element state returned for {}", locator))),
        }
    }

    async fn wait_for(&self, locator: &Locator, condition: WaitFor, timeout: Duration) -> Result<()> {
        poll_until(locator, condition, timeout, || self.element_state(locator)).await
    }
}

#[async_trait]
impl PageAutomation for ChromeSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let target = url.to_string();
        self.run_blocking(move |tab| {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&target)?.wait_until_navigated()?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn wait_until_clickable(&self, locator: &Locator, timeout: Duration) -> Result<ElementHandle> {
        self.wait_for(locator, WaitFor::Clickable, timeout).await?;
        Ok(ElementHandle::new(locator.clone()))
    }

    async fn wait_until_visible(&self, locator: &Locator, timeout: Duration) -> Result<ElementHandle> {
        self.wait_for(locator, WaitFor::Visible, timeout).await?;
        Ok(ElementHandle::new(locator.clone()))
    }

    async fn wait_until_absent(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        self.wait_for(locator, WaitFor::Absent, timeout).await
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.with_element(element, |el| {
            el.click()?;
            Ok(())
        })
        .await
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<()> {
        let text = text.to_string();
        self.with_element(element, move |el| {
            el.type_into(&text)?;
            Ok(())
        })
        .await
    }

    async fn read_text(&self, element: &ElementHandle) -> Result<String> {
        self.with_element(element, |el| el.get_inner_text()).await
    }

    async fn close(&self) -> Result<()> {
        let browser = self
            .browser
            .lock()
            .map_err(|_| AppError::Browser("browser lock poisoned".to_string()))?
            .take();

        if let Some(browser) = browser {
            // Dropping the handle kills the Chrome process, which blocks briefly.
            tokio::task::spawn_blocking(move || drop(browser))
                .await
                .map_err(|e| AppError::Browser(format!("browser shutdown task failed: {}", e)))?;
            tracing::debug!("Chrome session closed");
        }
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        let still_open = self
            .browser
            .get_mut()
            .map(|browser| browser.take().is_some())
            .unwrap_or(false);
        if still_open {
            tracing::warn!("Chrome session dropped without close; browser released");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementState {
    Absent,
    Hidden,
    Visible,
    Clickable,
}

impl std::str::FromStr for ElementState {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "absent" => Ok(ElementState::Absent),
            "hidden" => Ok(ElementState::Hidden),
            "visible" => Ok(ElementState::Visible),
            "clickable" => Ok(ElementState::Clickable),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitFor {
    Clickable,
    Visible,
    Absent,
}

impl WaitFor {
    fn is_met(self, state: ElementState) -> bool {
        match self {
            WaitFor::Clickable => state == ElementState::Clickable,
            WaitFor::Visible => matches!(state, ElementState::Visible | ElementState::Clickable),
            // A hidden preloader counts as gone.
            WaitFor::Absent => matches!(state, ElementState::Absent | ElementState::Hidden),
        }
    }
}

/// Polls `state_of` until `condition` holds or `timeout` elapses. A failed
/// evaluation (page mid-navigation, context torn down) counts as "not yet";
/// if the last poll before the deadline failed, that error is returned
/// instead of a timeout.
async fn poll_until<F, Fut>(
    locator: &Locator,
    condition: WaitFor,
    timeout: Duration,
    mut state_of: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ElementState>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        let last_error = match state_of().await {
            Ok(state) if condition.is_met(state) => return Ok(()),
            Ok(_) => None,
            Err(e) => {
                tracing::trace!(%locator, error = %e, "Element state unavailable, polling again");
                Some(e)
            }
        };
        if Instant::now() >= deadline {
            return Err(last_error.unwrap_or_else(|| AppError::Timeout {
                selector: locator.to_string(),
                timeout,
            }));
        }
        tokio::time::sleep(POLL_INTERVAL.min(deadline - Instant::now())).await;
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// JS expression resolving the locator to its first matching node, or null.
fn resolve_script(locator: &Locator) -> String {
    match locator {
        Locator::XPath(xpath) => format!(
            "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            js_string(xpath)
        ),
        other => format!(
            "document.querySelector({})",
            js_string(&other.as_css().unwrap_or_default())
        ),
    }
}

fn state_script(locator: &Locator) -> String {
    format!(
        r#"
        (function() {{
            let el;
            try {{
                el = {};
            }} catch (e) {{
                return 'absent';
            }}
            if (!el) {{
                return 'absent';
            }}
            const style = window.getComputedStyle(el);
            const rect = el.getBoundingClientRect();
            const shown = style.display !== 'none'
                && style.visibility !== 'hidden'
                && (rect.width > 0 || rect.height > 0);
            if (!shown) {{
                return 'hidden';
            }}
            return el.disabled ? 'visible' : 'clickable';
        }})()
        "#,
        resolve_script(locator)
    )
}
