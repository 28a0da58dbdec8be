//! Chrome-backed `PageAutomation` (cargo feature `browser`)
//!
//! Reads and clicks go through small DOM scripts so selectors behave the
//! same as in the extraction layer; typing uses real key events.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::{Browser, BrowserConfig as ChromeConfig, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::infrastructure::automation::{CapturedRequest, LivenessProbe, PageAutomation};
use crate::infrastructure::config::{BrowserConfig, NetworkConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct ChromeSurface {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    capture: Arc<Mutex<Option<oneshot::Receiver<CapturedRequest>>>>,
}

impl ChromeSurface {
    pub async fn launch(browser: &BrowserConfig, network: &NetworkConfig) -> Result<Self> {
        let mut builder = ChromeConfig::builder()
            .window_size(browser.window_width, browser.window_height)
            .arg(format!("--user-agent={}", network.user_agent));
        if !browser.headless {
            builder = builder.with_head();
        }
        if network.accept_invalid_certs {
            builder = builder.arg("--ignore-certificate-errors");
        }
        if let Some(executable) = &browser.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(|e| anyhow!("Invalid browser config: {e}"))?;

        info!("Launching Chrome (headless: {})", browser.headless);
        let (chrome, mut events) = Browser::launch(config)
            .await
            .context("Failed to launch Chrome/Edge")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        let page = chrome.new_page("about:blank").await.context("Failed to open a tab")?;

        Ok(Self {
            browser: Mutex::new(chrome),
            page,
            handler,
            capture: Arc::new(Mutex::new(None)),
        })
    }

    pub async fn close(&self) {
        if let Err(e) = self.browser.lock().await.close().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        self.handler.abort();
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self.page.evaluate(script).await.context("Script evaluation failed")?;
        result.into_value::<T>().context("Unexpected script result")
    }

    async fn eval_unit(&self, script: String) -> Result<()> {
        self.page.evaluate(script).await.context("Script evaluation failed")?;
        Ok(())
    }

    async fn wait_until(&self, script: String, timeout: Duration, what: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.eval::<bool>(script.clone()).await.unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(anyhow!("Timed out after {:?} waiting for {}", timeout, what));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<()> {
        self.wait_until(
            "document.readyState === 'complete'".to_string(),
            timeout,
            "page load",
        )
        .await
    }
}

fn js(literal: &str) -> String {
    serde_json::to_string(literal).unwrap_or_else(|_| "\"\"".to_string())
}

fn nth(selector: &str, index: usize) -> String {
    format!("document.querySelectorAll({})[{}]", js(selector), index)
}

#[async_trait]
impl PageAutomation for ChromeSurface {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        debug!("Navigating to {}", url);
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| anyhow!("Navigation to {url} timed out"))?
            .with_context(|| format!("Navigation to {url} failed"))?;
        self.wait_for_load(timeout).await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.wait_until(
            format!("document.querySelector({}) !== null", js(selector)),
            timeout,
            selector,
        )
        .await
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        self.eval(format!("document.querySelectorAll({}).length", js(selector))).await
    }

    async fn text(&self, selector: &str, index: usize) -> Result<Option<String>> {
        self.eval(format!(
            "(() => {{ const el = {}; return el ? el.innerText : null; }})()",
            nth(selector, index)
        ))
        .await
    }

    async fn attribute(&self, selector: &str, index: usize, name: &str) -> Result<Option<String>> {
        self.eval(format!(
            "(() => {{ const el = {}; return el ? el.getAttribute({}) : null; }})()",
            nth(selector, index),
            js(name)
        ))
        .await
    }

    async fn is_visible(&self, selector: &str, index: usize) -> Result<bool> {
        self.eval(format!(
            "(() => {{ const el = {}; if (!el) return false; const r = el.getBoundingClientRect(); \
             return r.width > 0 && r.height > 0 && getComputedStyle(el).visibility !== 'hidden'; }})()",
            nth(selector, index)
        ))
        .await
    }

    async fn is_enabled(&self, selector: &str, index: usize) -> Result<bool> {
        self.eval(format!(
            "(() => {{ const el = {}; return !!el && !el.disabled && !el.classList.contains('disabled') \
             && el.getAttribute('aria-disabled') !== 'true'; }})()",
            nth(selector, index)
        ))
        .await
    }

    async fn click(&self, selector: &str, index: usize, timeout: Duration) -> Result<()> {
        let present = format!("{} !== undefined", nth(selector, index));
        self.wait_until(present, timeout, selector).await?;
        self.eval_unit(format!(
            "(() => {{ const el = {}; el.scrollIntoView({{block: 'center'}}); el.click(); }})()",
            nth(selector, index)
        ))
        .await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.eval_unit(format!(
            "(() => {{ const el = document.querySelector({}); el.focus(); el.value = {}; \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); }})()",
            js(selector),
            js(value)
        ))
        .await
    }

    async fn press(&self, selector: &str, key: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("No element for {selector}"))?;
        element.focus().await?;
        element.press_key(key).await?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let matched: bool = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({}); if (!el) return false; \
                 const opt = [...el.options].find(o => o.value === {v} || o.text.trim() === {v}); \
                 if (!opt) return false; el.value = opt.value; \
                 el.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }})()",
                js(selector),
                v = js(value)
            ))
            .await?;
        if matched {
            Ok(())
        } else {
            Err(anyhow!("Option '{value}' not found in {selector}"))
        }
    }

    async fn go_back(&self, timeout: Duration) -> Result<()> {
        self.eval_unit("history.back()".to_string()).await?;
        self.wait_for_load(timeout).await
    }

    async fn reload(&self, timeout: Duration) -> Result<()> {
        self.eval_unit("location.reload()".to_string()).await?;
        tokio::time::sleep(POLL_INTERVAL).await;
        self.wait_for_load(timeout).await
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.eval_unit("window.scrollTo(0, document.body.scrollHeight)".to_string()).await
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.context("Failed to read page content")
    }

    async fn is_online(&self) -> Result<bool> {
        self.eval("navigator.onLine".to_string()).await
    }

    async fn arm_request_capture(&self, url_fragment: &str) -> Result<()> {
        let mut requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("Failed to listen for requests")?;
        let (tx, rx) = oneshot::channel();
        let fragment = url_fragment.to_string();

        tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let request = &event.request;
                if !request.url.contains(&fragment) || request.method.eq_ignore_ascii_case("options") {
                    continue;
                }
                let headers = serde_json::to_value(&request.headers)
                    .ok()
                    .and_then(|v| v.as_object().cloned())
                    .map(|map| {
                        map.into_iter()
                            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                            .collect()
                    })
                    .unwrap_or_default();
                let body = request
                    .post_data
                    .as_deref()
                    .and_then(|raw| serde_json::from_str::<Value>(raw).ok());
                let _ = tx.send(CapturedRequest {
                    url: request.url.clone(),
                    method: request.method.clone(),
                    headers,
                    body,
                });
                break;
            }
        });

        *self.capture.lock().await = Some(rx);
        Ok(())
    }

    async fn take_captured_request(&self, timeout: Duration) -> Result<CapturedRequest> {
        let receiver = self
            .capture
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("Request capture was not armed"))?;
        let mut captured = tokio::time::timeout(timeout, receiver)
            .await
            .map_err(|_| anyhow!("No matching request within {:?}", timeout))?
            .map_err(|_| anyhow!("Request listener ended before a match"))?;

        // the replayed request leaves the browser, so its session must go along
        match self.page.get_cookies().await {
            Ok(cookies) => {
                let pairs: Vec<(String, String)> = cookies
                    .into_iter()
                    .map(|cookie| (cookie.name, cookie.value))
                    .collect();
                debug!("Attaching {} page cookies to the captured request", pairs.len());
                captured.attach_cookies(&pairs);
            }
            Err(e) => warn!("Could not read page cookies: {}", e),
        }
        Ok(captured)
    }
}

#[async_trait]
impl LivenessProbe for ChromeSurface {
    async fn is_online(&self) -> Result<bool> {
        PageAutomation::is_online(self).await
    }
}
