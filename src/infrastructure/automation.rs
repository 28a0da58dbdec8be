//! Seams to the outside world the harvester drives.
//!
//! `PageAutomation` is a rendered page (selector-addressed reads, clicks,
//! navigation, network capture). `JsonApi` is a JSON POST client sharing
//! the session. `LivenessProbe` answers "are we online".

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

/// Request observed on the wire while driving a page
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl CapturedRequest {
    pub fn query_param(&self, name: &str) -> Option<String> {
        Url::parse(&self.url).ok().and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.is_empty())
        })
    }

    /// Adds the page's cookies as a `Cookie` header. Requests observed
    /// through the browser carry none; an existing header is kept.
    pub fn attach_cookies(&mut self, cookies: &[(String, String)]) {
        if cookies.is_empty()
            || self
                .headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("cookie"))
        {
            return;
        }
        let value = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        self.headers.push(("Cookie".into(), value));
    }
}

#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_online(&self) -> Result<bool>;
}

#[async_trait]
pub trait PageAutomation: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Waits until `selector` matches at least one element
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn count(&self, selector: &str) -> Result<usize>;

    /// Inner text of the `index`-th match, `None` when there is no such match
    async fn text(&self, selector: &str, index: usize) -> Result<Option<String>>;

    async fn attribute(&self, selector: &str, index: usize, name: &str) -> Result<Option<String>>;

    async fn is_visible(&self, selector: &str, index: usize) -> Result<bool>;

    async fn is_enabled(&self, selector: &str, index: usize) -> Result<bool>;

    async fn click(&self, selector: &str, index: usize, timeout: Duration) -> Result<()>;

    /// Replaces the value of an input
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    async fn press(&self, selector: &str, key: &str) -> Result<()>;

    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;

    async fn go_back(&self, timeout: Duration) -> Result<()>;

    async fn reload(&self, timeout: Duration) -> Result<()>;

    async fn scroll_to_bottom(&self) -> Result<()>;

    /// Serialized DOM of the current page
    async fn content(&self) -> Result<String>;

    /// The page's own view of connectivity (`navigator.onLine`)
    async fn is_online(&self) -> Result<bool>;

    /// Starts recording the next request whose URL contains `url_fragment`
    async fn arm_request_capture(&self, url_fragment: &str) -> Result<()>;

    async fn take_captured_request(&self, timeout: Duration) -> Result<CapturedRequest>;
}

#[async_trait]
pub trait JsonApi: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value, headers: &[(String, String)]) -> Result<Value>;
}

/// Probes connectivity through a page
pub struct PageProbe<'a>(pub &'a dyn PageAutomation);

#[async_trait]
impl LivenessProbe for PageProbe<'_> {
    async fn is_online(&self) -> Result<bool> {
        self.0.is_online().await
    }
}
