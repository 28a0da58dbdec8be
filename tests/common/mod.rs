//! In-memory stand-ins for the page automation and JSON API seams
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;

use eps_harvest::application::ControlHandle;
use eps_harvest::domain::Row;
use eps_harvest::infrastructure::config::{AppConfig, PacingConfig};
use eps_harvest::infrastructure::{CapturedRequest, CsvTableStore, JsonApi, LivenessProbe, PageAutomation, TableStore};

const SEARCH_INPUT: &str = r#"input[placeholder="Tìm kiếm chủ đầu tư"]"#;
const ITEM_TITLE: &str = "h2.content__body__item__title";
const ITEM_CARD: &str = ".content__body__item";
const BACK_BUTTON: &str = "button.btn-back";
const NEXT_BUTTON: &str = "button.btn-next";

/// Config with no pacing delays and quick retries
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.pacing = PacingConfig::immediate();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter_ms = 0;
    config.connectivity.poll_interval_ms = 10;
    config
}

pub fn row(pairs: &[(&str, &str)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub fn read_rows(path: &Path) -> Vec<Row> {
    CsvTableStore::new()
        .load_rows(path)
        .unwrap()
        .map(|table| table.rows)
        .unwrap_or_default()
}

pub struct AlwaysOnline;

#[async_trait]
impl LivenessProbe for AlwaysOnline {
    async fn is_online(&self) -> Result<bool> {
        Ok(true)
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: String,
    pub name: String,
}

impl Entry {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Blank,
    Search,
    Listing,
    Detail(usize),
}

struct Surface {
    view: View,
    page: usize,
}

/// The approved-investor registry, rendered from fixed pages of entries.
/// The next button stays visible on the last page but is disabled.
pub struct FakeRegistry {
    pages: Vec<Vec<Entry>>,
    surface: Mutex<Surface>,
    opened: Mutex<Vec<String>>,
    next_clicks: Mutex<usize>,
    cancel_after: Mutex<Option<(usize, ControlHandle)>>,
    disabled_next_clicked: AtomicBool,
    listing_ids: bool,
}

impl FakeRegistry {
    pub fn new(pages: Vec<Vec<Entry>>) -> Self {
        Self {
            pages,
            surface: Mutex::new(Surface {
                view: View::Blank,
                page: 0,
            }),
            opened: Mutex::new(Vec::new()),
            next_clicks: Mutex::new(0),
            cancel_after: Mutex::new(None),
            disabled_next_clicked: AtomicBool::new(false),
            listing_ids: true,
        }
    }

    /// Listing cards show only titles; ids appear on the detail view
    pub fn without_listing_ids(mut self) -> Self {
        self.listing_ids = false;
        self
    }

    /// Cancels the run once `opens` detail views have been opened
    pub fn cancel_after(&self, opens: usize, handle: ControlHandle) {
        *self.cancel_after.lock().unwrap() = Some((opens, handle));
    }

    /// Identifiers of every detail view opened, in order
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn next_clicks(&self) -> usize {
        *self.next_clicks.lock().unwrap()
    }

    pub fn disabled_next_clicked(&self) -> bool {
        self.disabled_next_clicked.load(Ordering::SeqCst)
    }

    fn current_entries(&self, surface: &Surface) -> &[Entry] {
        self.pages.get(surface.page).map_or(&[][..], Vec::as_slice)
    }

    fn has_next(&self, surface: &Surface) -> bool {
        surface.page + 1 < self.pages.len()
    }

    fn count_in(&self, surface: &Surface, selector: &str) -> usize {
        match (selector, surface.view) {
            (SEARCH_INPUT, View::Search | View::Listing) => 1,
            (ITEM_TITLE | ITEM_CARD, View::Listing) => self.current_entries(surface).len(),
            (BACK_BUTTON, View::Detail(_)) => 1,
            (NEXT_BUTTON, View::Listing) => 1,
            _ => 0,
        }
    }

    fn listing_html(&self, surface: &Surface) -> String {
        let cards: String = self
            .current_entries(surface)
            .iter()
            .map(|entry| {
                let heading = if self.listing_ids {
                    format!(r#"<h4 class="content__body__item__heading__text">{}</h4>"#, entry.id)
                } else {
                    String::new()
                };
                format!(
                    r#"<div class="content__body__item">
                         {heading}
                         <h2 class="content__body__item__title">{}</h2>
                       </div>"#,
                    entry.name
                )
            })
            .collect();
        format!(
            r#"<html><body><input placeholder="Tìm kiếm chủ đầu tư">{cards}<button class="btn-next">›</button></body></html>"#
        )
    }

    fn detail_html(entry: &Entry) -> String {
        format!(
            r#"<html><body>
                 <button class="btn-back">Quay lại</button>
                 <div class="content-body__header">{name}</div>
                 <div class="infomation-course__content">
                   <div class="infomation-course__content__title">Mã định danh</div>
                   <div>{id}</div>
                 </div>
                 <div class="infomation-course__content">
                   <div class="infomation-course__content__title">Tên chủ đầu tư</div>
                   <div>{name}</div>
                 </div>
                 <div class="infomation-course__content">
                   <div class="infomation-course__content__title">Địa chỉ</div>
                   <div>Hà Nội</div>
                 </div>
               </body></html>"#,
            id = entry.id,
            name = entry.name
        )
    }
}

#[async_trait]
impl PageAutomation for FakeRegistry {
    async fn goto(&self, _url: &str, _timeout: Duration) -> Result<()> {
        let mut surface = self.surface.lock().unwrap();
        surface.view = View::Search;
        surface.page = 0;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<()> {
        let surface = self.surface.lock().unwrap();
        if self.count_in(&surface, selector) > 0 {
            Ok(())
        } else {
            Err(anyhow!("timed out waiting for {selector}"))
        }
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let surface = self.surface.lock().unwrap();
        Ok(self.count_in(&surface, selector))
    }

    async fn text(&self, selector: &str, index: usize) -> Result<Option<String>> {
        let surface = self.surface.lock().unwrap();
        if selector == ITEM_TITLE && surface.view == View::Listing {
            return Ok(self.current_entries(&surface).get(index).map(|e| e.name.clone()));
        }
        Ok(None)
    }

    async fn attribute(&self, _selector: &str, _index: usize, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn is_visible(&self, selector: &str, index: usize) -> Result<bool> {
        let surface = self.surface.lock().unwrap();
        Ok(index < self.count_in(&surface, selector))
    }

    async fn is_enabled(&self, selector: &str, _index: usize) -> Result<bool> {
        let surface = self.surface.lock().unwrap();
        Ok(selector != NEXT_BUTTON || self.has_next(&surface))
    }

    async fn click(&self, selector: &str, index: usize, _timeout: Duration) -> Result<()> {
        let opened_now = {
            let mut surface = self.surface.lock().unwrap();
            match (selector, surface.view) {
                (ITEM_TITLE, View::Listing) => {
                    let Some(entry) = self.current_entries(&surface).get(index).cloned() else {
                        bail!("no entry {index}");
                    };
                    surface.view = View::Detail(index);
                    let mut opened = self.opened.lock().unwrap();
                    opened.push(entry.id);
                    Some(opened.len())
                }
                (BACK_BUTTON, View::Detail(_)) => {
                    surface.view = View::Listing;
                    None
                }
                (NEXT_BUTTON, View::Listing) => {
                    if !self.has_next(&surface) {
                        self.disabled_next_clicked.store(true, Ordering::SeqCst);
                        bail!("next button is disabled");
                    }
                    surface.page += 1;
                    *self.next_clicks.lock().unwrap() += 1;
                    None
                }
                _ => bail!("{selector} is not clickable here"),
            }
        };

        if let Some(opens) = opened_now {
            if let Some((limit, handle)) = self.cancel_after.lock().unwrap().as_ref() {
                if opens >= *limit {
                    handle.cancel();
                }
            }
        }
        Ok(())
    }

    async fn fill(&self, _selector: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn press(&self, selector: &str, key: &str) -> Result<()> {
        let mut surface = self.surface.lock().unwrap();
        if selector == SEARCH_INPUT && key == "Enter" && surface.view == View::Search {
            surface.view = View::Listing;
            surface.page = 0;
        }
        Ok(())
    }

    async fn select_option(&self, _selector: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn go_back(&self, _timeout: Duration) -> Result<()> {
        let mut surface = self.surface.lock().unwrap();
        if let View::Detail(_) = surface.view {
            surface.view = View::Listing;
        }
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> Result<()> {
        let mut surface = self.surface.lock().unwrap();
        surface.view = View::Search;
        surface.page = 0;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        let surface = self.surface.lock().unwrap();
        Ok(match surface.view {
            View::Blank => "<html><body></body></html>".to_string(),
            View::Search | View::Listing => self.listing_html(&surface),
            View::Detail(index) => match self.current_entries(&surface).get(index) {
                Some(entry) => Self::detail_html(entry),
                None => "<html><body></body></html>".to_string(),
            },
        })
    }

    async fn is_online(&self) -> Result<bool> {
        Ok(true)
    }

    async fn arm_request_capture(&self, _url_fragment: &str) -> Result<()> {
        Ok(())
    }

    async fn take_captured_request(&self, _timeout: Duration) -> Result<CapturedRequest> {
        Err(anyhow!("no request captured"))
    }
}

/// JSON API answering by URL fragment; every call is recorded
pub struct FakeApi {
    routes: Vec<(&'static str, Box<dyn Fn(&Value) -> Value + Send + Sync>)>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// First matching fragment wins
    pub fn route(
        mut self,
        fragment: &'static str,
        respond: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.routes.push((fragment, Box::new(respond)));
        self
    }

    /// Request bodies sent to URLs containing `fragment`
    pub fn bodies(&self, fragment: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.contains(fragment))
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }
}

#[async_trait]
impl JsonApi for FakeApi {
    async fn post_json(&self, url: &str, body: &Value, _headers: &[(String, String)]) -> Result<Value> {
        self.calls.lock().unwrap().push((url.to_string(), body.clone()));
        self.routes
            .iter()
            .find(|(fragment, _)| url.contains(fragment))
            .map(|(_, respond)| respond(body))
            .ok_or_else(|| anyhow!("no route for {url}"))
    }
}

/// Lookup of JSON responses keyed by one request field
pub fn keyed(field: &'static str, responses: HashMap<&'static str, Value>) -> impl Fn(&Value) -> Value {
    move |body: &Value| {
        body.get(field)
            .and_then(Value::as_str)
            .and_then(|key| responses.get(key).cloned())
            .unwrap_or(Value::Null)
    }
}
