//! Phase 1: replaying the captured search page by page.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::search_payload::{SearchQuery, SearchTemplate};
use crate::application::paginator::PageSource;
use crate::domain::{HarvestResult, NoticeSummary};
use crate::infrastructure::JsonApi;

pub struct CatalogScan<'a> {
    api: &'a dyn JsonApi,
    template: &'a SearchTemplate,
    query: SearchQuery<'a>,
    page_size: u32,
    /// 0-based, as the search API counts
    page_number: AtomicU32,
    last_page_seen: AtomicBool,
}

impl<'a> CatalogScan<'a> {
    pub fn new(
        api: &'a dyn JsonApi,
        template: &'a SearchTemplate,
        query: SearchQuery<'a>,
        page_size: u32,
    ) -> Self {
        Self {
            api,
            template,
            query,
            page_size,
            page_number: AtomicU32::new(0),
            last_page_seen: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PageSource for CatalogScan<'_> {
    type Item = NoticeSummary;

    async fn fetch_page(&self) -> HarvestResult<Vec<NoticeSummary>> {
        let page_number = self.page_number.load(Ordering::SeqCst);
        let body = self.template.page_body(page_number, self.page_size, &self.query);
        let response = self
            .api
            .post_json(&self.template.url, &body, &self.template.headers)
            .await?;

        let (entries, last) = page_entries(&response);
        self.last_page_seen.store(last, Ordering::SeqCst);
        let summaries: Vec<NoticeSummary> = entries.iter().filter_map(NoticeSummary::from_json).collect();
        debug!(
            "Search page {} returned {} entries ({} usable)",
            page_number,
            entries.len(),
            summaries.len()
        );
        Ok(summaries)
    }

    async fn has_next(&self) -> HarvestResult<bool> {
        Ok(!self.last_page_seen.load(Ordering::SeqCst))
    }

    async fn advance(&self) -> HarvestResult<()> {
        self.page_number.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Entries of a search response and whether it declares itself the last
/// page. Accepts `{page: {content}}`, `{content}` and bare arrays.
pub fn page_entries(response: &Value) -> (&[Value], bool) {
    let page = response.get("page").unwrap_or(response);
    let entries = page
        .get("content")
        .and_then(Value::as_array)
        .or_else(|| response.as_array())
        .map_or(&[][..], Vec::as_slice);

    let flagged_last = page.get("last").and_then(Value::as_bool).unwrap_or(false);
    let beyond_total = match (
        page.get("number").and_then(Value::as_u64),
        page.get("totalPages").and_then(Value::as_u64),
    ) {
        (Some(number), Some(total)) => number + 1 >= total,
        _ => false,
    };
    (entries, flagged_last || beyond_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_page_content_is_found() {
        let response = json!({
            "page": {
                "content": [{"notifyNo": "IB1"}, {"notifyNo": "IB2"}],
                "number": 0,
                "totalPages": 3,
                "last": false
            }
        });
        let (entries, last) = page_entries(&response);
        assert_eq!(entries.len(), 2);
        assert!(!last);
    }

    #[test]
    fn last_page_is_detected_from_totals() {
        let response = json!({"content": [{"notifyNo": "IB9"}], "number": 2, "totalPages": 3});
        let (entries, last) = page_entries(&response);
        assert_eq!(entries.len(), 1);
        assert!(last);
    }

    #[test]
    fn bare_array_and_unknown_shapes() {
        let bare = json!([{"notifyNo": "IB1"}]);
        let (entries, last) = page_entries(&bare);
        assert_eq!(entries.len(), 1);
        assert!(!last);

        let unknown = json!({"message": "unauthorized"});
        let (entries, _) = page_entries(&unknown);
        assert!(entries.is_empty());
    }
}
