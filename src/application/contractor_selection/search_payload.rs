//! Search request template for the catalog scan.
//!
//! The template is either captured from the portal's own search form or
//! built from configuration. Each page request is the template body with
//! paging, keyword, scope and date filters rewritten.

use serde_json::{Map, Value, json};
use url::Url;

use crate::domain::{DateRange, HarvestError, HarvestResult, PipelineTask};
use crate::infrastructure::CapturedRequest;
use crate::infrastructure::config::ContractorSelectionConfig;

const TOKEN_PARAM: &str = "token";

#[derive(Debug, Clone, PartialEq)]
pub struct SearchTemplate {
    /// Replay target, token included
    pub url: String,
    pub body: Value,
    pub headers: Vec<(String, String)>,
    /// Session token shared by every detail endpoint
    pub token: Option<String>,
}

/// Filters applied to one task's search
#[derive(Debug, Clone, Copy)]
pub struct SearchQuery<'a> {
    pub task: &'a PipelineTask,
    pub dates: &'a DateRange,
    pub scope_field: &'a str,
    pub date_field: &'a str,
}

impl SearchTemplate {
    pub fn from_capture(captured: CapturedRequest) -> HarvestResult<Self> {
        let token = captured.query_param(TOKEN_PARAM);
        let body = captured
            .body
            .ok_or_else(|| HarvestError::decode("captured search request has no JSON body"))?;
        Ok(Self {
            url: captured.url,
            body,
            headers: captured.headers,
            token,
        })
    }

    /// Template for runs without page automation; `None` when no search
    /// endpoint is configured.
    pub fn from_config(config: &ContractorSelectionConfig) -> HarvestResult<Option<Self>> {
        let Some(base) = config.search_api_url.as_deref() else {
            return Ok(None);
        };
        Ok(Some(Self {
            url: endpoint_url(base, config.token.as_deref())?,
            body: default_body(config.page_size),
            headers: Vec::new(),
            token: config.token.clone(),
        }))
    }

    pub fn page_body(&self, page_number: u32, page_size: u32, query: &SearchQuery<'_>) -> Value {
        let mut body = self.body.clone();
        let Some(root) = root_mut(&mut body) else {
            return body;
        };
        root.insert("pageNumber".into(), json!(page_number));
        root.insert("pageSize".into(), json!(page_size));

        let nested = root
            .get("query")
            .and_then(Value::as_array)
            .and_then(|q| q.first())
            .is_some_and(Value::is_object);
        let target = if nested {
            root.get_mut("query")
                .and_then(Value::as_array_mut)
                .and_then(|q| q.first_mut())
                .and_then(Value::as_object_mut)
        } else {
            Some(root)
        };
        if let Some(target) = target {
            apply_query(target, query);
        }
        body
    }
}

/// `base` with the session token appended
pub fn endpoint_url(base: &str, token: Option<&str>) -> HarvestResult<String> {
    let mut url =
        Url::parse(base).map_err(|e| HarvestError::Config(format!("invalid endpoint {base}: {e}")))?;
    if let Some(token) = token {
        url.query_pairs_mut().append_pair(TOKEN_PARAM, token);
    }
    Ok(url.into())
}

/// The portal wraps its search object in a one-element array
fn root_mut(body: &mut Value) -> Option<&mut Map<String, Value>> {
    match body {
        Value::Array(items) => items.first_mut().and_then(Value::as_object_mut),
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn apply_query(target: &mut Map<String, Value>, query: &SearchQuery<'_>) {
    target.insert("keyWord".into(), json!(query.task.keyword));

    let mut filters = match target.remove("filters") {
        Some(Value::Array(filters)) => filters,
        _ => Vec::new(),
    };
    filters.retain(|f| {
        let field = f.get("fieldName").and_then(Value::as_str);
        field != Some(query.scope_field) && field != Some(query.date_field)
    });

    if let Some(scope) = &query.task.scope {
        filters.push(json!({
            "fieldName": query.scope_field,
            "searchType": "in",
            "fieldValues": [scope],
        }));
    }
    if !query.dates.is_unbounded() {
        let mut range = Map::new();
        range.insert("fieldName".into(), json!(query.date_field));
        range.insert("searchType".into(), json!("range"));
        if let Some(from) = query.dates.from {
            range.insert("from".into(), json!(format!("{}T00:00:00.000Z", from.format("%Y-%m-%d"))));
        }
        if let Some(to) = query.dates.to {
            range.insert("to".into(), json!(format!("{}T23:59:59.999Z", to.format("%Y-%m-%d"))));
        }
        filters.push(Value::Object(range));
    }
    target.insert("filters".into(), Value::Array(filters));
}

fn default_body(page_size: u32) -> Value {
    json!([{
        "pageSize": page_size,
        "pageNumber": 0,
        "query": [{
            "index": "es-contractor-selection",
            "keyWord": "",
            "matchType": "all-1",
            "matchFields": ["notifyNo", "bidName"],
            "filters": [
                {"fieldName": "type", "searchType": "in", "fieldValues": ["es-notify-contractor"]}
            ]
        }]
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn captured() -> CapturedRequest {
        CapturedRequest {
            url: "https://portal/o/services/smart/search?token=t-42".into(),
            method: "POST".into(),
            headers: vec![("content-type".into(), "application/json".into())],
            body: Some(json!([{
                "pageSize": 10,
                "pageNumber": 0,
                "query": [{
                    "keyWord": "",
                    "filters": [
                        {"fieldName": "type", "searchType": "in", "fieldValues": ["es-notify-contractor"]},
                        {"fieldName": "publicDate", "searchType": "range", "from": "2020-01-01T00:00:00.000Z"}
                    ]
                }]
            }])),
        }
    }

    #[test]
    fn capture_yields_token_and_body() {
        let template = SearchTemplate::from_capture(captured()).unwrap();
        assert_eq!(template.token.as_deref(), Some("t-42"));
        assert!(template.body.is_array());
    }

    #[test]
    fn capture_without_body_is_rejected() {
        let mut request = captured();
        request.body = None;
        assert!(SearchTemplate::from_capture(request).is_err());
    }

    #[test]
    fn page_body_rewrites_paging_and_filters() {
        let template = SearchTemplate::from_capture(captured()).unwrap();
        let task = PipelineTask::new(Some("vn0100".into()), "thuốc");
        let dates = DateRange {
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            to: NaiveDate::from_ymd_opt(2024, 3, 31),
        };
        let query = SearchQuery {
            task: &task,
            dates: &dates,
            scope_field: "investorCode",
            date_field: "publicDate",
        };

        let body = template.page_body(3, 50, &query);
        assert_eq!(body[0]["pageNumber"], json!(3));
        assert_eq!(body[0]["pageSize"], json!(50));

        let inner = &body[0]["query"][0];
        assert_eq!(inner["keyWord"], json!("thuốc"));
        let filters = inner["filters"].as_array().unwrap();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[1]["fieldValues"], json!(["vn0100"]));
        assert_eq!(filters[2]["from"], json!("2024-01-01T00:00:00.000Z"));
        assert_eq!(filters[2]["to"], json!("2024-03-31T23:59:59.999Z"));
    }

    #[test]
    fn configured_endpoint_gets_token_appended() {
        let config = ContractorSelectionConfig {
            search_api_url: Some("https://portal/o/services/smart/search".into()),
            token: Some("abc".into()),
            ..ContractorSelectionConfig::default()
        };
        let template = SearchTemplate::from_config(&config).unwrap().unwrap();
        assert_eq!(template.url, "https://portal/o/services/smart/search?token=abc");

        let without = ContractorSelectionConfig::default();
        assert!(SearchTemplate::from_config(&without).unwrap().is_none());
    }
}
