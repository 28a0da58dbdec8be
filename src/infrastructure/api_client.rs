//! JSON API client with rate limiting and a shared cookie session
//!
//! Backs the `JsonApi` seam for the contractor-selection phases and doubles
//! as a `LivenessProbe` for runs that never open a page.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::HarvestError;
use crate::infrastructure::automation::{JsonApi, LivenessProbe};
use crate::infrastructure::config::NetworkConfig;

/// Headers the browser sends that must not be replayed verbatim
const HOP_HEADERS: &[&str] = &["content-length", "host", "connection", "accept-encoding"];

/// Configuration for API client behavior
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub max_requests_per_second: u32,
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub probe_url: String,
    pub accept_invalid_certs: bool,
}

impl ApiClientConfig {
    pub fn from_network_config(network: &NetworkConfig) -> Self {
        Self {
            max_requests_per_second: network.max_requests_per_second,
            timeout_seconds: network.request_timeout_seconds,
            user_agent: network.user_agent.clone(),
            probe_url: network.probe_url.clone(),
            accept_invalid_certs: network.accept_invalid_certs,
        }
    }
}

pub struct ApiClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: ApiClientConfig,
}

impl ApiClient {
    pub fn with_config(config: ApiClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        let per_second = NonZeroU32::new(config.max_requests_per_second)
            .ok_or_else(|| anyhow!("max_requests_per_second must be positive"))?;

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
            config,
        })
    }

    fn replay_headers(headers: &[(String, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            if HOP_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => debug!("Dropping unreplayable header {}", name),
            }
        }
        map
    }
}

#[async_trait]
impl JsonApi for ApiClient {
    async fn post_json(&self, url: &str, body: &Value, headers: &[(String, String)]) -> Result<Value> {
        self.rate_limiter.until_ready().await;
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .headers(Self::replay_headers(headers))
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            warn!("HTTP {} from {}", status.as_u16(), url);
            return Err(HarvestError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read body from {url}"))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| HarvestError::decode(format!("{url}: {e}")).into())
    }
}

#[async_trait]
impl LivenessProbe for ApiClient {
    /// Any HTTP answer from the probe URL counts as online
    async fn is_online(&self) -> Result<bool> {
        match self.client.head(&self.config.probe_url).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.is_connect() || e.is_timeout() => Ok(false),
            Err(e) => Err(anyhow!("Probe of {} failed: {}", self.config.probe_url, e)),
        }
    }
}
