//! Tab host backed by a Chromium remote-debugging endpoint.
//!
//! Tabs come from `GET /json/list`; each tab's document is fetched over HTTP
//! from its URL.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use tabcontext_shared::{CollectorConfig, Result, TabContextError};

use crate::host::{BrowserTab, TabHost};

/// User-Agent string for document requests.
const USER_AGENT: &str = concat!("TabContext/", env!("CARGO_PKG_VERSION"));

/// One entry of the `/json/list` response.
#[derive(Debug, Deserialize)]
struct DevToolsTarget {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Reads tabs from a browser started with `--remote-debugging-port`.
pub struct DevToolsHost {
    base_url: Url,
    client: Client,
}

impl DevToolsHost {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let base_url = Url::parse(&config.devtools_url).map_err(|e| {
            TabContextError::config(format!("invalid devtools_url '{}': {e}", config.devtools_url))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| TabContextError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { base_url, client })
    }
}

impl TabHost for DevToolsHost {
    async fn list_tabs(&self) -> Result<Vec<BrowserTab>> {
        let list_url = self
            .base_url
            .join("json/list")
            .map_err(|e| TabContextError::config(format!("invalid devtools_url: {e}")))?;

        let response = self.client.get(list_url.as_str()).send().await.map_err(|e| {
            TabContextError::Network(format!("browser not reachable at {}: {e}", self.base_url))
        })?;

        if !response.status().is_success() {
            return Err(TabContextError::Network(format!(
                "{list_url}: HTTP {}",
                response.status()
            )));
        }

        let targets: Vec<DevToolsTarget> = response
            .json()
            .await
            .map_err(|e| TabContextError::parse(format!("invalid /json/list response: {e}")))?;

        let tabs: Vec<BrowserTab> = targets
            .into_iter()
            .filter(|t| t.kind == "page")
            .enumerate()
            .map(|(idx, t)| BrowserTab {
                index: idx,
                id: idx as i64 + 1,
                title: t.title,
                url: t.url,
            })
            .collect();

        debug!(count = tabs.len(), "listed browser tabs");
        Ok(tabs)
    }

    async fn document(&self, tab: &BrowserTab) -> Result<String> {
        let raw = tab.url.as_deref().unwrap_or_default();
        let url = Url::parse(raw)
            .map_err(|e| TabContextError::validation(format!("invalid tab url '{raw}': {e}")))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(TabContextError::validation(format!(
                "cannot read document for scheme '{}'",
                url.scheme()
            )));
        }

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| TabContextError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TabContextError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| TabContextError::Network(format!("{url}: body read failed: {e}")))
    }
}
