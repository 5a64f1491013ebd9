//! Client for the downstream dashboard generator.
//!
//! Builds the generation payload from a persisted [`DomainResult`] and posts
//! it to `<endpoint>/api/generate-dashboard`.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use tabcontext_shared::{DashboardConfig, DomainResult, Result, TabContextError};

const GENERATE_PATH: &str = "api/generate-dashboard";

/// Dashboard generation can run a full code-generation pass.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// One tab as the dashboard backend expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardTab {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardRequest {
    pub domain: String,
    pub tabs: Vec<DashboardTab>,
    pub user_prompt: String,
    pub summary: String,
    #[serde(default)]
    pub history: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_token: Option<String>,
}

impl DashboardRequest {
    pub fn from_result(result: &DomainResult) -> Self {
        Self {
            domain: result.domain.as_str().to_string(),
            tabs: result
                .tabs
                .iter()
                .map(|t| DashboardTab {
                    id: t.id,
                    title: t.title.clone(),
                    url: t.url.clone(),
                    content: t.content.clone(),
                })
                .collect(),
            user_prompt: result.user_prompt.clone(),
            summary: result.summary.clone(),
            history: Vec::new(),
            google_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub success: bool,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub selected_template: String,
    #[serde(default)]
    pub ui_props: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub react_code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub sandbox_id: Option<String>,
    #[serde(default)]
    pub sandbox_embed_url: Option<String>,
    #[serde(default)]
    pub sandbox_preview_url: Option<String>,
}

pub struct DashboardClient {
    http: Client,
    endpoint: String,
}

impl DashboardClient {
    pub fn new(config: &DashboardConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TabContextError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Request a dashboard. A response with `success: false` is returned as-is.
    #[instrument(skip_all, fields(domain = %request.domain, tabs = request.tabs.len()))]
    pub async fn generate(&self, request: &DashboardRequest) -> Result<DashboardResponse> {
        let url = format!("{}/{GENERATE_PATH}", self.endpoint);

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| TabContextError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TabContextError::Network(format!("{url}: HTTP {status}: {body}")));
        }

        let parsed: DashboardResponse = response
            .json()
            .await
            .map_err(|e| TabContextError::parse(format!("dashboard response: {e}")))?;

        info!(
            success = parsed.success,
            template = %parsed.selected_template,
            "dashboard generated"
        );
        Ok(parsed)
    }
}
