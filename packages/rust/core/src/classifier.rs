//! Chat-completions client for the external classification service.
//!
//! Every call asks for a JSON object response; the caller decodes the
//! returned content string. Failures are plain errors here: the clustering
//! and resolution stages decide how to degrade.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use tabcontext_shared::{ClassifierConfig, Result, TabContextError};

/// User-Agent string for classification requests.
const USER_AGENT: &str = concat!("TabContext/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_completion_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Sampling parameters for one call.
#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub temperature: f32,
    pub max_completion_tokens: u32,
}

pub struct ClassifierClient {
    http: Client,
    config: ClassifierConfig,
}

impl ClassifierClient {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        Self::with_timeout(config, Duration::from_secs(config.timeout_secs))
    }

    /// Same as [`ClassifierClient::new`] with an explicit HTTP timeout.
    pub fn with_timeout(config: &ClassifierConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TabContextError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Sampling used for clustering calls.
    pub fn cluster_sampling(&self) -> Sampling {
        Sampling {
            temperature: self.config.cluster_temperature,
            max_completion_tokens: self.config.cluster_max_tokens,
        }
    }

    /// Sampling used for free-text domain resolution.
    pub fn resolve_sampling(&self) -> Sampling {
        Sampling {
            temperature: self.config.resolve_temperature,
            max_completion_tokens: self.config.resolve_max_tokens,
        }
    }

    /// Send one completion request and return the message content.
    ///
    /// With `retry_once` enabled a failed call is attempted a second time.
    #[instrument(skip_all, fields(model = %self.config.model, messages = messages.len()))]
    pub async fn complete(
        &self,
        token: &str,
        messages: &[ChatMessage],
        sampling: Sampling,
    ) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: sampling.temperature,
            max_completion_tokens: sampling.max_completion_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        match self.send_request(token, &body).await {
            Err(e) if self.config.retry_once => {
                warn!(error = %e, "classification call failed, retrying once");
                self.send_request(token, &body).await
            }
            other => other,
        }
    }

    async fn send_request(&self, token: &str, body: &ChatCompletionRequest<'_>) -> Result<String> {
        let start = std::time::Instant::now();

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timed out" } else { "failed" };
                TabContextError::Classifier(format!("request {kind}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(map_http_error(status, &body_text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| TabContextError::Classifier(format!("invalid response body: {e}")))?;

        debug!(
            latency_ms = start.elapsed().as_millis(),
            "classification call completed"
        );

        extract_content(parsed)
    }
}

fn extract_content(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| TabContextError::Classifier("response contained no content".into()))
}

fn map_http_error(status: StatusCode, body: &str) -> TabContextError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.to_string());
    TabContextError::Classifier(format!("HTTP {status}: {message}"))
}
