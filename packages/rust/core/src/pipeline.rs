//! Pipeline orchestration: collect → cluster → select → resolve.
//!
//! Every stage is a discrete request against the [`Pipeline`]. The only state
//! shared between requests is what the [`SessionStore`] holds; overlapping
//! runs are not coordinated, so the last one to write wins.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use tabcontext_collector::{TabFilter, TabHost, collect_tabs};
use tabcontext_shared::{
    Cluster, Domain, DomainResult, PipelineState, Result, SessionKey, SessionRecord,
    TabContextError,
};
use tabcontext_storage::SessionStore;

use crate::classifier::ClassifierClient;
use crate::clustering::cluster_tabs;
use crate::resolver::resolve_domain;

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once tab collection has finished.
    fn tabs_collected(&self, count: usize);
    /// Called when a stage completes successfully.
    fn done(&self, message: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn tabs_collected(&self, _count: usize) {}
    fn done(&self, _message: &str) {}
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// Recognized actions, as they appear in the `action` tag.
pub const ACTIONS: [&str; 5] = [
    "clusterTabs",
    "selectCluster",
    "getClusters",
    "getDomainResult",
    "getState",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PipelineRequest {
    ClusterTabs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    SelectCluster {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, alias = "clusterId")]
        cluster_id: Option<i64>,
        #[serde(default, alias = "userPrompt")]
        user_prompt: String,
    },
    GetClusters,
    GetDomainResult,
    GetState,
}

/// Exactly one response is produced per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineResponse {
    /// Result of `clusterTabs` and `getClusters`. `None` if never clustered.
    Clusters { clusters: Option<Vec<Cluster>> },
    /// Result of `selectCluster` and `getDomainResult`. `None` if never resolved.
    DomainResult { domain_result: Option<DomainResult> },
    State(StateReport),
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
    Unhandled { action: String },
}

impl PipelineResponse {
    pub fn from_error(err: &TabContextError) -> Self {
        Self::Error {
            error: err.to_string(),
            hint: err.hint().map(String::from),
        }
    }
}

/// Snapshot returned by `getState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateReport {
    pub state: PipelineState,
    pub cluster_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cluster_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Counts stages currently running, so `getState` can report transient states.
#[derive(Debug, Default)]
struct InFlight {
    clustering: AtomicUsize,
    resolving: AtomicUsize,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Pipeline<H, S> {
    host: Arc<H>,
    store: Arc<S>,
    classifier: Arc<ClassifierClient>,
    filter: TabFilter,
    in_flight: Arc<InFlight>,
}

impl<H, S> Clone for Pipeline<H, S> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            store: self.store.clone(),
            classifier: self.classifier.clone(),
            filter: self.filter.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<H: TabHost, S: SessionStore> Pipeline<H, S> {
    pub fn new(host: H, store: S, classifier: ClassifierClient, filter: TabFilter) -> Self {
        Self {
            host: Arc::new(host),
            store: Arc::new(store),
            classifier: Arc::new(classifier),
            filter,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Collect and cluster the open tabs, then persist the clusters.
    #[instrument(skip_all, fields(run_id = %Uuid::now_v7()))]
    pub async fn cluster_tabs(
        &self,
        token: Option<&str>,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<Cluster>> {
        let token = require_token(token)?;
        let _guard = InFlightGuard::enter(&self.in_flight.clustering);
        let start = Instant::now();

        progress.phase("Collecting tabs");
        let tabs = collect_tabs(self.host.clone(), &self.filter).await?;
        progress.tabs_collected(tabs.len());
        if tabs.is_empty() {
            return Err(TabContextError::NoEligibleTabs);
        }

        progress.phase("Clustering tabs");
        let clusters = cluster_tabs(&self.classifier, token, &tabs).await;

        self.store
            .set(SessionRecord {
                clusters: Some(clusters.clone()),
                last_cluster_time: Some(Utc::now()),
                domain_result: None,
            })
            .await?;

        info!(
            tabs = tabs.len(),
            clusters = clusters.len(),
            duration_ms = start.elapsed().as_millis(),
            "clustering run completed"
        );
        progress.done(&format!("{} tabs in {} clusters", tabs.len(), clusters.len()));

        Ok(clusters)
    }

    /// Resolve the domain of a persisted cluster and persist the result.
    #[instrument(skip_all, fields(run_id = %Uuid::now_v7(), cluster_id))]
    pub async fn select_cluster(
        &self,
        token: Option<&str>,
        cluster_id: Option<i64>,
        user_prompt: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<DomainResult> {
        let token = require_token(token)?;
        let cluster_id = cluster_id.ok_or_else(|| TabContextError::validation("cluster_id is required"))?;
        tracing::Span::current().record("cluster_id", cluster_id);
        let _guard = InFlightGuard::enter(&self.in_flight.resolving);

        let record = self.store.get(&[SessionKey::Clusters]).await?;
        let clusters = record
            .clusters
            .ok_or_else(|| TabContextError::not_found("no clusters have been computed yet"))?;
        let cluster = clusters
            .into_iter()
            .find(|c| c.cluster_id == cluster_id)
            .ok_or_else(|| TabContextError::not_found(format!("cluster {cluster_id} does not exist")))?;

        progress.phase("Resolving domain");
        let result = resolve_domain(&self.classifier, token, &cluster, user_prompt).await;

        self.store
            .set(SessionRecord {
                domain_result: Some(result.clone()),
                ..Default::default()
            })
            .await?;

        progress.done(&format!("domain: {}", result.domain));
        Ok(result)
    }

    /// Last persisted cluster list, without recomputation.
    pub async fn clusters(&self) -> Result<Option<Vec<Cluster>>> {
        Ok(self.store.get(&[SessionKey::Clusters]).await?.clusters)
    }

    /// Last persisted domain result, without recomputation.
    pub async fn domain_result(&self) -> Result<Option<DomainResult>> {
        Ok(self.store.get(&[SessionKey::DomainResult]).await?.domain_result)
    }

    pub async fn state(&self) -> Result<StateReport> {
        let record = self.store.get(&SessionKey::ALL).await?;

        let state = if self.in_flight.clustering.load(Ordering::SeqCst) > 0 {
            PipelineState::Extracting
        } else if self.in_flight.resolving.load(Ordering::SeqCst) > 0 {
            PipelineState::Resolving
        } else {
            PipelineState::from_record(&record)
        };

        Ok(StateReport {
            state,
            cluster_count: record.clusters.as_ref().map_or(0, Vec::len),
            last_cluster_time: record.last_cluster_time,
            domain: record.domain_result.map(|r| r.domain),
        })
    }

    /// Answer one request. Never fails: errors become [`PipelineResponse::Error`].
    pub async fn handle(&self, request: PipelineRequest) -> PipelineResponse {
        self.handle_with_progress(request, &SilentProgress).await
    }

    pub async fn handle_with_progress(
        &self,
        request: PipelineRequest,
        progress: &dyn ProgressReporter,
    ) -> PipelineResponse {
        let outcome = match request {
            PipelineRequest::ClusterTabs { token } => self
                .cluster_tabs(token.as_deref(), progress)
                .await
                .map(|clusters| PipelineResponse::Clusters {
                    clusters: Some(clusters),
                }),
            PipelineRequest::SelectCluster {
                token,
                cluster_id,
                user_prompt,
            } => self
                .select_cluster(token.as_deref(), cluster_id, &user_prompt, progress)
                .await
                .map(|result| PipelineResponse::DomainResult {
                    domain_result: Some(result),
                }),
            PipelineRequest::GetClusters => self
                .clusters()
                .await
                .map(|clusters| PipelineResponse::Clusters { clusters }),
            PipelineRequest::GetDomainResult => self
                .domain_result()
                .await
                .map(|domain_result| PipelineResponse::DomainResult { domain_result }),
            PipelineRequest::GetState => self.state().await.map(PipelineResponse::State),
        };

        outcome.unwrap_or_else(|e| {
            warn!(error = %e, "request failed");
            PipelineResponse::from_error(&e)
        })
    }

    /// Answer one raw JSON request.
    ///
    /// Unrecognized actions get [`PipelineResponse::Unhandled`]; malformed
    /// requests get an error response.
    pub async fn handle_json(&self, raw: &str) -> PipelineResponse {
        match parse_request(raw) {
            Ok(request) => self.handle(request).await,
            Err(response) => response,
        }
    }
}

fn require_token(token: Option<&str>) -> Result<&str> {
    token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(TabContextError::MissingCredential)
}

/// Decode a request, classifying failures into the response to send back.
pub fn parse_request(raw: &str) -> std::result::Result<PipelineRequest, PipelineResponse> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
        PipelineResponse::from_error(&TabContextError::parse(format!("invalid request JSON: {e}")))
    })?;

    let action = value
        .get("action")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();

    if !ACTIONS.contains(&action.as_str()) {
        return Err(PipelineResponse::Unhandled { action });
    }

    serde_json::from_value(value).map_err(|e| {
        PipelineResponse::from_error(&TabContextError::validation(format!("invalid '{action}' request: {e}")))
    })
}

// ---------------------------------------------------------------------------
// Channel service
// ---------------------------------------------------------------------------

struct Envelope {
    request: PipelineRequest,
    reply: tokio::sync::oneshot::Sender<PipelineResponse>,
}

/// Cloneable handle to a running pipeline service.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: tokio::sync::mpsc::Sender<Envelope>,
}

impl PipelineHandle {
    /// Send a request and wait for its response.
    pub async fn request(&self, request: PipelineRequest) -> Result<PipelineResponse> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| TabContextError::ChannelClosed)?;
        rx.await.map_err(|_| TabContextError::ChannelClosed)
    }

    /// Like [`request`](Self::request), but a lost service or handler task
    /// becomes an error response, so every request is answered.
    pub async fn answer(&self, request: PipelineRequest) -> PipelineResponse {
        match self.request(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "pipeline request went unanswered");
                PipelineResponse::from_error(&e)
            }
        }
    }
}

/// Serves requests over an mpsc channel, each in its own task.
pub struct PipelineService;

impl PipelineService {
    /// Start the service loop. It stops once every handle is dropped.
    pub fn spawn<H: TabHost, S: SessionStore>(pipeline: Pipeline<H, S>) -> PipelineHandle {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<Envelope>(32);

        tokio::spawn(async move {
            while let Some(Envelope { request, reply }) = rx.recv().await {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    let response = pipeline.handle(request).await;
                    let _ = reply.send(response);
                });
            }
            info!("pipeline service stopped");
        });

        PipelineHandle { tx }
    }
}
