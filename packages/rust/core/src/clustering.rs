//! Tab clustering through the classification service.
//!
//! Clustering degrades but never fails: any service error, malformed
//! response, or response that leaves no usable cluster produces a single
//! fallback cluster holding every tab.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use tabcontext_shared::{Cluster, Domain, Result, TabContextError, TabRecord};

use crate::classifier::{ChatMessage, ClassifierClient};

/// Characters of page content shown to the classifier per tab.
const PREVIEW_CHARS: usize = 150;

pub const FALLBACK_CLUSTER_ID: i64 = 0;
pub const FALLBACK_SUMMARY: &str = "All open tabs";
pub const FALLBACK_NAME: &str = "All Tabs";

const SYSTEM_PROMPT: &str = r#"You organize a user's open browser tabs into topical clusters.

Assign every tab to exactly one cluster. Produce between 1 and 5 clusters.
Each cluster gets one domain from this list:
- study: research, courses, papers, documentation read for learning
- shopping: products, price comparison, stores, reviews of things to buy
- travel: flights, hotels, destinations, itineraries, maps
- code: repositories, issues, API references, developer tools
- entertainment: video, music, games, streaming, social feeds
- generic: anything that fits none of the above

Respond with strict JSON only, in exactly this shape:
{"clusters": [{"cluster_id": 0, "tab_numbers": [1, 2], "domain": "study", "summary": "one sentence describing the group", "cluster_name": "short label"}]}

tab_numbers refer to the numbers in the tab list."#;

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

/// Accepted response shapes: the documented object, or the clusters array alone.
/// Entries stay raw so one malformed entry does not sink the others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClusterResponse {
    Wrapped { clusters: Vec<Value> },
    Bare(Vec<Value>),
}

impl ClusterResponse {
    fn into_entries(self) -> Vec<Value> {
        match self {
            Self::Wrapped { clusters } | Self::Bare(clusters) => clusters,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCluster {
    #[serde(default)]
    cluster_id: Option<i64>,
    #[serde(default)]
    tab_numbers: Vec<i64>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    cluster_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Group `tabs` into clusters. Empty input returns an empty list without a
/// service call; every other input returns at least one cluster.
#[instrument(skip_all, fields(tabs = tabs.len()))]
pub async fn cluster_tabs(client: &ClassifierClient, token: &str, tabs: &[TabRecord]) -> Vec<Cluster> {
    if tabs.is_empty() {
        return Vec::new();
    }

    let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(tab_listing(tabs))];

    let clusters = match client.complete(token, &messages, client.cluster_sampling()).await {
        Ok(content) => match parse_clusters(&content, tabs) {
            Ok(clusters) if !clusters.is_empty() => clusters,
            Ok(_) => {
                warn!("classification response left no usable cluster, using fallback");
                vec![fallback_cluster(tabs)]
            }
            Err(e) => {
                warn!(error = %e, "unreadable classification response, using fallback");
                vec![fallback_cluster(tabs)]
            }
        },
        Err(e) => {
            warn!(error = %e, "classification call failed, using fallback");
            vec![fallback_cluster(tabs)]
        }
    };

    info!(clusters = clusters.len(), "tabs clustered");
    clusters
}

/// The single cluster used whenever classification is unusable.
pub fn fallback_cluster(tabs: &[TabRecord]) -> Cluster {
    Cluster {
        cluster_id: FALLBACK_CLUSTER_ID,
        tabs: tabs.to_vec(),
        domain: Domain::Generic,
        summary: FALLBACK_SUMMARY.into(),
        cluster_name: FALLBACK_NAME.into(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tab_listing(tabs: &[TabRecord]) -> String {
    let mut listing = String::from("Open tabs:\n");
    for (idx, tab) in tabs.iter().enumerate() {
        let preview = tabcontext_extractor::truncate_chars(&tab.content, PREVIEW_CHARS);
        listing.push_str(&format!(
            "\nTab {}:\nTitle: {}\nURL: {}\nContent: {}\n",
            idx + 1,
            tab.title,
            tab.url,
            preview
        ));
    }
    listing
}

/// Decode the response content and map tab numbers back onto `tabs`.
fn parse_clusters(content: &str, tabs: &[TabRecord]) -> Result<Vec<Cluster>> {
    let response: ClusterResponse = serde_json::from_str(content)
        .map_err(|e| TabContextError::parse(format!("cluster response: {e}")))?;

    let usable: Vec<(RawCluster, Vec<usize>)> = response
        .into_entries()
        .into_iter()
        .enumerate()
        .filter_map(|(position, entry)| match serde_json::from_value::<RawCluster>(entry) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!(position, error = %e, "skipping unreadable cluster entry");
                None
            }
        })
        .filter_map(|raw| {
            let indices = tab_indices(&raw.tab_numbers, tabs.len());
            (!indices.is_empty()).then_some((raw, indices))
        })
        .collect();

    let requested: Vec<Option<i64>> = usable.iter().map(|(raw, _)| raw.cluster_id).collect();
    let clusters = usable
        .into_iter()
        .zip(assign_ids(&requested))
        .map(|((raw, indices), cluster_id)| build_cluster(cluster_id, raw, &indices, tabs))
        .collect();

    Ok(clusters)
}

/// Map 1-based tab numbers to deduplicated 0-based indices, dropping out-of-range ones.
fn tab_indices(numbers: &[i64], tab_count: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = Vec::new();
    for &number in numbers {
        if number < 1 || number as usize > tab_count {
            continue;
        }
        let idx = number as usize - 1;
        if !indices.contains(&idx) {
            indices.push(idx);
        }
    }
    indices
}

/// Keep the first use of each requested id; missing and repeated ids get the
/// smallest id no other cluster holds.
fn assign_ids(requested: &[Option<i64>]) -> Vec<i64> {
    let mut taken = HashSet::new();
    let kept: Vec<Option<i64>> = requested
        .iter()
        .map(|id| id.filter(|id| taken.insert(*id)))
        .collect();

    let mut next = 0;
    kept.into_iter()
        .map(|id| {
            id.unwrap_or_else(|| {
                while taken.contains(&next) {
                    next += 1;
                }
                taken.insert(next);
                next
            })
        })
        .collect()
}

fn build_cluster(cluster_id: i64, raw: RawCluster, indices: &[usize], tabs: &[TabRecord]) -> Cluster {
    Cluster {
        cluster_id,
        tabs: indices.iter().map(|&idx| tabs[idx].clone()).collect(),
        domain: raw.domain.as_deref().map(Domain::coerce).unwrap_or_default(),
        summary: non_blank(raw.summary).unwrap_or_else(|| format!("Group {cluster_id} of related tabs")),
        cluster_name: non_blank(raw.cluster_name).unwrap_or_else(|| format!("Cluster {cluster_id}")),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
