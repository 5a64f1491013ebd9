//! Core domain types for TabContext sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum characters of page text kept per tab.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Title used when a tab reports none.
pub const UNTITLED: &str = "Untitled";

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// The fixed taxonomy describing a user's working context.
///
/// Deserialization never fails: unknown values coerce to [`Domain::Generic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Domain {
    Study,
    Shopping,
    Travel,
    Code,
    Entertainment,
    #[default]
    Generic,
}

impl Domain {
    /// Wire name of the domain.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Study => "study",
            Self::Shopping => "shopping",
            Self::Travel => "travel",
            Self::Code => "code",
            Self::Entertainment => "entertainment",
            Self::Generic => "generic",
        }
    }

    /// Map any string onto the taxonomy. Case and surrounding whitespace are ignored.
    pub fn coerce(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "study" => Self::Study,
            "shopping" => Self::Shopping,
            "travel" => Self::Travel,
            "code" => Self::Code,
            "entertainment" => Self::Entertainment,
            _ => Self::Generic,
        }
    }
}

impl From<String> for Domain {
    fn from(value: String) -> Self {
        Self::coerce(&value)
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TabRecord
// ---------------------------------------------------------------------------

/// A link found on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub text: String,
    pub href: String,
}

/// An image found on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alt: String,
}

/// Structured summary produced by the full content extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDetail {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paragraphs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headings: Vec<String>,
}

/// One browser tab's identity and extracted content, for a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabRecord {
    /// Opaque tab handle from the tab host.
    pub id: i64,
    pub title: String,
    pub url: String,
    /// Visible page text, at most [`MAX_CONTENT_CHARS`] characters. Empty if extraction failed.
    #[serde(default)]
    pub content: String,
    /// Present only when structured extraction succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageDetail>,
}

// ---------------------------------------------------------------------------
// Cluster
// ---------------------------------------------------------------------------

/// A group of tabs sharing an inferred topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: i64,
    /// Never empty.
    pub tabs: Vec<TabRecord>,
    pub domain: Domain,
    pub summary: String,
    pub cluster_name: String,
}

// ---------------------------------------------------------------------------
// DomainResult
// ---------------------------------------------------------------------------

/// The resolved working context handed to the dashboard generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainResult {
    pub domain: Domain,
    pub tabs: Vec<TabRecord>,
    pub summary: String,
    #[serde(default)]
    pub user_prompt: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// The fixed key set of the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Clusters,
    LastClusterTime,
    DomainResult,
}

impl SessionKey {
    pub const ALL: [SessionKey; 3] = [
        SessionKey::Clusters,
        SessionKey::LastClusterTime,
        SessionKey::DomainResult,
    ];

    /// Storage key name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clusters => "tab_clusters",
            Self::LastClusterTime => "last_cluster_time",
            Self::DomainResult => "domain_result",
        }
    }
}

/// A partial view of the session: `get` fills the requested keys, `set`
/// overwrites every field that is `Some`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusters: Option<Vec<Cluster>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cluster_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_result: Option<DomainResult>,
}

/// Where the pipeline currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Extracting,
    Clustered,
    Resolving,
    Resolved,
}

impl PipelineState {
    /// Derive the resting state from what the store holds. A domain result
    /// older than the latest clustering run no longer counts.
    pub fn from_record(record: &SessionRecord) -> Self {
        let resolved = match (&record.domain_result, record.last_cluster_time) {
            (Some(result), Some(clustered_at)) => result.timestamp >= clustered_at,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if resolved {
            Self::Resolved
        } else if record.clusters.is_some() {
            Self::Clustered
        } else {
            Self::Idle
        }
    }
}
