//! Tab host backed by a captured JSON snapshot of a window.
//!
//! ```json
//! [{"id": 1, "title": "Attention", "url": "https://arxiv.org/abs/1706.03762", "html": "<html>…"}]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use tabcontext_shared::{Result, TabContextError};

use crate::host::{BrowserTab, TabHost};

/// One captured tab. `html` is absent when the page could not be captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotTab {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
}

/// Serves tabs and documents from memory.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHost {
    tabs: Vec<BrowserTab>,
    documents: Vec<Option<String>>,
}

impl SnapshotHost {
    /// Tabs without an explicit id get their 1-based position.
    pub fn new(tabs: Vec<SnapshotTab>) -> Self {
        let mut host = Self::default();
        for (idx, tab) in tabs.into_iter().enumerate() {
            host.tabs.push(BrowserTab {
                index: idx,
                id: tab.id.unwrap_or(idx as i64 + 1),
                title: tab.title,
                url: tab.url,
            });
            host.documents.push(tab.html);
        }
        host
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TabContextError::io(path, e))?;
        let tabs: Vec<SnapshotTab> = serde_json::from_str(&content).map_err(|e| {
            TabContextError::parse(format!("invalid tab snapshot {}: {e}", path.display()))
        })?;
        Ok(Self::new(tabs))
    }
}

impl TabHost for SnapshotHost {
    async fn list_tabs(&self) -> Result<Vec<BrowserTab>> {
        Ok(self.tabs.clone())
    }

    async fn document(&self, tab: &BrowserTab) -> Result<String> {
        self.documents
            .get(tab.index)
            .cloned()
            .flatten()
            .ok_or_else(|| TabContextError::not_found(format!("no document captured for tab {}", tab.id)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{TabFilter, collect_tabs};

    const PAPER: &str = "<html><body><main>\
        <p>Transformers replace recurrence with self-attention over the sequence.</p>\
        </main></body></html>";

    #[tokio::test]
    async fn window_with_settings_and_two_papers() {
        let host = SnapshotHost::new(vec![
            SnapshotTab {
                id: None,
                title: Some("Settings".into()),
                url: Some("chrome://settings".into()),
                html: None,
            },
            SnapshotTab {
                id: None,
                title: Some("Attention Is All You Need".into()),
                url: Some("https://arxiv.org/abs/1706.03762".into()),
                html: Some(PAPER.into()),
            },
            SnapshotTab {
                id: None,
                title: Some("BERT".into()),
                url: Some("https://arxiv.org/abs/1810.04805".into()),
                html: Some(PAPER.into()),
            },
        ]);

        let records = collect_tabs(Arc::new(host), &TabFilter::default())
            .await
            .expect("collect");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 2);
        assert_eq!(records[0].url, "https://arxiv.org/abs/1706.03762");
        assert_eq!(records[1].title, "BERT");
        assert!(records.iter().all(|r| r.content.contains("self-attention")));
    }

    #[tokio::test]
    async fn missing_html_yields_empty_content() {
        let host = SnapshotHost::new(vec![SnapshotTab {
            id: Some(42),
            title: None,
            url: Some("https://example.com/".into()),
            html: None,
        }]);

        let records = collect_tabs(Arc::new(host), &TabFilter::default())
            .await
            .expect("collect");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 42);
        assert!(records[0].content.is_empty());
    }

    #[tokio::test]
    async fn identical_entries_keep_their_own_documents() {
        let entry = |html: &str| SnapshotTab {
            id: Some(7),
            title: Some("Search".into()),
            url: Some("https://search.example.com/".into()),
            html: Some(html.into()),
        };
        let host = SnapshotHost::new(vec![
            entry("<html><body><p>first capture of the results page text</p></body></html>"),
            entry("<html><body><p>second capture of the results page text</p></body></html>"),
        ]);

        let records = collect_tabs(Arc::new(host), &TabFilter::default())
            .await
            .expect("collect");

        assert!(records[0].content.contains("first capture"));
        assert!(records[1].content.contains("second capture"));
    }

    #[test]
    fn loads_snapshot_file() {
        let path = std::env::temp_dir().join(format!("tc_snapshot_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"title": "Docs", "url": "https://docs.rs/", "html": "<p>hi</p>"}, {"url": "about:blank"}]"#,
        )
        .expect("write");

        let host = SnapshotHost::from_path(&path).expect("load");
        assert_eq!(host.tabs.len(), 2);
        assert_eq!(host.tabs[1].id, 2);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn invalid_snapshot_is_a_parse_error() {
        let path = std::env::temp_dir().join(format!("tc_bad_snapshot_{}.json", std::process::id()));
        std::fs::write(&path, "{not json").expect("write");

        let err = SnapshotHost::from_path(&path).unwrap_err();
        assert!(matches!(err, TabContextError::Parse { .. }));

        let _ = std::fs::remove_file(&path);
    }
}
