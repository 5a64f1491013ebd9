//! Concurrent tab collection.
//!
//! Lists the host's tabs, drops ineligible ones, and extracts every remaining
//! tab in its own task. Extraction degrades per tab (structured extractor,
//! then the visible-text fallback, then empty content) so one bad page never
//! costs the run.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use url::Url;

use tabcontext_extractor::{extract_page, page_title, visible_text};
use tabcontext_shared::{Result, TabRecord, UNTITLED};

use crate::host::{BrowserTab, TabFilter, TabHost};

/// Which extraction tier produced a record's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Structured,
    Fallback,
    Empty,
}

/// Collect one [`TabRecord`] per eligible tab, in the host's tab order.
///
/// Only a failure to list tabs is an error; per-tab failures (including a
/// panicking extraction task) yield a record with empty content.
#[instrument(skip_all)]
pub async fn collect_tabs<H: TabHost>(host: Arc<H>, filter: &TabFilter) -> Result<Vec<TabRecord>> {
    let start_time = Instant::now();

    let tabs = host.list_tabs().await?;
    let total = tabs.len();

    let eligible: Vec<BrowserTab> = tabs
        .into_iter()
        .filter(|tab| filter.is_eligible(tab.url.as_deref()))
        .collect();

    info!(total, eligible = eligible.len(), "collecting tabs");

    let mut handles = Vec::with_capacity(eligible.len());
    for tab in eligible {
        let host = host.clone();
        let task_tab = tab.clone();
        handles.push((
            tab,
            tokio::spawn(async move { extract_tab(host.as_ref(), task_tab).await }),
        ));
    }

    let mut records = Vec::with_capacity(handles.len());
    let mut degraded = 0usize;
    for (tab, handle) in handles {
        match handle.await {
            Ok((record, tier)) => {
                if tier != Tier::Structured {
                    degraded += 1;
                }
                records.push(record);
            }
            Err(e) => {
                warn!(tab_id = tab.id, error = %e, "extraction task failed");
                degraded += 1;
                records.push(empty_record(&tab, None));
            }
        }
    }

    info!(
        records = records.len(),
        degraded,
        duration_ms = start_time.elapsed().as_millis(),
        "tab collection completed"
    );

    Ok(records)
}

/// Run the extraction tiers for one tab.
async fn extract_tab<H: TabHost>(host: &H, tab: BrowserTab) -> (TabRecord, Tier) {
    let base_url = tab.url.as_deref().and_then(|u| Url::parse(u).ok());

    // Tier 1: structured extractor
    let html = match host.document(&tab).await {
        Ok(html) => match extract_page(&html, base_url.as_ref()) {
            Ok(page) => {
                let mut record = empty_record(&tab, page.title.as_deref());
                record.content = page.text;
                record.page = Some(page.detail);
                return (record, Tier::Structured);
            }
            Err(e) => {
                debug!(tab_id = tab.id, error = %e, "structured extraction failed");
                Some(html)
            }
        },
        Err(e) => {
            debug!(tab_id = tab.id, error = %e, "document unavailable, retrying");
            None
        }
    };

    // Tier 2: minimal visible-text extractor
    let html = match html {
        Some(html) => Ok(html),
        None => host.document(&tab).await,
    };
    match html {
        Ok(html) => {
            let mut record = empty_record(&tab, page_title(&html).as_deref());
            record.content = visible_text(&html);
            (record, Tier::Fallback)
        }
        Err(e) => {
            // Tier 3
            warn!(tab_id = tab.id, error = %e, "no content extracted");
            (empty_record(&tab, None), Tier::Empty)
        }
    }
}

/// Record without content. A blank tab title falls back to the document's
/// title, then to [`UNTITLED`].
fn empty_record(tab: &BrowserTab, document_title: Option<&str>) -> TabRecord {
    TabRecord {
        id: tab.id,
        title: [tab.title.as_deref(), document_title]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|t| !t.is_empty())
            .unwrap_or(UNTITLED)
            .to_string(),
        url: tab.url.clone().unwrap_or_default(),
        content: String::new(),
        page: None,
    }
}
