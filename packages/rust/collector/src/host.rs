//! The tab host seam and tab eligibility rules.

use std::future::Future;

use tabcontext_shared::{CollectorConfig, Result};

/// URL prefixes that never hold user content: browser-internal pages,
/// extension pages, and the extension stores (which refuse script injection).
pub const BUILTIN_EXCLUDED_PREFIXES: &[&str] = &[
    "chrome://",
    "edge://",
    "about:",
    "brave://",
    "chrome-extension://",
    "moz-extension://",
    "https://chrome.google.com/webstore",
    "https://chromewebstore.google.com",
];

/// A tab as reported by the host, before extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserTab {
    /// Position in the host's enumeration; hosts may key documents on it.
    pub index: usize,
    pub id: i64,
    pub title: Option<String>,
    pub url: Option<String>,
}

/// Source of open tabs and their rendered documents.
///
/// Implementations must be shareable across tasks: the collector extracts
/// every tab concurrently.
pub trait TabHost: Send + Sync + 'static {
    /// Every tab in the current window.
    fn list_tabs(&self) -> impl Future<Output = Result<Vec<BrowserTab>>> + Send;

    /// The tab's current HTML document.
    fn document(&self, tab: &BrowserTab) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// TabFilter
// ---------------------------------------------------------------------------

/// Decides which tabs are eligible for extraction.
#[derive(Debug, Clone, Default)]
pub struct TabFilter {
    extra_prefixes: Vec<String>,
}

impl TabFilter {
    pub fn new(extra_prefixes: Vec<String>) -> Self {
        Self { extra_prefixes }
    }

    pub fn from_config(config: &CollectorConfig) -> Self {
        Self::new(config.exclude_prefixes.clone())
    }

    /// A tab is eligible iff it has a URL that matches no excluded prefix.
    pub fn is_eligible(&self, url: Option<&str>) -> bool {
        let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
            return false;
        };

        !BUILTIN_EXCLUDED_PREFIXES
            .iter()
            .copied()
            .chain(self.extra_prefixes.iter().map(String::as_str))
            .any(|prefix| url.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_pages_are_excluded() {
        let filter = TabFilter::default();
        assert!(!filter.is_eligible(Some("chrome://settings")));
        assert!(!filter.is_eligible(Some("edge://newtab/")));
        assert!(!filter.is_eligible(Some("about:blank")));
        assert!(!filter.is_eligible(Some("chrome-extension://abc/popup.html")));
        assert!(!filter.is_eligible(Some(
            "https://chromewebstore.google.com/detail/some-extension"
        )));
    }

    #[test]
    fn missing_url_is_ineligible() {
        let filter = TabFilter::default();
        assert!(!filter.is_eligible(None));
        assert!(!filter.is_eligible(Some("   ")));
    }

    #[test]
    fn ordinary_pages_are_eligible() {
        let filter = TabFilter::default();
        assert!(filter.is_eligible(Some("https://arxiv.org/abs/1706.03762")));
        assert!(filter.is_eligible(Some("http://localhost:3000/")));
        assert!(filter.is_eligible(Some("file:///home/me/notes.html")));
    }

    #[test]
    fn configured_prefixes_extend_the_list() {
        let filter = TabFilter::new(vec!["https://mail.example.com".into()]);
        assert!(!filter.is_eligible(Some("https://mail.example.com/inbox")));
        assert!(filter.is_eligible(Some("https://example.com/")));
    }
}
