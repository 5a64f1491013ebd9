//! Tab enumeration and per-tab content collection.
//!
//! This crate provides:
//! - [`TabHost`]: the seam to whatever owns the tabs (a live browser, a snapshot)
//! - [`TabFilter`]: eligibility rules for internal and extension pages
//! - [`collect_tabs`]: concurrent, failure-isolated extraction of every eligible tab

pub mod devtools;
pub mod engine;
pub mod host;
pub mod snapshot;

pub use devtools::DevToolsHost;
pub use engine::collect_tabs;
pub use host::{BUILTIN_EXCLUDED_PREFIXES, BrowserTab, TabFilter, TabHost};
pub use snapshot::{SnapshotHost, SnapshotTab};
