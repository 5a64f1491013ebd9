//! Shared types, error model, and configuration for TabContext.
//!
//! This crate is the foundation depended on by all other TabContext crates.
//! It provides:
//! - [`TabContextError`]: the unified error type
//! - Domain types ([`TabRecord`], [`Cluster`], [`DomainResult`], [`Domain`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClassifierConfig, CollectorConfig, DashboardConfig, StorageConfig,
    api_token_from_env, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from,
};
pub use error::{Result, TabContextError};
pub use types::{
    Cluster, Domain, DomainResult, ImageRef, LinkRef, MAX_CONTENT_CHARS, PageDetail,
    PipelineState, SessionKey, SessionRecord, TabRecord, UNTITLED,
};
