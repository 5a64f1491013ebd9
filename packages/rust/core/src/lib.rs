//! Core pipeline orchestration and domain logic for TabContext.
//!
//! This crate ties together tab collection, clustering through the
//! classification service, and domain resolution into request-driven
//! workflows, plus the client for the downstream dashboard generator.

pub mod classifier;
pub mod clustering;
pub mod dashboard;
pub mod pipeline;
pub mod resolver;

pub use classifier::{ChatMessage, ClassifierClient, Sampling};
pub use clustering::{cluster_tabs, fallback_cluster};
pub use dashboard::{DashboardClient, DashboardRequest, DashboardResponse, DashboardTab};
pub use pipeline::{
    Pipeline, PipelineHandle, PipelineRequest, PipelineResponse, PipelineService,
    ProgressReporter, SilentProgress, StateReport, parse_request,
};
pub use resolver::resolve_domain;
