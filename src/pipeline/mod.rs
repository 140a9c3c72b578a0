// src/pipeline/mod.rs

pub mod frame_context;
pub mod metrics;
pub mod orchestrator;

pub use metrics::RunStats;
pub use orchestrator::DashboardPipeline;
