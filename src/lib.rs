//! fieldlens - match video analytics jobs
//!
//! Turns a match recording into player tracks, movement metrics, heatmaps
//! and a timeline of tactical events.
//!
//! # Architecture
//!
//! Each job runs through a fixed sequence of stages on its own task:
//! - Detection produces per-frame boxes and a position series
//! - Analytics derives metrics and events from the series
//! - Exports render CSV and HTML summaries
//!
//! Every state change is persisted and published to subscribers.
//!
//! # Modules
//!
//! - `domain`: Data structures (Job, JobConfig, Series, Metrics, Event)
//! - `detection`: Detection providers (synthetic, external tracker)
//! - `analytics`: Pure metrics and event detection
//! - `core`: Pipeline, orchestrator, persistence and updates
//! - `config`: Application settings
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Analyze a recording and wait for the result
//! fieldlens analyze match.mp4 --profile soccer
//!
//! # Recompute analytics with new thresholds
//! fieldlens rerun <job-id> --config patch.json
//! ```

pub mod analytics;
pub mod cli;
pub mod config;
pub mod core;
pub mod detection;
pub mod domain;

// Re-export main types at crate root for convenience
pub use analytics::{analyze, Analysis};
pub use core::{JobError, Orchestrator};
pub use detection::{DetectionProvider, DetectionService};
pub use domain::{Event, EventType, Job, JobConfig, JobStatus, Metrics, Series, Stage};
