//! Core job machinery.
//!
//! This module contains:
//! - Store: Key-value persistence and the typed job repository
//! - Pipeline: The per-job stage state machine
//! - Orchestrator: Job ownership, concurrency and persistence
//! - Updates: Live job update fan-out
//! - Exports: CSV and HTML renderings of analytics

pub mod exports;
pub mod orchestrator;
pub mod pipeline;
pub mod store;
pub mod updates;

// Re-export commonly used types
pub use orchestrator::{JobError, Orchestrator};
pub use pipeline::{Pipeline, ProgressSink};
pub use store::{FileStore, JobRepository, Store, StoredObject};
pub use updates::{JobUpdates, UpdateHub};
