// ABOUTME: Synchronization job module
// ABOUTME: Log statistics extraction, progress reconciliation and terminal rendering

pub mod controller;
pub mod render;
pub mod stats;

pub use controller::{ProgressView, SyncController, SyncOutcome, SyncSession, SyncState};
pub use render::ProgressRenderer;
pub use stats::{JobCounters, LogStatsExtractor};
