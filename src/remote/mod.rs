// ABOUTME: Connector backend API module
// ABOUTME: Wire models and the HTTP client that exchanges them

pub mod client;
pub mod models;

pub use client::RemoteClient;
pub use models::{
    ApiResponse, Configuration, ConnectionTestRequest, LogEntry, Secret, SyncFilters,
    TaskSnapshot, TaskStatus,
};
