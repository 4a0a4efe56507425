// ABOUTME: Library root for the Démarches Simplifiées to Grist connector front-end
// ABOUTME: Configuration, filters, connection tests and monitored synchronization jobs

pub mod connections;
pub mod context;
pub mod error;
pub mod filters;
pub mod form;
pub mod logging;
pub mod notifications;
pub mod remote;
pub mod schedule;
pub mod settings;
pub mod sync;
pub mod utils;

pub use error::ConnectorError;
