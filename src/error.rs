// ABOUTME: Error taxonomy for the connector front-end
// ABOUTME: Each variant maps to one user-facing failure category

use std::fmt;

/// Message shown when the host document did not grant full access.
pub const CONTEXT_UNAVAILABLE: &str = "Veuillez donner au widget l’accès complet au document";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// Embedding context missing or incomplete.
    Context(String),
    /// Transport-level failure talking to the backend.
    Network(String),
    /// A required field was missing before a request was sent.
    Validation(String),
    /// The backend answered with `success: false`.
    Backend(String),
}

impl ConnectorError {
    pub fn context_unavailable() -> Self {
        ConnectorError::Context(CONTEXT_UNAVAILABLE.to_string())
    }

    pub fn missing_field(field: &str) -> Self {
        ConnectorError::Validation(format!("Le champ {} est requis", field))
    }

    /// Message without the category prefix, suitable for a notification.
    pub fn user_message(&self) -> &str {
        match self {
            ConnectorError::Context(msg)
            | ConnectorError::Network(msg)
            | ConnectorError::Validation(msg)
            | ConnectorError::Backend(msg) => msg,
        }
    }
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectorError::Context(msg) => write!(f, "Context error: {}", msg),
            ConnectorError::Network(msg) => write!(f, "Network error: {}", msg),
            ConnectorError::Validation(msg) => write!(f, "Validation error: {}", msg),
            ConnectorError::Backend(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for ConnectorError {}
