//! Error types for the hatewatch engine.

use thiserror::Error;

use crate::document::NodeId;

/// Shared error type for the library.
///
/// Classification failures never surface through this type at the scan
/// level: the classifier collapses them into
/// [`Classification::Unavailable`](crate::classifier::Classification::Unavailable).
#[derive(Error, Debug)]
pub enum HatewatchError {
    /// Configuration could not be located or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (config file access, bridge streams)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A locator strategy could not be parsed
    #[error("Invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },

    /// Network failure talking to the classification service
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success status or an error payload reported by the service
    #[error("Service error: {0}")]
    Service(String),

    /// A node id that does not belong to the document
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// A tree edit that would break the document structure
    #[error("Invalid tree operation: {0}")]
    InvalidTree(String),

    /// The control channel has no listener or the listener went away
    #[error("Control channel error: {0}")]
    ControlChannel(String),
}

impl HatewatchError {
    /// Creates a Selector error
    pub fn selector(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Selector {
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a Service error
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service(message.into())
    }
}

pub type Result<T> = std::result::Result<T, HatewatchError>;
