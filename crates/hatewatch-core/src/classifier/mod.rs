//! Access to the external text classifier.

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

use crate::state::Verdict;
pub use http::HttpClassifier;

/// Result of one classification attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Verdict(Verdict),
    /// Transport failure, non-success status or a service-reported error.
    /// Never cached, so the message is retried on a later scan.
    Unavailable,
}

/// A text classifier. Implementations make exactly one attempt per call
/// and never cache.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Classification;
}
