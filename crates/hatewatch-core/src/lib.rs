pub mod annotate;
pub mod classifier;
pub mod config;
pub mod control;
pub mod document;
pub mod error;
pub mod identity;
pub mod observer;
pub mod profile;
pub mod scan;
pub mod session;
pub mod state;
pub mod store;
pub mod watchdog;

// Re-export main types for convenience
pub use annotate::{Annotation, AnnotationManager};
pub use classifier::{Classification, Classifier, HttpClassifier};
pub use config::{Config, Timing};
pub use control::{ControlClient, ControlCommand, ControlResponse, ControlServer};
pub use document::{Document, DocumentHandle, ElementSpec, NodeId, Selector};
pub use error::{HatewatchError, Result};
pub use identity::{ConversationIdentity, IdentityResolver, MessageIdentity};
pub use profile::HostProfile;
pub use scan::{ScanCoordinator, ScanReport};
pub use session::SessionController;
pub use state::{SharedSession, Verdict};
pub use store::{CompositeKey, VerdictStore};
