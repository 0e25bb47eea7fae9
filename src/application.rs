//! Application layer module
//!
//! Ingress, connection lifecycle and the progress session that ties them to
//! the domain tracker.

pub mod ingress;
pub mod lifecycle;
pub mod progress_session;

pub use ingress::{EventIngress, EventObserver, IngressError, Transcript, parse_frame};
pub use lifecycle::{ConnectionLifecycle, ConnectionState, LifecycleError, Transition};
pub use progress_session::{ProgressSession, SessionOutcome, SessionSettings};
