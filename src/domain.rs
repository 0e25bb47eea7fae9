//! Domain module - progress reconciliation core
//!
//! Batch, status events, the completion tracker and the push channel seam.
//! Each module is its own file in the domain/ directory; public exports are
//! collected here for convenience.

pub mod batch;
pub mod channel;
pub mod events;
pub mod tracker;

pub use batch::{AddressError, Batch, ChannelAddress, SubmissionReceipt};
pub use channel::{ChannelError, ChannelSignal, PushTransport};
pub use events::{EventKind, ItemStatus, StatusEvent, WorkItemId};
pub use tracker::{BatchTracker, RecordOutcome, TrackerError, TrackerStats};
