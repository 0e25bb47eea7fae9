//! Types shared with the host view

pub mod frontend_api;

pub use frontend_api::{ProgressSnapshot, SessionEndReason};
