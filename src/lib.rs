//! Decision Upload Client
//!
//! Submits court decisions to the processing backend, reconciles the
//! per-decision status notifications pushed over a WebSocket into batch
//! completion progress, and searches the processed corpus.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod commands;
pub mod types;
