//! convoy: session activity and transcript reconciliation
//!
//! This library provides:
//! - A serial reducer that merges optimistic sends, push-stream deltas and
//!   polled history into one transcript per session
//! - Request-activity tracking with stale-history refresh
//! - Recents (running/ready) tracking and back/forward selection history
//! - A tokio event loop that runs the reducer's effects and publishes snapshots

pub mod config;
pub mod core;
pub mod storage;
pub mod transport;
pub mod ui_backend;

pub use config::Config;
pub use storage::JsonStateStore;
pub use ui_backend::{ReconcileService, Reconciler, ServiceHandle, Snapshot};
