//! UI Backend - reconciliation layer between the session API and a frontend
//!
//! ## Architecture
//!
//! - **Reconciler**: serial reducer; the only owner of transcripts, recents,
//!   request activity and selection history
//! - **Command**: operator intent, routed by `UiMode` and the middleware pipeline
//! - **AppEvent**: results of effects, push-stream events and clock ticks
//! - **Effect**: work the reducer asks for; run by `EffectRunner`
//! - **ReconcileService**: event loop publishing `Snapshot`s to the frontend
//! - **UiRenderer**: trait that frontends implement

mod commands;
mod effects;
mod errors;
mod events;
pub mod middleware;
pub mod mode;
mod reducer;
mod scheduler;
mod service;
mod state;
mod traits;

pub use commands::Command;
pub use effects::Effect;
pub use errors::{ApiError, StorageError};
pub use events::{AppEvent, LoadCause, SendReceipt, SessionEvent};
pub use middleware::{
    logging_middleware, mode_middleware, normalization_middleware, validation_middleware,
    CommandContext, CommandPipeline, MiddlewareFn, MiddlewareResult,
};
pub use mode::{ModeKind, ModeRoute, UiMode};
pub use reducer::{Input, ReduceContext, Reconciler};
pub use scheduler::EffectRunner;
pub use service::{ReconcileService, ServiceHandle};
pub use state::{PersistedAppState, Snapshot, StatusLevel, StatusMessage};
pub use traits::{AppStateStore, EventStream, SessionApi, UiRenderer};
