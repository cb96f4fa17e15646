//! Collaborator Traits
//!
//! Interfaces of everything outside the reconciliation core: the session
//! backend, the app-state store and the renderer.

use std::collections::HashMap;
use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;

use crate::core::{ApprovalDecision, HistoryPage, SessionId, SessionMeta};

use super::errors::{ApiError, StorageError};
use super::events::{SendReceipt, SessionEvent};
use super::state::{PersistedAppState, Snapshot};

/// Stream of push events for one session
pub type EventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

/// Session-control API
///
/// Retry and backoff belong to implementations; the reducer treats every
/// error as final for that request.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Submit operator text to a session
    async fn send_message(&self, session_id: &str, text: &str) -> Result<SendReceipt, ApiError>;

    /// Open the live event stream of a session
    async fn open_push_stream(&self, session_id: &str) -> Result<EventStream, ApiError>;

    /// Fetch history items newer than `since`
    async fn poll_history(
        &self,
        session_id: &str,
        since: Option<&str>,
    ) -> Result<HistoryPage, ApiError>;

    /// Fetch metadata of the given sessions
    async fn poll_meta(
        &self,
        session_ids: &[SessionId],
    ) -> Result<HashMap<SessionId, SessionMeta>, ApiError>;

    /// Answer an approval prompt
    async fn respond_approval(
        &self,
        session_id: &str,
        approval_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), ApiError>;
}

/// App-state persistence
#[async_trait]
pub trait AppStateStore: Send + Sync {
    async fn save(&self, state: &PersistedAppState) -> Result<(), StorageError>;

    /// `Ok(None)` when nothing has been saved yet
    async fn load(&self) -> Result<Option<PersistedAppState>, StorageError>;
}

/// Trait that frontends implement
pub trait UiRenderer {
    /// Render the latest snapshot
    fn render(&mut self, snapshot: &Snapshot) -> Result<()>;
}
