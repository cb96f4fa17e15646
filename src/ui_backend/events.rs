//! Application Events
//!
//! Typed result messages delivered to the reducer over a single inbound
//! channel. Every spawned task reports back with exactly one of these;
//! push streams report one per upstream event plus a final close.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::load_debounce::LoadTicket;
use crate::core::{ApprovalDecision, ApprovalRequest, HistoryItem, HistoryPage, ReasoningItem};
use crate::core::{SessionId, SessionMeta};

use super::errors::{ApiError, StorageError};

/// One event from a session's push stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A fragment of live agent output
    AgentDelta {
        text: String,
        #[serde(default)]
        created_at: Option<DateTime<Utc>>,
        #[serde(default)]
        turn_id: Option<String>,
        #[serde(default)]
        provider_message_id: Option<String>,
        #[serde(default)]
        force_split: bool,
    },

    /// Full snapshot of the hidden-reasoning items of the current turn
    Reasoning { items: Vec<ReasoningItem> },

    /// An identity-addressed item (notes, system messages, final replies)
    Message { item: HistoryItem },

    /// The agent asks the operator to approve an action
    ApprovalRequested { request: ApprovalRequest },

    /// An approval prompt was answered elsewhere or expired
    ApprovalResolved { approval_id: String },

    /// The agent finished a turn
    TurnCompleted {
        #[serde(default)]
        turn_id: Option<String>,
    },
}

/// Why a history poll was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCause {
    /// Debounced load after selecting an uncached session
    Select,
    /// Out-of-band refresh of a stale transcript
    StaleRefresh,
}

/// Backend acknowledgement of a sent message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    pub turn_id: Option<String>,
    #[serde(default)]
    pub provider_message_id: Option<String>,
}

/// Events delivered to the reducer
#[derive(Debug)]
pub enum AppEvent {
    /// Periodic clock tick
    Tick,

    /// A send task finished
    SendCompleted {
        token: u64,
        result: Result<SendReceipt, ApiError>,
    },

    /// Push-stream event for a session
    Stream {
        session_id: SessionId,
        event: SessionEvent,
    },

    /// A push stream ended or could not be opened
    StreamClosed {
        session_id: SessionId,
        error: Option<String>,
    },

    /// A debounced load timer fired
    LoadTimerFired(LoadTicket),

    /// A history poll finished
    HistoryLoaded {
        session_id: SessionId,
        cause: LoadCause,
        result: Result<HistoryPage, ApiError>,
    },

    /// A meta poll finished
    MetaPolled {
        result: Result<HashMap<SessionId, SessionMeta>, ApiError>,
    },

    /// An app-state save finished
    SaveCompleted {
        seq: u64,
        result: Result<(), StorageError>,
    },

    /// An approval response finished
    ApprovalResponded {
        session_id: SessionId,
        approval_id: String,
        decision: ApprovalDecision,
        result: Result<(), ApiError>,
    },
}
