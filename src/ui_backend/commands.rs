//! User Commands
//!
//! Operator actions translated from keybindings or scripted input. The
//! reducer receives them after the middleware pipeline has had its say.

use crate::core::{ApprovalDecision, ChangeSource, SelectionKey, SessionId};

/// User commands that can be executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // ========== Application Control ==========
    /// Quit the application
    Quit,

    // ========== Navigation ==========
    /// Select a sidebar entity
    Select {
        key: SelectionKey,
        source: ChangeSource,
    },

    /// Go back in the selection history
    HistoryBack,

    /// Go forward in the selection history
    HistoryForward,

    /// Remove a session from the ready list
    DismissReady(SessionId),

    // ========== Composer ==========
    /// Replace the focused session's draft
    UpdateDraft(String),

    /// Send a message to the focused session
    SendMessage(String),

    // ========== Transcript ==========
    /// Manually collapse or expand a block
    ToggleCollapsed(String),

    // ========== Approvals ==========
    /// Answer an approval prompt; `None` targets the prompt on screen
    RespondApproval {
        approval_id: Option<String>,
        decision: ApprovalDecision,
    },

    // ========== Persistence ==========
    /// Persist selection, history and drafts
    RequestSave,
}

impl Command {
    /// Shorthand for a manual selection
    pub fn select(key: SelectionKey) -> Self {
        Self::Select {
            key,
            source: ChangeSource::User,
        }
    }

    /// Shorthand for manually selecting a session
    pub fn select_session(session_id: impl Into<SessionId>) -> Self {
        Self::select(SelectionKey::Session(session_id.into()))
    }
}
