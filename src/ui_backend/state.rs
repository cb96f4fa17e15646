//! Snapshot and persisted state
//!
//! `Snapshot` is the immutable view published after every reduction. It is
//! the only thing renderers ever see.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{ApprovalRequest, ChatBlock, RequestActivityState, SelectionKey, SessionId};

use super::mode::UiMode;

/// Severity of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Status line content shown to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            text: text.into(),
        }
    }
}

/// Immutable render view of the reducer state
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Bumped on every reduction
    pub revision: u64,
    pub mode: UiMode,
    pub selection: Option<SelectionKey>,
    pub focused_session: Option<SessionId>,
    /// Transcript of the focused session
    pub blocks: Vec<ChatBlock>,
    pub activity: Option<RequestActivityState>,
    pub loading: bool,
    pub approvals_loading: bool,
    /// Approval prompt to show for the focused session
    pub approval: Option<ApprovalRequest>,
    /// Sessions that finished work, in transition order
    pub ready: Vec<SessionId>,
    pub draft: String,
    pub status: Option<StatusMessage>,
    pub can_go_back: bool,
    pub can_go_forward: bool,
    pub quit: bool,
}

impl Snapshot {
    pub fn block(&self, id: &str) -> Option<&ChatBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }
}

/// App state persisted across runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAppState {
    /// Selection key in `kind:id` form
    #[serde(default)]
    pub selection: Option<String>,
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub history_cursor: usize,
    #[serde(default)]
    pub drafts: BTreeMap<SessionId, String>,
}
