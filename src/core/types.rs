//! Core domain types
//!
//! Canonical types shared by the reconciliation components and the
//! ui_backend reducer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a remote agent session
pub type SessionId = String;

/// Role of a transcript block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Agent,
    Reasoning,
    SessionNote,
    WorkspaceNote,
    WorktreeNote,
    System,
}

impl ChatRole {
    /// Prefix used for synthetic block IDs
    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::Reasoning => "reasoning",
            Self::SessionNote => "session-note",
            Self::WorkspaceNote => "workspace-note",
            Self::WorktreeNote => "worktree-note",
            Self::System => "system",
        }
    }
}

/// Delivery status of a block (only local echoes ever leave `Sent`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    Sending,
    #[default]
    Sent,
    Failed,
}

/// One renderable unit of conversation or system note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBlock {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    pub status: ChatStatus,
    /// `None` stands for an unknown (zero) timestamp
    pub created_at: Option<DateTime<Utc>>,
    pub turn_id: Option<String>,
    pub provider_message_id: Option<String>,
    pub session_id: SessionId,
    pub collapsed: bool,
    /// Pending-send token of the local echo this block renders
    pub request_id: Option<u64>,
}

impl ChatBlock {
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<SessionId>,
        role: ChatRole,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            text: text.into(),
            status: ChatStatus::Sent,
            created_at: None,
            turn_id: None,
            provider_message_id: None,
            session_id: session_id.into(),
            collapsed: false,
            request_id: None,
        }
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn with_turn_id(mut self, turn_id: impl Into<String>) -> Self {
        self.turn_id = Some(turn_id.into());
        self
    }

    pub fn with_provider_message_id(mut self, id: impl Into<String>) -> Self {
        self.provider_message_id = Some(id.into());
        self
    }

    pub fn with_status(mut self, status: ChatStatus) -> Self {
        self.status = status;
        self
    }

    /// Synthetic ID of a reasoning block keyed by its upstream identity
    pub fn reasoning_id(key: &str) -> String {
        format!("reasoning:{}", key)
    }
}

/// A sidebar entity the operator can select
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SelectionKey {
    Workspace(String),
    Worktree(String),
    Session(SessionId),
    WorkflowRun(String),
}

impl SelectionKey {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Session(id) => Some(id),
            _ => None,
        }
    }

    /// Parse the opaque `kind:id` form stored in the selection history
    pub fn parse(raw: &str) -> Option<Self> {
        let (kind, id) = raw.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        let id = id.to_string();
        match kind {
            "workspace" => Some(Self::Workspace(id)),
            "worktree" => Some(Self::Worktree(id)),
            "session" => Some(Self::Session(id)),
            "workflow" => Some(Self::WorkflowRun(id)),
            _ => None,
        }
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workspace(id) => write!(f, "workspace:{}", id),
            Self::Worktree(id) => write!(f, "worktree:{}", id),
            Self::Session(id) => write!(f, "session:{}", id),
            Self::WorkflowRun(id) => write!(f, "workflow:{}", id),
        }
    }
}

/// Who caused a selection change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// Direct manual navigation
    User,
    /// Background re-sync after an external mutation
    System,
    /// Back/forward replay
    History,
}

/// A history item as returned by the session-control API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub turn_id: Option<String>,
    #[serde(default)]
    pub provider_message_id: Option<String>,
}

/// One page of polled history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryItem>,
    /// Cursor to pass as `since` on the next poll
    #[serde(default)]
    pub cursor: Option<String>,
}

/// A snapshot of one hidden-reasoning item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningItem {
    pub key: String,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Session metadata as reported by the meta poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub latest_turn_id: Option<String>,
}
