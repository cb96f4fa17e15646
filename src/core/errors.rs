//! Domain error types
//!
//! These errors represent business logic failures, distinct from transport
//! errors. The reducer turns every one of them into a status message.

use thiserror::Error;

/// Input rejected synchronously, before any task is scheduled
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Blank composer content
    #[error("Message is empty")]
    EmptyMessage,

    /// A send was attempted without a focused session
    #[error("Select a session before sending")]
    NoSessionSelected,

    /// The current mode does not accept the action
    #[error("Resolve the pending approval before sending")]
    ApprovalPending,
}

/// Errors from transcript mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    /// No block with the given ID
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    /// The block exists but cannot be collapsed
    #[error("Block {0} is not collapsible")]
    NotCollapsible(String),
}
