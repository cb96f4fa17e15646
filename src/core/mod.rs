//! Core domain modules
//!
//! Pure, deterministic reconciliation components. Everything here is owned
//! and mutated by the ui_backend reducer only; nothing touches clocks or
//! spawns tasks.

pub mod approval;
pub mod errors;
pub mod load_debounce;
pub mod merge_policy;
pub mod pending_sends;
pub mod recents;
pub mod request_activity;
pub mod selection_history;
pub mod sequence_guard;
pub mod transcript;
pub mod types;

pub use approval::{select_approval_request, ApprovalDecision, ApprovalRequest};
pub use errors::{TranscriptError, ValidationError};
pub use merge_policy::{should_merge, MergeContext, MergeThresholds};
pub use pending_sends::{PendingSend, PendingSendRegistry};
pub use recents::{RecentsTracker, RunState};
pub use request_activity::{ActivityUpdate, RequestActivityState, RequestActivityTracker};
pub use selection_history::SelectionHistory;
pub use sequence_guard::{MutationClass, SequenceGuard};
pub use transcript::{AppendOutcome, BlockDraft, SessionTranscript, TranscriptCache, VisibleChange};
pub use types::{
    ChangeSource, ChatBlock, ChatRole, ChatStatus, HistoryItem, HistoryPage, ReasoningItem,
    SelectionKey, SessionId, SessionMeta,
};
