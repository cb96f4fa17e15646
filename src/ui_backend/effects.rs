//! Effects requested by the reducer
//!
//! The reducer never performs I/O. It returns these descriptions and the
//! scheduler turns each into a task whose result comes back as an event.

use std::time::Duration;

use crate::core::load_debounce::LoadTicket;
use crate::core::{ApprovalDecision, SessionId};

use super::events::LoadCause;
use super::state::PersistedAppState;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SendMessage {
        token: u64,
        session_id: SessionId,
        text: String,
    },
    OpenStream {
        session_id: SessionId,
    },
    /// Stop forwarding the push stream of an evicted session
    CloseStream {
        session_id: SessionId,
    },
    PollHistory {
        session_id: SessionId,
        since: Option<String>,
        cause: LoadCause,
    },
    PollMeta {
        session_ids: Vec<SessionId>,
    },
    /// Fire `LoadTimerFired(ticket)` after `delay`
    ScheduleLoad {
        ticket: LoadTicket,
        delay: Duration,
    },
    SaveState {
        seq: u64,
        state: PersistedAppState,
    },
    RespondApproval {
        session_id: SessionId,
        approval_id: String,
        decision: ApprovalDecision,
    },
    Quit,
}

impl Effect {
    /// Short label for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::OpenStream { .. } => "open_stream",
            Self::CloseStream { .. } => "close_stream",
            Self::PollHistory { .. } => "poll_history",
            Self::PollMeta { .. } => "poll_meta",
            Self::ScheduleLoad { .. } => "schedule_load",
            Self::SaveState { .. } => "save_state",
            Self::RespondApproval { .. } => "respond_approval",
            Self::Quit => "quit",
        }
    }
}
