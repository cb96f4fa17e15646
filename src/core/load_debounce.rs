//! Debounced session loading
//!
//! Each scheduled load carries a ticket; only the ticket matching the latest
//! selection sequence may run when its timer fires.

use std::time::Duration;

use super::types::SessionId;

/// Captured selection sequence of a delayed load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub seq: u64,
    pub session_id: SessionId,
}

#[derive(Debug, Clone)]
pub struct LoadDebouncer {
    seq: u64,
    delay: Duration,
}

impl LoadDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self { seq: 0, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Issue a ticket for a load of `session_id`, superseding older ones
    pub fn schedule(&mut self, session_id: &str) -> LoadTicket {
        self.seq += 1;
        LoadTicket {
            seq: self.seq,
            session_id: session_id.to_string(),
        }
    }

    /// Invalidate every outstanding ticket without issuing a new one
    pub fn supersede(&mut self) {
        self.seq += 1;
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.seq == self.seq
    }
}
