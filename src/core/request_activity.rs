//! Request activity tracker
//!
//! Tracks the single outstanding request of the focused session. While a
//! request is active and nothing visible has changed for longer than the
//! stale delay, the tracker asks for one out-of-band history refresh per
//! stale period.

use std::time::{Duration, Instant};

use super::transcript::VisibleChange;
use super::types::SessionId;

/// Activity of the focused session's outstanding request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestActivityState {
    pub session_id: SessionId,
    pub provider: String,
    pub active: bool,
    pub started_at: Instant,
    /// Last time the visible transcript changed
    pub last_visible_at: Instant,
    pub last_refresh_at: Option<Instant>,
    pub reasoning_updates: u32,
    /// Reasoning updates that landed on a block other than the newest
    pub hidden_reasoning_count: u32,
    pub refresh_count: u32,
}

/// Outcome of feeding a visible change to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityUpdate {
    /// No active request for that session
    Ignored,
    /// Reasoning progressed; request still active
    Reasoning,
    /// Agent reply became visible; request finished
    Completed,
}

#[derive(Debug)]
pub struct RequestActivityTracker {
    state: Option<RequestActivityState>,
    stale_delay: Duration,
}

impl RequestActivityTracker {
    pub fn new(stale_delay: Duration) -> Self {
        Self {
            state: None,
            stale_delay,
        }
    }

    pub fn state(&self) -> Option<&RequestActivityState> {
        self.state.as_ref()
    }

    pub fn is_active_for(&self, session_id: &str) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.active && s.session_id == session_id)
    }

    /// Begin tracking a new request, discarding any prior counters
    pub fn start(&mut self, session_id: &str, provider: &str, now: Instant) {
        tracing::debug!(session_id, provider, "request activity started");
        self.state = Some(RequestActivityState {
            session_id: session_id.to_string(),
            provider: provider.to_string(),
            active: true,
            started_at: now,
            last_visible_at: now,
            last_refresh_at: None,
            reasoning_updates: 0,
            hidden_reasoning_count: 0,
            refresh_count: 0,
        });
    }

    /// Feed what a transcript mutation changed for `session_id`
    pub fn note_visible_update(
        &mut self,
        session_id: &str,
        change: &VisibleChange,
        now: Instant,
    ) -> ActivityUpdate {
        let Some(state) = self.state.as_mut().filter(|s| s.active) else {
            return ActivityUpdate::Ignored;
        };
        if state.session_id != session_id || change.is_empty() {
            return ActivityUpdate::Ignored;
        }

        if change.agent_changed {
            tracing::debug!(session_id, "agent reply visible, request complete");
            self.state = None;
            return ActivityUpdate::Completed;
        }

        let mut touched_newest = false;
        for id in &change.reasoning_ids {
            state.reasoning_updates += 1;
            if change.newest_reasoning_id.as_deref() == Some(id.as_str()) {
                touched_newest = true;
            } else {
                state.hidden_reasoning_count += 1;
            }
        }
        if touched_newest {
            state.last_visible_at = now;
        }
        ActivityUpdate::Reasoning
    }

    /// Clear tracking when focus moves to a different session
    pub fn focus_changed(&mut self, focused: Option<&str>) {
        if let Some(state) = &self.state {
            if focused != Some(state.session_id.as_str()) {
                tracing::debug!(session_id = %state.session_id, "focus moved, activity cleared");
                self.state = None;
            }
        }
    }

    /// Stop tracking `session_id` (its send failed)
    pub fn abort(&mut self, session_id: &str) {
        if self
            .state
            .as_ref()
            .is_some_and(|s| s.session_id == session_id)
        {
            self.state = None;
        }
    }

    /// Returns the session to refresh if the visible transcript went stale
    ///
    /// At most one refresh is issued per stale period: the clock restarts
    /// at each refresh as well as at each visible update.
    pub fn maybe_auto_refresh(&mut self, now: Instant) -> Option<SessionId> {
        let state = self.state.as_mut().filter(|s| s.active)?;
        let since = state
            .last_refresh_at
            .map_or(state.last_visible_at, |at| at.max(state.last_visible_at));
        if now.saturating_duration_since(since) <= self.stale_delay {
            return None;
        }
        state.last_refresh_at = Some(now);
        state.refresh_count += 1;
        tracing::debug!(
            session_id = %state.session_id,
            refresh_count = state.refresh_count,
            "transcript stale, scheduling refresh"
        );
        Some(state.session_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(10);

    fn reasoning_change(ids: &[&str], newest: &str) -> VisibleChange {
        VisibleChange {
            agent_changed: false,
            reasoning_ids: ids.iter().map(|s| s.to_string()).collect(),
            newest_reasoning_id: Some(newest.to_string()),
            any: true,
        }
    }

    fn agent_change() -> VisibleChange {
        VisibleChange {
            agent_changed: true,
            any: true,
            ..Default::default()
        }
    }

    #[test]
    fn agent_reply_completes_request() {
        let t0 = Instant::now();
        let mut tracker = RequestActivityTracker::new(DELAY);
        tracker.start("s1", "codex", t0);

        let update = tracker.note_visible_update("s1", &agent_change(), t0);
        assert_eq!(update, ActivityUpdate::Completed);
        assert!(tracker.state().is_none());
    }

    #[test]
    fn counts_hidden_reasoning() {
        let t0 = Instant::now();
        let mut tracker = RequestActivityTracker::new(DELAY);
        tracker.start("s1", "codex", t0);

        tracker.note_visible_update("s1", &reasoning_change(&["reasoning:a"], "reasoning:a"), t0);
        tracker.note_visible_update(
            "s1",
            &reasoning_change(&["reasoning:a", "reasoning:b"], "reasoning:b"),
            t0,
        );

        let state = tracker.state().unwrap();
        assert_eq!(state.reasoning_updates, 3);
        assert_eq!(state.hidden_reasoning_count, 1);
        assert!(state.active);
    }

    #[test]
    fn updates_for_other_sessions_are_ignored() {
        let t0 = Instant::now();
        let mut tracker = RequestActivityTracker::new(DELAY);
        tracker.start("s1", "codex", t0);
        assert_eq!(
            tracker.note_visible_update("s2", &agent_change(), t0),
            ActivityUpdate::Ignored
        );
        assert!(tracker.is_active_for("s1"));
    }

    #[test]
    fn focus_change_clears_state() {
        let mut tracker = RequestActivityTracker::new(DELAY);
        tracker.start("s1", "codex", Instant::now());
        tracker.focus_changed(Some("s1"));
        assert!(tracker.state().is_some());
        tracker.focus_changed(Some("s2"));
        assert!(tracker.state().is_none());
    }

    #[test]
    fn stale_transcript_refreshes_once_per_period() {
        let t0 = Instant::now();
        let mut tracker = RequestActivityTracker::new(DELAY);
        tracker.start("s1", "codex", t0);

        assert_eq!(tracker.maybe_auto_refresh(t0 + DELAY), None);
        assert_eq!(
            tracker.maybe_auto_refresh(t0 + DELAY * 2),
            Some("s1".to_string())
        );
        assert_eq!(tracker.maybe_auto_refresh(t0 + DELAY * 2), None);
        assert_eq!(tracker.state().unwrap().refresh_count, 1);

        assert!(tracker
            .maybe_auto_refresh(t0 + DELAY * 3 + Duration::from_millis(1))
            .is_some());
        assert_eq!(tracker.state().unwrap().refresh_count, 2);
    }

    #[test]
    fn visible_reasoning_defers_refresh() {
        let t0 = Instant::now();
        let mut tracker = RequestActivityTracker::new(DELAY);
        tracker.start("s1", "codex", t0);
        tracker.note_visible_update(
            "s1",
            &reasoning_change(&["reasoning:a"], "reasoning:a"),
            t0 + DELAY,
        );
        assert_eq!(tracker.maybe_auto_refresh(t0 + DELAY * 2), None);
    }

    #[test]
    fn hidden_reasoning_does_not_defer_refresh() {
        let t0 = Instant::now();
        let mut tracker = RequestActivityTracker::new(DELAY);
        tracker.start("s1", "codex", t0);
        tracker.note_visible_update(
            "s1",
            &reasoning_change(&["reasoning:a"], "reasoning:b"),
            t0 + DELAY,
        );
        assert!(tracker
            .maybe_auto_refresh(t0 + DELAY + Duration::from_millis(1))
            .is_some());
    }
}
