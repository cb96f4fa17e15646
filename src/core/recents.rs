//! Recents and readiness tracking
//!
//! A session is Running from the moment work is started on it until a meta
//! poll reports a turn ID different from the one it started at; it is then
//! Ready until dismissed. Ready sessions are kept in transition order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{SessionId, SessionMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentsEntry {
    pub state: RunState,
    pub started_turn_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RecentsTracker {
    entries: HashMap<SessionId, RecentsEntry>,
    ready: Vec<SessionId>,
}

impl RecentsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a session Running from `turn_id` (the latest turn known at start)
    pub fn start_run(&mut self, session_id: &str, turn_id: Option<String>, at: DateTime<Utc>) {
        self.ready.retain(|id| id != session_id);
        self.entries.insert(
            session_id.to_string(),
            RecentsEntry {
                state: RunState::Running,
                started_turn_id: turn_id,
                started_at: at,
            },
        );
    }

    /// Move Running sessions whose latest turn moved on to Ready
    ///
    /// Returns exactly the sessions that became ready in this call, in the
    /// order they were appended to the ready list.
    pub fn observe_meta(&mut self, meta: &HashMap<SessionId, SessionMeta>) -> Vec<SessionId> {
        let mut finished: Vec<(&SessionId, &mut RecentsEntry)> = self
            .entries
            .iter_mut()
            .filter(|(id, entry)| {
                entry.state == RunState::Running
                    && meta
                        .get(*id)
                        .and_then(|m| m.latest_turn_id.as_deref())
                        .filter(|turn| !turn.is_empty())
                        .is_some_and(|turn| entry.started_turn_id.as_deref() != Some(turn))
            })
            .collect();
        finished.sort_by(|(a_id, a), (b_id, b)| {
            a.started_at.cmp(&b.started_at).then_with(|| a_id.cmp(b_id))
        });

        let mut ready_now = Vec::with_capacity(finished.len());
        for (id, entry) in finished {
            entry.state = RunState::Ready;
            ready_now.push(id.clone());
        }
        self.ready.extend(ready_now.iter().cloned());
        ready_now
    }

    /// Remove `session_id` from the ready set; true if it was there
    pub fn dismiss_ready(&mut self, session_id: &str) -> bool {
        let before = self.ready.len();
        self.ready.retain(|id| id != session_id);
        let removed = self.ready.len() != before;
        if removed {
            if let Some(entry) = self.entries.get_mut(session_id) {
                entry.state = RunState::Idle;
            }
        }
        removed
    }

    /// Drop a Running session back to Idle without it becoming ready
    pub fn cancel_run(&mut self, session_id: &str) {
        if let Some(entry) = self.entries.get_mut(session_id) {
            if entry.state == RunState::Running {
                entry.state = RunState::Idle;
            }
        }
    }

    pub fn ready_ids(&self) -> &[SessionId] {
        &self.ready
    }

    pub fn state(&self, session_id: &str) -> RunState {
        self.entries
            .get(session_id)
            .map(|e| e.state)
            .unwrap_or_default()
    }

    pub fn has_running(&self) -> bool {
        self.entries.values().any(|e| e.state == RunState::Running)
    }

    pub fn running_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, e)| e.state == RunState::Running)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_770_000_000 + secs, 0).unwrap()
    }

    fn meta(pairs: &[(&str, &str)]) -> HashMap<SessionId, SessionMeta> {
        pairs
            .iter()
            .map(|(id, turn)| {
                (
                    id.to_string(),
                    SessionMeta {
                        provider: Some("codex".into()),
                        latest_turn_id: Some(turn.to_string()),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn ready_set_is_fifo_by_start() {
        let mut recents = RecentsTracker::new();
        recents.start_run("s2", Some("t0".into()), t(2));
        recents.start_run("s1", Some("t0".into()), t(1));

        let ready = recents.observe_meta(&meta(&[("s1", "t1"), ("s2", "t1")]));
        assert_eq!(ready, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(recents.ready_ids(), ["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn earlier_ready_stays_ahead() {
        let mut recents = RecentsTracker::new();
        recents.start_run("late", None, t(1));
        recents.start_run("early", Some("a".into()), t(0));

        assert_eq!(recents.observe_meta(&meta(&[("late", "x")])), vec!["late"]);
        assert_eq!(recents.observe_meta(&meta(&[("early", "b")])), vec!["early"]);
        assert_eq!(recents.ready_ids(), ["late".to_string(), "early".to_string()]);
    }

    #[test]
    fn unchanged_turn_keeps_running() {
        let mut recents = RecentsTracker::new();
        recents.start_run("s1", Some("t0".into()), t(0));
        assert!(recents.observe_meta(&meta(&[("s1", "t0")])).is_empty());
        assert!(recents.observe_meta(&HashMap::new()).is_empty());
        assert_eq!(recents.state("s1"), RunState::Running);
        assert!(recents.has_running());
    }

    #[test]
    fn ready_is_reported_once() {
        let mut recents = RecentsTracker::new();
        recents.start_run("s1", Some("t0".into()), t(0));
        let polled = meta(&[("s1", "t1")]);
        assert_eq!(recents.observe_meta(&polled).len(), 1);
        assert!(recents.observe_meta(&polled).is_empty());
        assert_eq!(recents.ready_ids().len(), 1);
    }

    #[test]
    fn dismiss_then_cycle_again() {
        let mut recents = RecentsTracker::new();
        recents.start_run("s1", Some("t0".into()), t(0));
        recents.observe_meta(&meta(&[("s1", "t1")]));

        assert!(recents.dismiss_ready("s1"));
        assert!(!recents.dismiss_ready("s1"));
        assert_eq!(recents.state("s1"), RunState::Idle);

        recents.start_run("s1", Some("t1".into()), t(5));
        assert_eq!(recents.observe_meta(&meta(&[("s1", "t2")])), vec!["s1"]);
    }

    #[test]
    fn restart_while_ready_leaves_ready_set() {
        let mut recents = RecentsTracker::new();
        recents.start_run("s1", Some("t0".into()), t(0));
        recents.observe_meta(&meta(&[("s1", "t1")]));
        recents.start_run("s1", Some("t1".into()), t(3));
        assert!(recents.ready_ids().is_empty());
        assert_eq!(recents.state("s1"), RunState::Running);
    }

    #[test]
    fn cancel_only_affects_running() {
        let mut recents = RecentsTracker::new();
        recents.start_run("s1", None, t(0));
        recents.cancel_run("s1");
        assert_eq!(recents.state("s1"), RunState::Idle);
        assert!(recents.running_ids().is_empty());
        assert_eq!(recents.state("unknown"), RunState::Idle);
    }
}
