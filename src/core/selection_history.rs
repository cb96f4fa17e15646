//! Back/forward navigation over selected sidebar entities
//!
//! Only manual navigation grows the stack. Background re-syncs and history
//! replays overwrite the entry under the cursor.

use serde::{Deserialize, Serialize};

use super::types::{ChangeSource, SelectionKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionHistory {
    entries: Vec<SelectionKey>,
    cursor: usize,
    #[serde(skip, default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    200
}

impl Default for SelectionHistory {
    fn default() -> Self {
        Self::new(default_limit())
    }
}

impl SelectionHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            limit: limit.max(1),
        }
    }

    /// Rebuild from persisted entries, clamping the cursor
    pub fn restore(entries: Vec<SelectionKey>, cursor: usize, limit: usize) -> Self {
        let mut history = Self::new(limit);
        let overflow = entries.len().saturating_sub(history.limit);
        history.entries = entries.into_iter().skip(overflow).collect();
        history.cursor = cursor
            .saturating_sub(overflow)
            .min(history.entries.len().saturating_sub(1));
        history
    }

    pub fn current(&self) -> Option<&SelectionKey> {
        self.entries.get(self.cursor)
    }

    pub fn entries(&self) -> &[SelectionKey] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries up to and including the cursor
    pub fn depth(&self) -> usize {
        if self.entries.is_empty() {
            0
        } else {
            self.cursor + 1
        }
    }

    /// Route a selection change to `visit` or `sync_current` by its source
    pub fn apply(&mut self, key: SelectionKey, source: ChangeSource) {
        match source {
            ChangeSource::User => self.visit(key),
            ChangeSource::System | ChangeSource::History => self.sync_current(key),
        }
    }

    /// Push `key`, truncating forward entries; no-op if it is already current
    pub fn visit(&mut self, key: SelectionKey) {
        if self.current() == Some(&key) {
            return;
        }
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(key);
        if self.entries.len() > self.limit {
            self.entries.remove(0);
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Overwrite the entry under the cursor without changing depth
    pub fn sync_current(&mut self, key: SelectionKey) {
        match self.entries.get_mut(self.cursor) {
            Some(slot) => *slot = key,
            None => {
                self.entries.push(key);
                self.cursor = 0;
            }
        }
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn back(&mut self) -> Option<SelectionKey> {
        if !self.can_go_back() {
            return None;
        }
        self.cursor -= 1;
        self.current().cloned()
    }

    pub fn forward(&mut self) -> Option<SelectionKey> {
        if !self.can_go_forward() {
            return None;
        }
        self.cursor += 1;
        self.current().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(id: &str) -> SelectionKey {
        SelectionKey::Session(id.to_string())
    }

    #[test]
    fn system_change_after_back_keeps_depth() {
        let mut history = SelectionHistory::default();
        history.apply(s("a"), ChangeSource::User);
        history.apply(s("b"), ChangeSource::User);
        history.apply(s("c"), ChangeSource::User);
        assert_eq!(history.back(), Some(s("b")));
        let depth = history.depth();

        history.apply(SelectionKey::Workspace("w".into()), ChangeSource::System);
        assert_eq!(history.depth(), depth);
        assert_eq!(history.len(), 3);
        assert_eq!(history.current(), Some(&SelectionKey::Workspace("w".into())));

        history.apply(s("d"), ChangeSource::User);
        assert_eq!(history.depth(), depth + 1);
        assert_eq!(history.entries(), &[s("a"), SelectionKey::Workspace("w".into()), s("d")]);
    }

    #[test]
    fn history_replay_syncs_in_place() {
        let mut history = SelectionHistory::default();
        history.visit(s("a"));
        history.visit(s("b"));
        let key = history.back().unwrap();
        history.apply(key, ChangeSource::History);
        assert_eq!(history.len(), 2);
        assert_eq!(history.forward(), Some(s("b")));
        assert_eq!(history.forward(), None);
    }

    #[test]
    fn visiting_current_is_noop() {
        let mut history = SelectionHistory::default();
        history.visit(s("a"));
        history.visit(s("a"));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn sync_on_empty_pushes_one_entry() {
        let mut history = SelectionHistory::default();
        history.sync_current(s("a"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.current(), Some(&s("a")));
        assert!(!history.can_go_back());
    }

    #[test]
    fn limit_drops_oldest() {
        let mut history = SelectionHistory::new(3);
        for id in ["a", "b", "c", "d"] {
            history.visit(s(id));
        }
        assert_eq!(history.entries(), &[s("b"), s("c"), s("d")]);
        assert_eq!(history.cursor(), 2);
    }

    #[test]
    fn restore_clamps_cursor() {
        let history = SelectionHistory::restore(vec![s("a"), s("b")], 9, 10);
        assert_eq!(history.current(), Some(&s("b")));

        let history = SelectionHistory::restore(vec![s("a"), s("b"), s("c")], 1, 2);
        assert_eq!(history.entries(), &[s("b"), s("c")]);
        assert_eq!(history.current(), Some(&s("b")));
    }
}
