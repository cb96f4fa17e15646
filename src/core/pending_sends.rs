//! Pending-send registry
//!
//! Tracks locally echoed outbound messages by token until the backend
//! confirms or fails them. Resolving removes the entry, so a duplicate or
//! retried confirmation can never apply twice.

use std::collections::HashMap;

use super::types::SessionId;

/// A message submitted but not yet confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub token: u64,
    pub session_id: SessionId,
    pub provider: String,
    /// Index of the local echo block to patch on confirmation or failure
    pub header_block_index: Option<usize>,
}

#[derive(Debug, Default)]
pub struct PendingSendRegistry {
    last_token: u64,
    entries: HashMap<u64, PendingSend>,
}

impl PendingSendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next token; unique for the registry's lifetime
    pub fn next_token(&mut self) -> u64 {
        self.last_token += 1;
        self.last_token
    }

    /// Insert a pending entry; a token that is already present is left alone
    pub fn register(&mut self, token: u64, session_id: &str, provider: &str) {
        self.entries.entry(token).or_insert_with(|| PendingSend {
            token,
            session_id: session_id.to_string(),
            provider: provider.to_string(),
            header_block_index: None,
        });
    }

    /// Attach the local echo block index, registering the token if needed
    pub fn register_header_index(
        &mut self,
        token: u64,
        session_id: &str,
        provider: &str,
        index: usize,
    ) {
        self.register(token, session_id, provider);
        if let Some(entry) = self.entries.get_mut(&token) {
            entry.header_block_index = Some(index);
        }
    }

    /// Remove and return the entry; `None` means already resolved or reset
    pub fn resolve(&mut self, token: u64) -> Option<PendingSend> {
        self.entries.remove(&token)
    }

    pub fn get(&self, token: u64) -> Option<&PendingSend> {
        self.entries.get(&token)
    }

    /// Drop every pending entry of a session (its transcript was evicted)
    pub fn clear_session(&mut self, session_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.session_id != session_id);
        before - self.entries.len()
    }

    pub fn pending_for(&self, session_id: &str) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.session_id == session_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn resolve_consumes_entry() {
        let mut registry = PendingSendRegistry::new();
        let token = registry.next_token();
        registry.register_header_index(token, "s1", "codex", 0);

        let entry = registry.resolve(token).unwrap();
        assert_eq!(entry.header_block_index, Some(0));
        assert_eq!(entry.session_id, "s1");
        assert!(registry.resolve(token).is_none());
    }

    #[test]
    fn unknown_token_is_noop() {
        let mut registry = PendingSendRegistry::new();
        assert!(registry.resolve(42).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_register_keeps_first_entry() {
        let mut registry = PendingSendRegistry::new();
        registry.register(1, "s1", "codex");
        registry.register(1, "s2", "claude");
        assert_eq!(registry.get(1).unwrap().session_id, "s1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn header_index_attaches_to_existing_entry() {
        let mut registry = PendingSendRegistry::new();
        registry.register(3, "s1", "codex");
        registry.register_header_index(3, "s1", "codex", 7);
        assert_eq!(registry.get(3).unwrap().header_block_index, Some(7));
    }

    #[test]
    fn clear_session_drops_only_that_session() {
        let mut registry = PendingSendRegistry::new();
        registry.register(1, "s1", "codex");
        registry.register(2, "s2", "codex");
        registry.register(3, "s1", "codex");

        assert_eq!(registry.clear_session("s1"), 2);
        assert_eq!(registry.pending_for("s2"), 1);
        assert!(registry.resolve(1).is_none());
    }

    proptest! {
        #[test]
        fn prop_tokens_strictly_increase(n in 1usize..200) {
            let mut registry = PendingSendRegistry::new();
            let tokens: Vec<u64> = (0..n).map(|_| registry.next_token()).collect();
            prop_assert!(tokens.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(tokens.len(), n);
        }
    }
}
