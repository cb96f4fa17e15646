//! Sequence guard for fire-and-forget mutations
//!
//! Every request captures the counter value of its mutation class at issue
//! time. A response is applied only when its value is still the latest one
//! issued for that class; anything older has been superseded.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Mutation classes guarded by the reducer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationClass {
    /// Persisting selection, drafts and history stack
    PersistAppState,
}

/// Issues strictly increasing sequence numbers per class
#[derive(Debug, Clone)]
pub struct SequenceGuard<K = MutationClass> {
    latest: HashMap<K, u64>,
}

impl<K: Eq + Hash + Copy> SequenceGuard<K> {
    pub fn new() -> Self {
        Self {
            latest: HashMap::new(),
        }
    }

    /// Issue a new sequence number for `class` and record it as the latest
    pub fn issue(&mut self, class: K) -> u64 {
        let seq = self.latest.entry(class).or_insert(0);
        *seq += 1;
        *seq
    }

    /// True iff `seq` is the most recently issued value for `class`
    ///
    /// Checking does not advance or reset anything.
    pub fn accept(&self, class: K, seq: u64) -> bool {
        self.latest.get(&class) == Some(&seq)
    }

    /// Latest value issued for `class`, if any
    pub fn latest(&self, class: K) -> Option<u64> {
        self.latest.get(&class).copied()
    }
}

impl<K: Eq + Hash + Copy> Default for SequenceGuard<K> {
    fn default() -> Self {
        Self::new()
    }
}
