//! Transcript cache and chat block model
//!
//! Each session owns an ordered block sequence. Blocks are only ever
//! appended, merged into the last block, or replaced in place by ID, so the
//! order never depends on which source delivered a block first.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use super::errors::TranscriptError;
use super::merge_policy::{should_merge, MergeContext, MergeThresholds};
use super::types::{ChatBlock, ChatRole, ChatStatus, HistoryItem, ReasoningItem, SessionId};

/// A block about to enter the transcript
#[derive(Debug, Clone)]
pub struct BlockDraft {
    pub role: ChatRole,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub turn_id: Option<String>,
    pub provider_message_id: Option<String>,
    pub force_split: bool,
    pub status: ChatStatus,
    pub request_id: Option<u64>,
}

impl BlockDraft {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at: None,
            turn_id: None,
            provider_message_id: None,
            force_split: false,
            status: ChatStatus::Sent,
            request_id: None,
        }
    }

    /// Local echo of an outbound message awaiting confirmation
    pub fn local_echo(text: impl Into<String>, token: u64, at: DateTime<Utc>) -> Self {
        Self {
            created_at: Some(at),
            status: ChatStatus::Sending,
            request_id: Some(token),
            ..Self::new(ChatRole::User, text)
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    fn merge_context(&self) -> MergeContext {
        MergeContext {
            created_at: self.created_at,
            turn_id: self.turn_id.clone(),
            provider_message_id: self.provider_message_id.clone(),
            force_split: self.force_split,
        }
    }
}

/// Result of `append_or_merge`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub changed: bool,
    /// Index of the newly appended block; `None` when merged
    pub header_index: Option<usize>,
}

/// What a mutation changed, as seen by the request-activity tracker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleChange {
    /// An agent (non-reasoning) block was appended or changed
    pub agent_changed: bool,
    /// IDs of reasoning blocks that were appended or changed
    pub reasoning_ids: Vec<String>,
    /// The most recently created reasoning block after the change
    pub newest_reasoning_id: Option<String>,
    /// Anything at all changed
    pub any: bool,
}

impl VisibleChange {
    pub fn is_empty(&self) -> bool {
        !self.any
    }

    fn absorb(&mut self, role: ChatRole, id: &str) {
        self.any = true;
        match role {
            ChatRole::Agent => self.agent_changed = true,
            ChatRole::Reasoning => self.reasoning_ids.push(id.to_string()),
            _ => {}
        }
    }
}

/// Ordered blocks of one session plus the sticky collapse side-table
#[derive(Debug, Clone)]
pub struct SessionTranscript {
    session_id: SessionId,
    blocks: Vec<ChatBlock>,
    positions: HashMap<String, usize>,
    /// Manual collapse toggles, keyed by block ID; always win over policy
    collapse_overrides: HashMap<String, bool>,
    next_local_id: u64,
    history_cursor: Option<String>,
    /// Set once a history poll has succeeded; streams and sends alone do not count
    history_loaded: bool,
}

impl SessionTranscript {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            blocks: Vec::new(),
            positions: HashMap::new(),
            collapse_overrides: HashMap::new(),
            next_local_id: 0,
            history_cursor: None,
            history_loaded: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn blocks(&self) -> &[ChatBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ChatBlock> {
        self.positions.get(id).map(|&idx| &self.blocks[idx])
    }

    pub fn history_cursor(&self) -> Option<&str> {
        self.history_cursor.as_deref()
    }

    pub fn set_history_cursor(&mut self, cursor: Option<String>) {
        if cursor.is_some() {
            self.history_cursor = cursor;
        }
    }

    pub fn is_history_loaded(&self) -> bool {
        self.history_loaded
    }

    pub fn mark_history_loaded(&mut self) {
        self.history_loaded = true;
    }

    /// Latest turn ID seen on any block
    pub fn latest_turn_id(&self) -> Option<&str> {
        self.blocks.iter().rev().find_map(|b| b.turn_id.as_deref())
    }

    fn allocate_id(&mut self, role: ChatRole) -> String {
        loop {
            self.next_local_id += 1;
            let id = format!("{}:local-{}", role.id_prefix(), self.next_local_id);
            if !self.positions.contains_key(&id) {
                return id;
            }
        }
    }

    fn push(&mut self, block: ChatBlock) -> usize {
        let idx = self.blocks.len();
        self.positions.insert(block.id.clone(), idx);
        self.blocks.push(block);
        idx
    }

    /// Insert `block`, or replace the text of the block with the same ID
    ///
    /// Returns false when the stored text is already identical, which makes
    /// repeated snapshots of the same upstream state a no-op.
    pub fn upsert_by_id(&mut self, block: ChatBlock) -> bool {
        match self.positions.get(&block.id) {
            Some(&idx) => {
                let existing = &mut self.blocks[idx];
                if existing.turn_id.is_none() {
                    existing.turn_id = block.turn_id;
                }
                if existing.provider_message_id.is_none() {
                    existing.provider_message_id = block.provider_message_id;
                }
                if existing.text == block.text {
                    return false;
                }
                existing.text = block.text;
                if block.created_at.is_some() {
                    existing.created_at = block.created_at;
                }
                true
            }
            None => {
                self.push(block);
                true
            }
        }
    }

    /// Append `draft`, or merge it into the last block when the merge policy allows
    pub fn append_or_merge(
        &mut self,
        draft: BlockDraft,
        thresholds: &MergeThresholds,
    ) -> AppendOutcome {
        if draft.role == ChatRole::Agent {
            let ctx = draft.merge_context();
            if let Some(last) = self.blocks.last_mut() {
                if should_merge(last, &draft.text, &ctx, thresholds) {
                    last.text.push_str(&draft.text);
                    if let Some(at) = draft.created_at {
                        if last.created_at.map_or(true, |current| at > current) {
                            last.created_at = Some(at);
                        }
                    }
                    if last.turn_id.is_none() {
                        last.turn_id = draft.turn_id;
                    }
                    return AppendOutcome {
                        changed: true,
                        header_index: None,
                    };
                }
            }
        }

        let id = match (&draft.role, &draft.request_id) {
            (ChatRole::User, Some(token)) if !self.positions.contains_key(&echo_id(*token)) => {
                echo_id(*token)
            }
            _ => self.allocate_id(draft.role),
        };
        let block = ChatBlock {
            id,
            role: draft.role,
            text: draft.text,
            status: draft.status,
            created_at: draft.created_at,
            turn_id: draft.turn_id,
            provider_message_id: draft.provider_message_id,
            session_id: self.session_id.clone(),
            collapsed: false,
            request_id: draft.request_id,
        };
        let idx = self.push(block);
        AppendOutcome {
            changed: true,
            header_index: Some(idx),
        }
    }

    /// Patch the status of the local echo for `token`
    ///
    /// `hint` is the header index recorded at send time; if the block there
    /// does not carry the token the transcript is searched instead.
    pub fn set_echo_status(&mut self, token: u64, hint: Option<usize>, status: ChatStatus) -> bool {
        let idx = hint
            .filter(|&idx| {
                self.blocks
                    .get(idx)
                    .is_some_and(|b| b.request_id == Some(token))
            })
            .or_else(|| {
                self.blocks
                    .iter()
                    .position(|b| b.request_id == Some(token))
            });
        match idx {
            Some(idx) if self.blocks[idx].status != status => {
                self.blocks[idx].status = status;
                true
            }
            _ => false,
        }
    }

    /// Apply a snapshot of hidden-reasoning items
    pub fn apply_reasoning(&mut self, items: &[ReasoningItem], active: bool) -> VisibleChange {
        let mut change = VisibleChange::default();
        let mut added = HashSet::new();

        for item in items {
            let id = ChatBlock::reasoning_id(&item.key);
            let is_new = !self.positions.contains_key(&id);
            let mut block = ChatBlock::new(
                id.clone(),
                self.session_id.clone(),
                ChatRole::Reasoning,
                item.text.clone(),
            );
            block.created_at = item.created_at;
            if self.upsert_by_id(block) {
                change.absorb(ChatRole::Reasoning, &id);
            }
            if is_new {
                added.insert(id);
            }
        }

        self.apply_collapse_policy(active, &added);
        change.newest_reasoning_id = self.newest_reasoning_id().map(str::to_string);
        change
    }

    /// Merge a polled history page by identity
    pub fn reconcile_history(&mut self, items: &[HistoryItem], active: bool) -> VisibleChange {
        let mut change = VisibleChange::default();
        let mut added = HashSet::new();

        for item in items {
            if self.positions.contains_key(&item.id) {
                if self.upsert_by_id(history_block(&self.session_id, item)) {
                    change.absorb(item.role, &item.id);
                }
                continue;
            }

            if let Some(idx) = self.find_by_provider_message_id(item) {
                self.rekey(idx, &item.id);
                if self.upsert_by_id(history_block(&self.session_id, item)) {
                    change.absorb(item.role, &item.id);
                }
                continue;
            }

            if let Some(idx) = self.find_adoptable_echo(item) {
                let block = &mut self.blocks[idx];
                block.status = ChatStatus::Sent;
                block.provider_message_id = item.provider_message_id.clone();
                if block.turn_id.is_none() {
                    block.turn_id = item.turn_id.clone();
                }
                self.rekey(idx, &item.id);
                change.any = true;
                continue;
            }

            self.push(history_block(&self.session_id, item));
            if item.role == ChatRole::Reasoning {
                added.insert(item.id.clone());
            }
            change.absorb(item.role, &item.id);
        }

        self.apply_collapse_policy(active, &added);
        change.newest_reasoning_id = self.newest_reasoning_id().map(str::to_string);
        change
    }

    fn find_by_provider_message_id(&self, item: &HistoryItem) -> Option<usize> {
        let pmid = item.provider_message_id.as_deref().filter(|s| !s.is_empty())?;
        self.blocks.iter().position(|b| {
            b.role == item.role && b.provider_message_id.as_deref() == Some(pmid)
        })
    }

    /// An unconfirmed-by-history local echo with the same text
    fn find_adoptable_echo(&self, item: &HistoryItem) -> Option<usize> {
        if item.role != ChatRole::User {
            return None;
        }
        let text = item.text.trim();
        self.blocks.iter().position(|b| {
            b.role == ChatRole::User
                && b.request_id.is_some()
                && b.provider_message_id.is_none()
                && b.status != ChatStatus::Failed
                && b.id.starts_with("echo:")
                && b.text.trim() == text
        })
    }

    fn rekey(&mut self, idx: usize, new_id: &str) {
        let old_id = std::mem::replace(&mut self.blocks[idx].id, new_id.to_string());
        self.positions.remove(&old_id);
        self.positions.insert(new_id.to_string(), idx);
        if let Some(flag) = self.collapse_overrides.remove(&old_id) {
            self.collapse_overrides.insert(new_id.to_string(), flag);
        }
    }

    fn newest_reasoning_id(&self) -> Option<&str> {
        self.blocks
            .iter()
            .rev()
            .find(|b| b.role == ChatRole::Reasoning)
            .map(|b| b.id.as_str())
    }

    /// Re-evaluate default collapse state of reasoning blocks
    ///
    /// Manual overrides always win. While a request is active the newest
    /// reasoning block is expanded and older ones collapsed; otherwise only
    /// blocks added in this pass get a default (collapsed).
    pub fn apply_collapse_policy(&mut self, active: bool, added: &HashSet<String>) {
        let newest = self.newest_reasoning_id().map(str::to_string);
        for block in self
            .blocks
            .iter_mut()
            .filter(|b| b.role == ChatRole::Reasoning)
        {
            if let Some(&flag) = self.collapse_overrides.get(&block.id) {
                block.collapsed = flag;
            } else if active {
                block.collapsed = newest.as_deref() != Some(block.id.as_str());
            } else if added.contains(&block.id) {
                block.collapsed = true;
            }
        }
    }

    /// Manually toggle a block; the choice sticks for the cache entry's lifetime
    pub fn toggle_collapsed(&mut self, id: &str) -> Result<bool, TranscriptError> {
        let idx = *self
            .positions
            .get(id)
            .ok_or_else(|| TranscriptError::BlockNotFound(id.to_string()))?;
        let block = &mut self.blocks[idx];
        if matches!(block.role, ChatRole::User | ChatRole::System) {
            return Err(TranscriptError::NotCollapsible(id.to_string()));
        }
        block.collapsed = !block.collapsed;
        self.collapse_overrides
            .insert(block.id.clone(), block.collapsed);
        Ok(block.collapsed)
    }

    pub fn has_override(&self, id: &str) -> bool {
        self.collapse_overrides.contains_key(id)
    }
}

fn echo_id(token: u64) -> String {
    format!("echo:{}", token)
}

fn history_block(session_id: &str, item: &HistoryItem) -> ChatBlock {
    ChatBlock {
        id: item.id.clone(),
        role: item.role,
        text: item.text.clone(),
        status: ChatStatus::Sent,
        created_at: item.created_at,
        turn_id: item.turn_id.clone(),
        provider_message_id: item.provider_message_id.clone(),
        session_id: session_id.to_string(),
        collapsed: false,
        request_id: None,
    }
}

/// Per-session transcripts with least-recently-focused eviction
#[derive(Debug)]
pub struct TranscriptCache {
    sessions: HashMap<SessionId, SessionTranscript>,
    recency: VecDeque<SessionId>,
    capacity: usize,
}

impl TranscriptCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            recency: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionTranscript> {
        self.sessions.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut SessionTranscript> {
        self.sessions.get_mut(session_id)
    }

    /// Get or create the transcript of `session_id`
    pub fn entry(&mut self, session_id: &str) -> &mut SessionTranscript {
        if !self.sessions.contains_key(session_id) {
            self.recency.push_back(session_id.to_string());
        }
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionTranscript::new(session_id))
    }

    /// Mark `session_id` as most recently focused
    pub fn touch(&mut self, session_id: &str) {
        if let Some(pos) = self.recency.iter().position(|id| id == session_id) {
            self.recency.remove(pos);
        }
        if self.sessions.contains_key(session_id) {
            self.recency.push_back(session_id.to_string());
        }
    }

    /// Drop a transcript together with its collapse side-table
    pub fn evict(&mut self, session_id: &str) -> bool {
        self.recency.retain(|id| id != session_id);
        self.sessions.remove(session_id).is_some()
    }

    /// Evict least recently focused transcripts beyond capacity
    pub fn evict_over_capacity(&mut self, protect: Option<&str>) -> Vec<SessionId> {
        let excess = self.sessions.len().saturating_sub(self.capacity);
        let victims: Vec<SessionId> = self
            .recency
            .iter()
            .filter(|id| protect != Some(id.as_str()))
            .take(excess)
            .cloned()
            .collect();
        for id in &victims {
            self.evict(id);
        }
        victims
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
