//! Serial reducer
//!
//! `Reconciler` is the single owner of every reconciliation component. It
//! consumes one input at a time, mutates its state and returns the effects
//! to run; results of those effects come back later as new inputs. Nothing
//! here blocks, spawns or reads a clock: time is passed in through
//! `ReduceContext`.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::core::load_debounce::LoadDebouncer;
use crate::core::transcript::SessionTranscript;
use crate::core::{
    select_approval_request, ApprovalRequest, BlockDraft, ChangeSource, ChatRole, ChatStatus,
    MergeThresholds, MutationClass, PendingSendRegistry, RecentsTracker, RequestActivityTracker,
    RunState, SelectionHistory, SelectionKey, SequenceGuard, SessionId, SessionMeta,
    TranscriptCache, VisibleChange,
};

use super::commands::Command;
use super::effects::Effect;
use super::events::{AppEvent, LoadCause, SessionEvent};
use super::middleware::{CommandContext, CommandPipeline};
use super::mode::UiMode;
use super::state::{PersistedAppState, Snapshot, StatusMessage};

/// Clock readings for one reduction
#[derive(Debug, Clone, Copy)]
pub struct ReduceContext {
    /// Monotonic time for staleness and polling intervals
    pub now: Instant,
    /// Wall time stamped on locally created blocks
    pub wall: DateTime<Utc>,
}

impl ReduceContext {
    pub fn new(now: Instant, wall: DateTime<Utc>) -> Self {
        Self { now, wall }
    }

    pub fn advanced(&self, by: Duration) -> Self {
        Self {
            now: self.now + by,
            wall: self.wall + chrono::Duration::milliseconds(by.as_millis() as i64),
        }
    }
}

/// A message for the reducer
#[derive(Debug)]
pub enum Input {
    Command(Command),
    Event(AppEvent),
}

impl From<Command> for Input {
    fn from(cmd: Command) -> Self {
        Self::Command(cmd)
    }
}

impl From<AppEvent> for Input {
    fn from(event: AppEvent) -> Self {
        Self::Event(event)
    }
}

pub struct Reconciler {
    pipeline: CommandPipeline,
    thresholds: MergeThresholds,
    default_provider: String,
    history_limit: usize,
    meta_poll_interval: Duration,

    transcripts: TranscriptCache,
    pending: PendingSendRegistry,
    guard: SequenceGuard,
    activity: RequestActivityTracker,
    recents: RecentsTracker,
    history: SelectionHistory,
    debouncer: LoadDebouncer,

    selection: Option<SelectionKey>,
    mode: UiMode,
    drafts: HashMap<SessionId, String>,
    approvals: HashMap<SessionId, Vec<ApprovalRequest>>,
    meta: HashMap<SessionId, SessionMeta>,
    streams: HashSet<SessionId>,
    loading: bool,
    approvals_loading: bool,
    meta_poll_in_flight: bool,
    last_meta_poll: Option<Instant>,
    status: Option<StatusMessage>,
    revision: u64,
    quit: bool,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("selection", &self.selection)
            .field("mode", &self.mode)
            .field("cached_sessions", &self.transcripts.len())
            .field("pending_sends", &self.pending.len())
            .field("revision", &self.revision)
            .finish()
    }
}

impl Reconciler {
    pub fn new(config: &Config) -> Self {
        Self {
            pipeline: CommandPipeline::standard(),
            thresholds: MergeThresholds::from(&config.merge),
            default_provider: config.client.default_provider.clone(),
            history_limit: config.selection.history_limit,
            meta_poll_interval: config.polling.meta_poll_interval(),

            transcripts: TranscriptCache::new(config.cache.max_cached_sessions),
            pending: PendingSendRegistry::new(),
            guard: SequenceGuard::new(),
            activity: RequestActivityTracker::new(config.activity.stale_refresh_delay()),
            recents: RecentsTracker::new(),
            history: SelectionHistory::new(config.selection.history_limit),
            debouncer: LoadDebouncer::new(config.selection.load_debounce()),

            selection: None,
            mode: UiMode::Browse,
            drafts: HashMap::new(),
            approvals: HashMap::new(),
            meta: HashMap::new(),
            streams: HashSet::new(),
            loading: false,
            approvals_loading: false,
            meta_poll_in_flight: false,
            last_meta_poll: None,
            status: None,
            revision: 0,
            quit: false,
        }
    }

    // ========== Accessors ==========

    pub fn focused_session(&self) -> Option<&str> {
        self.selection.as_ref().and_then(SelectionKey::session_id)
    }

    pub fn transcript(&self, session_id: &str) -> Option<&SessionTranscript> {
        self.transcripts.get(session_id)
    }

    pub fn pending_sends(&self) -> &PendingSendRegistry {
        &self.pending
    }

    pub fn activity(&self) -> &RequestActivityTracker {
        &self.activity
    }

    pub fn recents(&self) -> &RecentsTracker {
        &self.recents
    }

    pub fn history(&self) -> &SelectionHistory {
        &self.history
    }

    pub fn mode(&self) -> &UiMode {
        &self.mode
    }

    pub fn is_quit(&self) -> bool {
        self.quit
    }

    fn current_approval(&self) -> Option<&ApprovalRequest> {
        let session = self.focused_session()?;
        let outstanding = self.approvals.get(session)?;
        select_approval_request(outstanding.iter().map(Some))
    }

    fn current_draft(&self) -> &str {
        self.focused_session()
            .and_then(|s| self.drafts.get(s))
            .map_or("", String::as_str)
    }

    fn provider_for(&self, session_id: &str) -> String {
        self.meta
            .get(session_id)
            .and_then(|m| m.provider.clone())
            .unwrap_or_else(|| self.default_provider.clone())
    }

    fn history_cursor(&self, session_id: &str) -> Option<String> {
        self.transcripts
            .get(session_id)
            .and_then(|t| t.history_cursor())
            .map(str::to_string)
    }

    /// Build the immutable render view
    pub fn snapshot(&self) -> Snapshot {
        let focused = self.focused_session();
        Snapshot {
            revision: self.revision,
            mode: self.mode.clone(),
            selection: self.selection.clone(),
            focused_session: focused.map(str::to_string),
            blocks: focused
                .and_then(|s| self.transcripts.get(s))
                .map(|t| t.blocks().to_vec())
                .unwrap_or_default(),
            activity: self
                .activity
                .state()
                .filter(|s| Some(s.session_id.as_str()) == focused)
                .cloned(),
            loading: self.loading,
            approvals_loading: self.approvals_loading,
            approval: self.current_approval().cloned(),
            ready: self.recents.ready_ids().to_vec(),
            draft: self.current_draft().to_string(),
            status: self.status.clone(),
            can_go_back: self.history.can_go_back(),
            can_go_forward: self.history.can_go_forward(),
            quit: self.quit,
        }
    }

    /// State handed to the app-state store
    pub fn persisted(&self) -> PersistedAppState {
        PersistedAppState {
            selection: self.selection.as_ref().map(ToString::to_string),
            history: self.history.entries().iter().map(ToString::to_string).collect(),
            history_cursor: self.history.cursor(),
            drafts: self
                .drafts
                .iter()
                .filter(|(_, text)| !text.is_empty())
                .map(|(id, text)| (id.clone(), text.clone()))
                .collect(),
        }
    }

    /// Re-apply persisted state at startup
    pub fn restore(&mut self, state: PersistedAppState, ctx: &ReduceContext) -> Vec<Effect> {
        let entries = state
            .history
            .iter()
            .filter_map(|raw| SelectionKey::parse(raw))
            .collect();
        self.history = SelectionHistory::restore(entries, state.history_cursor, self.history_limit);
        self.drafts = state.drafts.into_iter().collect();

        let mut effects = Vec::new();
        if let Some(key) = state.selection.as_deref().and_then(SelectionKey::parse) {
            self.select(key, ChangeSource::System, ctx, &mut effects);
        }
        self.refresh_mode();
        effects
    }

    // ========== Reduction ==========

    /// Process one input and return the effects it requires
    pub fn reduce(&mut self, input: Input, ctx: &ReduceContext) -> Vec<Effect> {
        self.revision += 1;
        let mut effects = Vec::new();
        match input {
            Input::Command(cmd) => self.handle_command(cmd, ctx, &mut effects),
            Input::Event(event) => self.handle_event(event, ctx, &mut effects),
        }
        self.refresh_mode();
        effects
    }

    fn refresh_mode(&mut self) {
        self.mode = match self.current_approval() {
            Some(request) => UiMode::Approve {
                approval_id: request.id.clone(),
            },
            None if !self.current_draft().is_empty() => UiMode::Compose,
            None => UiMode::Browse,
        };
    }

    fn handle_command(&mut self, cmd: Command, ctx: &ReduceContext, effects: &mut Vec<Effect>) {
        let focused = self.focused_session().map(str::to_string);
        let command_ctx = CommandContext {
            mode: &self.mode,
            focused_session: focused.as_deref(),
        };
        let cmd = match self.pipeline.process(cmd, &command_ctx) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => return,
            Err(err) => {
                tracing::debug!(error = %err, "command rejected");
                self.status = Some(StatusMessage::warning(err.to_string()));
                return;
            }
        };

        match cmd {
            Command::Quit => {
                self.quit = true;
                effects.push(Effect::Quit);
            }
            Command::Select { key, source } => self.select(key, source, ctx, effects),
            Command::HistoryBack => {
                if let Some(key) = self.history.back() {
                    self.select(key, ChangeSource::History, ctx, effects);
                }
            }
            Command::HistoryForward => {
                if let Some(key) = self.history.forward() {
                    self.select(key, ChangeSource::History, ctx, effects);
                }
            }
            Command::DismissReady(session_id) => {
                if self.recents.dismiss_ready(&session_id) {
                    tracing::debug!(session_id = %session_id, "ready session dismissed");
                }
            }
            Command::UpdateDraft(text) => {
                if let Some(session_id) = focused {
                    if text.is_empty() {
                        self.drafts.remove(&session_id);
                    } else {
                        self.drafts.insert(session_id, text);
                    }
                }
            }
            Command::SendMessage(text) => {
                if let Some(session_id) = focused {
                    self.send(session_id, text, ctx, effects);
                }
            }
            Command::ToggleCollapsed(block_id) => {
                let Some(transcript) = focused
                    .as_deref()
                    .and_then(|s| self.transcripts.get_mut(s))
                else {
                    return;
                };
                if let Err(err) = transcript.toggle_collapsed(&block_id) {
                    self.status = Some(StatusMessage::warning(err.to_string()));
                }
            }
            Command::RespondApproval {
                approval_id: Some(approval_id),
                decision,
            } => {
                let owner = self
                    .approvals
                    .iter()
                    .find(|(_, list)| list.iter().any(|a| a.id == approval_id))
                    .map(|(session, _)| session.clone());
                match owner {
                    Some(session_id) => effects.push(Effect::RespondApproval {
                        session_id,
                        approval_id,
                        decision,
                    }),
                    None => {
                        self.status = Some(StatusMessage::warning(format!(
                            "Approval {} is no longer pending",
                            approval_id
                        )));
                    }
                }
            }
            Command::RespondApproval {
                approval_id: None, ..
            } => {}
            Command::RequestSave => self.request_save(effects),
        }
    }

    fn handle_event(&mut self, event: AppEvent, ctx: &ReduceContext, effects: &mut Vec<Effect>) {
        match event {
            AppEvent::Tick => self.on_tick(ctx, effects),

            AppEvent::SendCompleted { token, result } => {
                let Some(entry) = self.pending.resolve(token) else {
                    tracing::debug!(token, "confirmation for unknown send token ignored");
                    return;
                };
                let status = if result.is_ok() {
                    ChatStatus::Sent
                } else {
                    ChatStatus::Failed
                };
                if let Some(transcript) = self.transcripts.get_mut(&entry.session_id) {
                    transcript.set_echo_status(token, entry.header_block_index, status);
                }
                match result {
                    Ok(_) => {
                        tracing::debug!(session_id = %entry.session_id, token, "send confirmed");
                    }
                    Err(err) => {
                        tracing::warn!(session_id = %entry.session_id, token, error = %err, "send failed");
                        self.status = Some(StatusMessage::error(format!("Send failed: {}", err)));
                        self.activity.abort(&entry.session_id);
                        self.recents.cancel_run(&entry.session_id);
                    }
                }
            }

            AppEvent::Stream { session_id, event } => {
                self.apply_stream_event(session_id, event, ctx, effects);
            }

            AppEvent::StreamClosed { session_id, error } => {
                self.streams.remove(&session_id);
                match error {
                    Some(error) => {
                        tracing::warn!(session_id = %session_id, error = %error, "push stream closed");
                        self.status = Some(StatusMessage::warning(format!(
                            "Live updates for {} stopped: {}",
                            session_id, error
                        )));
                    }
                    None => tracing::debug!(session_id = %session_id, "push stream ended"),
                }
            }

            AppEvent::LoadTimerFired(ticket) => {
                if !self.debouncer.is_current(&ticket) {
                    tracing::trace!(seq = ticket.seq, session_id = %ticket.session_id, "superseded load discarded");
                    return;
                }
                let since = self.history_cursor(&ticket.session_id);
                effects.push(Effect::PollHistory {
                    session_id: ticket.session_id,
                    since,
                    cause: LoadCause::Select,
                });
            }

            AppEvent::HistoryLoaded {
                session_id,
                cause,
                result,
            } => {
                let focused = self.focused_session() == Some(session_id.as_str());
                if focused && cause == LoadCause::Select {
                    self.loading = false;
                    self.approvals_loading = false;
                }
                match result {
                    Ok(page) => {
                        let active = self.activity.is_active_for(&session_id);
                        let transcript = self.transcripts.entry(&session_id);
                        let change = transcript.reconcile_history(&page.items, active);
                        transcript.set_history_cursor(page.cursor);
                        transcript.mark_history_loaded();
                        tracing::debug!(
                            session_id = %session_id,
                            items = page.items.len(),
                            ?cause,
                            "history reconciled"
                        );
                        self.activity
                            .note_visible_update(&session_id, &change, ctx.now);
                        if focused {
                            self.transcripts.touch(&session_id);
                        }
                        self.evict_transcripts(effects);
                    }
                    Err(err) => {
                        tracing::warn!(session_id = %session_id, error = %err, ?cause, "history poll failed");
                        self.status = Some(StatusMessage::error(format!(
                            "Failed to load history for {}: {}",
                            session_id, err
                        )));
                    }
                }
            }

            AppEvent::MetaPolled { result } => {
                self.meta_poll_in_flight = false;
                match result {
                    Ok(polled) => self.observe_meta(polled),
                    Err(err) => {
                        tracing::warn!(error = %err, "meta poll failed");
                        self.status =
                            Some(StatusMessage::warning(format!("Session status unavailable: {}", err)));
                    }
                }
            }

            AppEvent::SaveCompleted { seq, result } => {
                if !self.guard.accept(MutationClass::PersistAppState, seq) {
                    tracing::trace!(seq, "superseded save result discarded");
                    return;
                }
                if let Err(err) = result {
                    tracing::warn!(seq, error = %err, "saving app state failed");
                    self.status = Some(StatusMessage::warning(format!("Failed to save state: {}", err)));
                }
            }

            AppEvent::ApprovalResponded {
                session_id,
                approval_id,
                decision,
                result,
            } => match result {
                Ok(()) => {
                    self.remove_approval(&session_id, &approval_id);
                    self.status = Some(StatusMessage::info(format!(
                        "Approval {}",
                        decision.label()
                    )));
                }
                Err(err) => {
                    tracing::warn!(session_id = %session_id, approval_id = %approval_id, error = %err, "approval response failed");
                    self.status = Some(StatusMessage::error(format!(
                        "Approval response failed: {}",
                        err
                    )));
                }
            },
        }
    }

    // ========== Operations ==========

    fn select(
        &mut self,
        key: SelectionKey,
        source: ChangeSource,
        _ctx: &ReduceContext,
        effects: &mut Vec<Effect>,
    ) {
        self.history.apply(key.clone(), source);
        let changed = self.selection.as_ref() != Some(&key);
        if changed && source == ChangeSource::User {
            self.status = None;
        }
        self.selection = Some(key.clone());

        let session = key.session_id().map(str::to_string);
        self.activity.focus_changed(session.as_deref());

        match session {
            None => {
                self.debouncer.supersede();
                self.loading = false;
                self.approvals_loading = false;
            }
            Some(session_id) => {
                if self.recents.dismiss_ready(&session_id) {
                    tracing::debug!(session_id = %session_id, "focused ready session dismissed");
                }
                let loaded = self
                    .transcripts
                    .get(&session_id)
                    .is_some_and(SessionTranscript::is_history_loaded);
                if loaded {
                    self.transcripts.touch(&session_id);
                    self.debouncer.supersede();
                    self.loading = false;
                    self.approvals_loading = false;
                } else {
                    self.loading = true;
                    self.approvals_loading = true;
                    let ticket = self.debouncer.schedule(&session_id);
                    effects.push(Effect::ScheduleLoad {
                        ticket,
                        delay: self.debouncer.delay(),
                    });
                }
                self.ensure_stream(&session_id, effects);
                self.evict_transcripts(effects);
            }
        }

        if changed {
            self.request_save(effects);
        }
    }

    fn send(
        &mut self,
        session_id: SessionId,
        text: String,
        ctx: &ReduceContext,
        effects: &mut Vec<Effect>,
    ) {
        let token = self.pending.next_token();
        let provider = self.provider_for(&session_id);

        let transcript = self.transcripts.entry(&session_id);
        let outcome = transcript.append_or_merge(
            BlockDraft::local_echo(text.clone(), token, ctx.wall),
            &self.thresholds,
        );
        let start_turn = self
            .meta
            .get(&session_id)
            .and_then(|m| m.latest_turn_id.clone())
            .or_else(|| transcript.latest_turn_id().map(str::to_string));

        match outcome.header_index {
            Some(index) => {
                self.pending
                    .register_header_index(token, &session_id, &provider, index)
            }
            None => self.pending.register(token, &session_id, &provider),
        }
        self.activity.start(&session_id, &provider, ctx.now);
        self.recents.start_run(&session_id, start_turn, ctx.wall);
        self.drafts.remove(&session_id);

        tracing::debug!(session_id = %session_id, token, "message queued");
        effects.push(Effect::SendMessage {
            token,
            session_id: session_id.clone(),
            text,
        });
        self.ensure_stream(&session_id, effects);
        self.evict_transcripts(effects);
    }

    fn apply_stream_event(
        &mut self,
        session_id: SessionId,
        event: SessionEvent,
        ctx: &ReduceContext,
        effects: &mut Vec<Effect>,
    ) {
        if !self.streams.contains(&session_id) {
            tracing::trace!(session_id = %session_id, "event from an untracked stream discarded");
            return;
        }
        let active = self.activity.is_active_for(&session_id);
        let change = match event {
            SessionEvent::ApprovalRequested { request } => {
                let outstanding = self.approvals.entry(session_id).or_default();
                if !outstanding.iter().any(|a| a.id == request.id) {
                    outstanding.push(request);
                }
                return;
            }
            SessionEvent::ApprovalResolved { approval_id } => {
                self.remove_approval(&session_id, &approval_id);
                return;
            }
            SessionEvent::TurnCompleted { turn_id } => {
                let Some(turn_id) = turn_id else {
                    return;
                };
                let meta = self.meta.entry(session_id.clone()).or_default();
                meta.latest_turn_id = Some(turn_id);
                let observed = HashMap::from([(session_id, meta.clone())]);
                self.observe_meta(observed);
                return;
            }
            SessionEvent::AgentDelta {
                text,
                created_at,
                turn_id,
                provider_message_id,
                force_split,
            } => {
                if text.trim().is_empty() {
                    return;
                }
                let draft = BlockDraft {
                    role: ChatRole::Agent,
                    text,
                    created_at: created_at.or(Some(ctx.wall)),
                    turn_id,
                    provider_message_id,
                    force_split,
                    status: ChatStatus::Sent,
                    request_id: None,
                };
                let outcome = self
                    .transcripts
                    .entry(&session_id)
                    .append_or_merge(draft, &self.thresholds);
                VisibleChange {
                    agent_changed: outcome.changed,
                    any: outcome.changed,
                    ..Default::default()
                }
            }
            SessionEvent::Reasoning { items } => self
                .transcripts
                .entry(&session_id)
                .apply_reasoning(&items, active),
            SessionEvent::Message { item } => self
                .transcripts
                .entry(&session_id)
                .reconcile_history(std::slice::from_ref(&item), active),
        };

        self.activity
            .note_visible_update(&session_id, &change, ctx.now);
        self.evict_transcripts(effects);
    }

    fn observe_meta(&mut self, polled: HashMap<SessionId, SessionMeta>) {
        let ready = self.recents.observe_meta(&polled);
        self.meta.extend(polled);
        let focused = self.focused_session().map(str::to_string);
        for session_id in ready {
            tracing::info!(session_id = %session_id, "session ready");
            if focused.as_deref() == Some(session_id.as_str()) {
                self.recents.dismiss_ready(&session_id);
            }
        }
    }

    fn on_tick(&mut self, ctx: &ReduceContext, effects: &mut Vec<Effect>) {
        if let Some(session_id) = self.activity.maybe_auto_refresh(ctx.now) {
            let since = self.history_cursor(&session_id);
            effects.push(Effect::PollHistory {
                session_id,
                since,
                cause: LoadCause::StaleRefresh,
            });
        }

        if self.recents.has_running() && !self.meta_poll_in_flight {
            let due = self.last_meta_poll.map_or(true, |at| {
                ctx.now.saturating_duration_since(at) >= self.meta_poll_interval
            });
            if due {
                self.meta_poll_in_flight = true;
                self.last_meta_poll = Some(ctx.now);
                effects.push(Effect::PollMeta {
                    session_ids: self.recents.running_ids(),
                });
            }
        }
    }

    fn request_save(&mut self, effects: &mut Vec<Effect>) {
        let seq = self.guard.issue(MutationClass::PersistAppState);
        effects.push(Effect::SaveState {
            seq,
            state: self.persisted(),
        });
    }

    fn ensure_stream(&mut self, session_id: &str, effects: &mut Vec<Effect>) {
        if self.streams.insert(session_id.to_string()) {
            effects.push(Effect::OpenStream {
                session_id: session_id.to_string(),
            });
        }
    }

    fn remove_approval(&mut self, session_id: &str, approval_id: &str) {
        if let Some(outstanding) = self.approvals.get_mut(session_id) {
            outstanding.retain(|a| a.id != approval_id);
            if outstanding.is_empty() {
                self.approvals.remove(session_id);
            }
        }
    }

    /// Evict cold transcripts and everything keyed by their sessions
    ///
    /// Meta of a session that is still running stays, so its readiness can
    /// be observed and a later send knows its provider.
    fn evict_transcripts(&mut self, effects: &mut Vec<Effect>) {
        let focused = self.focused_session().map(str::to_string);
        for session_id in self.transcripts.evict_over_capacity(focused.as_deref()) {
            let dropped = self.pending.clear_session(&session_id);
            if self.streams.remove(&session_id) {
                effects.push(Effect::CloseStream {
                    session_id: session_id.clone(),
                });
            }
            self.approvals.remove(&session_id);
            if self.recents.state(&session_id) != RunState::Running {
                self.meta.remove(&session_id);
            }
            tracing::debug!(session_id = %session_id, dropped, "transcript evicted");
        }
    }
}
