//! Deterministic script replay
//!
//! Feeds a JSON-lines script of operator actions and backend responses
//! through the reducer on a virtual clock, with no tasks and no I/O. Saves
//! and approval responses succeed immediately; everything else the backend
//! would say must be spelled out in the script.

use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use colored::Colorize;
use serde::Deserialize;

use crate::config::Config;
use crate::core::load_debounce::LoadTicket;
use crate::core::{
    ApprovalDecision, ChangeSource, ChatRole, ChatStatus, HistoryItem, HistoryPage, SelectionKey,
    SessionId, SessionMeta,
};
use crate::ui_backend::{
    ApiError, AppEvent, Command, Effect, Input, LoadCause, ReduceContext, Reconciler,
    SendReceipt, SessionEvent, Snapshot, StatusLevel, UiRenderer,
};

fn user_source() -> ChangeSource {
    ChangeSource::User
}

/// One line of a replay script
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    Select {
        key: String,
        #[serde(default = "user_source")]
        source: ChangeSource,
    },
    Back,
    Forward,
    Draft {
        text: String,
    },
    Send {
        text: String,
    },
    /// Backend answer to the send with `token`
    Confirm {
        token: u64,
        #[serde(default)]
        error: Option<String>,
    },
    Stream {
        session: SessionId,
        event: SessionEvent,
    },
    History {
        session: SessionId,
        #[serde(default)]
        items: Vec<HistoryItem>,
        #[serde(default)]
        cursor: Option<String>,
    },
    Meta {
        sessions: HashMap<SessionId, SessionMeta>,
    },
    /// Move the virtual clock, firing timers and ticks on the way
    Advance {
        ms: u64,
    },
    Toggle {
        block_id: String,
    },
    Dismiss {
        session: SessionId,
    },
    Respond {
        decision: ApprovalDecision,
        #[serde(default)]
        approval_id: Option<String>,
    },
    Save,
}

impl ScriptStep {
    /// Parse a script; blank lines and `#` comments are skipped
    pub fn parse_script(reader: impl BufRead) -> Result<Vec<ScriptStep>> {
        let mut steps = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", idx + 1))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let step = serde_json::from_str(trimmed)
                .with_context(|| format!("Invalid step on line {}", idx + 1))?;
            steps.push(step);
        }
        Ok(steps)
    }
}

/// Reducer driven by a virtual clock
pub struct ReplayDriver {
    reconciler: Reconciler,
    ctx: ReduceContext,
    tick_interval: Duration,
    timers: Vec<(Instant, LoadTicket)>,
    queue: VecDeque<AppEvent>,
    select_polls: Vec<SessionId>,
    sent: Vec<(u64, SessionId, String)>,
    quit: bool,
}

impl ReplayDriver {
    pub fn new(config: &Config) -> Self {
        let wall: DateTime<Utc> = Utc
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            reconciler: Reconciler::new(config),
            ctx: ReduceContext::new(Instant::now(), wall),
            tick_interval: config.polling.tick_interval(),
            timers: Vec::new(),
            queue: VecDeque::new(),
            select_polls: Vec::new(),
            sent: Vec::new(),
            quit: false,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn snapshot(&self) -> Snapshot {
        self.reconciler.snapshot()
    }

    /// Messages handed to the backend so far: `(token, session, text)`
    pub fn sent(&self) -> &[(u64, SessionId, String)] {
        &self.sent
    }

    pub fn is_quit(&self) -> bool {
        self.quit
    }

    pub fn run_all(&mut self, steps: impl IntoIterator<Item = ScriptStep>) -> Result<()> {
        for step in steps {
            if self.quit {
                break;
            }
            self.apply(step)?;
        }
        Ok(())
    }

    pub fn apply(&mut self, step: ScriptStep) -> Result<()> {
        tracing::debug!(?step, "replay step");
        match step {
            ScriptStep::Select { key, source } => {
                let key = SelectionKey::parse(&key)
                    .with_context(|| format!("Invalid selection key: {}", key))?;
                self.feed(Command::Select { key, source }.into());
            }
            ScriptStep::Back => self.feed(Command::HistoryBack.into()),
            ScriptStep::Forward => self.feed(Command::HistoryForward.into()),
            ScriptStep::Draft { text } => self.feed(Command::UpdateDraft(text).into()),
            ScriptStep::Send { text } => self.feed(Command::SendMessage(text).into()),
            ScriptStep::Confirm { token, error } => {
                let result = match error {
                    Some(message) => Err(ApiError::Transport(message)),
                    None => Ok(SendReceipt::default()),
                };
                self.feed(AppEvent::SendCompleted { token, result }.into());
            }
            ScriptStep::Stream { session, event } => {
                self.feed(
                    AppEvent::Stream {
                        session_id: session,
                        event,
                    }
                    .into(),
                );
            }
            ScriptStep::History {
                session,
                items,
                cursor,
            } => {
                let cause = match self.select_polls.iter().position(|s| *s == session) {
                    Some(pos) => {
                        self.select_polls.remove(pos);
                        LoadCause::Select
                    }
                    None => LoadCause::StaleRefresh,
                };
                self.feed(
                    AppEvent::HistoryLoaded {
                        session_id: session,
                        cause,
                        result: Ok(HistoryPage { items, cursor }),
                    }
                    .into(),
                );
            }
            ScriptStep::Meta { sessions } => {
                self.feed(AppEvent::MetaPolled { result: Ok(sessions) }.into());
            }
            ScriptStep::Advance { ms } => self.advance(Duration::from_millis(ms)),
            ScriptStep::Toggle { block_id } => self.feed(Command::ToggleCollapsed(block_id).into()),
            ScriptStep::Dismiss { session } => self.feed(Command::DismissReady(session).into()),
            ScriptStep::Respond {
                decision,
                approval_id,
            } => self.feed(
                Command::RespondApproval {
                    approval_id,
                    decision,
                }
                .into(),
            ),
            ScriptStep::Save => self.feed(Command::RequestSave.into()),
        }
        Ok(())
    }

    fn advance(&mut self, by: Duration) {
        let target = self.ctx.now + by;
        loop {
            let next_tick = self.ctx.now + self.tick_interval;
            let next_timer = self.timers.iter().map(|(due, _)| *due).min();
            let next = match next_timer {
                Some(due) if due <= next_tick => due,
                _ => next_tick,
            };
            if next > target {
                break;
            }
            self.ctx = self.ctx.advanced(next.saturating_duration_since(self.ctx.now));

            let (due, pending): (Vec<_>, Vec<_>) =
                self.timers.drain(..).partition(|(at, _)| *at <= next);
            self.timers = pending;
            for (_, ticket) in due {
                self.feed(AppEvent::LoadTimerFired(ticket).into());
            }
            if next == next_tick {
                self.feed(AppEvent::Tick.into());
            }
        }
        let rest = target.saturating_duration_since(self.ctx.now);
        self.ctx = self.ctx.advanced(rest);
    }

    fn feed(&mut self, input: Input) {
        let effects = self.reconciler.reduce(input, &self.ctx);
        self.run_effects(effects);
        while let Some(event) = self.queue.pop_front() {
            let effects = self.reconciler.reduce(event.into(), &self.ctx);
            self.run_effects(effects);
        }
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ScheduleLoad { ticket, delay } => {
                    self.timers.push((self.ctx.now + delay, ticket));
                }
                Effect::PollHistory {
                    session_id,
                    cause: LoadCause::Select,
                    ..
                } => self.select_polls.push(session_id),
                Effect::PollHistory { .. }
                | Effect::PollMeta { .. }
                | Effect::OpenStream { .. }
                | Effect::CloseStream { .. } => {}
                Effect::SendMessage {
                    token,
                    session_id,
                    text,
                } => self.sent.push((token, session_id, text)),
                Effect::SaveState { seq, .. } => {
                    self.queue
                        .push_back(AppEvent::SaveCompleted { seq, result: Ok(()) });
                }
                Effect::RespondApproval {
                    session_id,
                    approval_id,
                    decision,
                } => self.queue.push_back(AppEvent::ApprovalResponded {
                    session_id,
                    approval_id,
                    decision,
                    result: Ok(()),
                }),
                Effect::Quit => self.quit = true,
            }
        }
    }
}

/// Plain-text transcript renderer
pub struct TranscriptPrinter<W: Write> {
    out: W,
}

impl<W: Write> TranscriptPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn role_label(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "you",
        ChatRole::Agent => "agent",
        ChatRole::Reasoning => "thinking",
        ChatRole::SessionNote => "note",
        ChatRole::WorkspaceNote => "workspace note",
        ChatRole::WorktreeNote => "worktree note",
        ChatRole::System => "system",
    }
}

impl<W: Write> UiRenderer for TranscriptPrinter<W> {
    fn render(&mut self, snapshot: &Snapshot) -> Result<()> {
        match &snapshot.selection {
            Some(key) => writeln!(self.out, "{} {}", "==".dimmed(), key.to_string().bold())?,
            None => writeln!(self.out, "{} nothing selected", "==".dimmed())?,
        }

        for block in &snapshot.blocks {
            let label = format!("[{}]", role_label(block.role));
            let label = match block.role {
                ChatRole::User => label.cyan(),
                ChatRole::Agent => label.green(),
                ChatRole::Reasoning => label.magenta(),
                ChatRole::System => label.red(),
                _ => label.yellow(),
            };
            let marker = match block.status {
                ChatStatus::Sending => " (sending)".dimmed(),
                ChatStatus::Failed => " (failed)".red(),
                ChatStatus::Sent => "".normal(),
            };
            if block.collapsed {
                let first = block.text.lines().next().unwrap_or_default();
                writeln!(self.out, "{} {} {}", label, "▸".dimmed(), first)?;
            } else {
                writeln!(self.out, "{} {}{}", label, block.text, marker)?;
            }
        }

        if let Some(approval) = &snapshot.approval {
            writeln!(self.out, "{} {}", "approval:".yellow().bold(), approval.title)?;
        }
        if let Some(activity) = &snapshot.activity {
            writeln!(
                self.out,
                "{} reasoning={} hidden={} refreshes={}",
                "working:".dimmed(),
                activity.reasoning_updates,
                activity.hidden_reasoning_count,
                activity.refresh_count
            )?;
        }
        if !snapshot.ready.is_empty() {
            writeln!(self.out, "{} {}", "ready:".green().bold(), snapshot.ready.join(", "))?;
        }
        if let Some(status) = &snapshot.status {
            let level = match status.level {
                StatusLevel::Info => "info:".normal(),
                StatusLevel::Warning => "warning:".yellow(),
                StatusLevel::Error => "error:".red(),
            };
            writeln!(self.out, "{} {}", level, status.text)?;
        }
        self.out.flush()?;
        Ok(())
    }
}
