//! In-process session backend
//!
//! Implements `SessionApi` over plain in-memory state. Push streams are
//! unbounded channels; the owner can inject stream events, history items
//! and turn completions to drive the reducer the way a live backend would.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::core::{ApprovalDecision, ChatRole, HistoryItem, HistoryPage, SessionId, SessionMeta};
use crate::ui_backend::{ApiError, EventStream, SendReceipt, SessionApi, SessionEvent};

#[derive(Debug, Default)]
struct MemorySession {
    history: Vec<HistoryItem>,
    meta: SessionMeta,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
    sent: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<SessionId, MemorySession>,
    next_message: u64,
    fail_next_send: Option<String>,
    history_polls: Vec<SessionId>,
    decisions: Vec<(String, ApprovalDecision)>,
}

impl Inner {
    fn session(&mut self, session_id: &str, provider: &str) -> &mut MemorySession {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| MemorySession {
                meta: SessionMeta {
                    provider: Some(provider.to_string()),
                    latest_turn_id: None,
                },
                ..Default::default()
            })
    }
}

/// `SessionApi` backed by process memory
#[derive(Debug)]
pub struct InMemorySessionApi {
    provider: String,
    inner: Mutex<Inner>,
}

impl InMemorySessionApi {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("in-memory backend lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Deliver `event` to every open stream of `session_id`
    ///
    /// Returns the number of streams that received it.
    pub fn push_event(&self, session_id: &str, event: SessionEvent) -> usize {
        let mut inner = self.lock();
        let session = inner.session(session_id, &self.provider);
        session
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
        session.subscribers.len()
    }

    /// Record an item that later history polls will return
    pub fn append_history(&self, session_id: &str, item: HistoryItem) {
        self.lock()
            .session(session_id, &self.provider)
            .history
            .push(item);
    }

    /// Finish a turn: update meta and announce it on the push stream
    pub fn complete_turn(&self, session_id: &str, turn_id: &str) {
        self.lock().session(session_id, &self.provider).meta.latest_turn_id =
            Some(turn_id.to_string());
        self.push_event(
            session_id,
            SessionEvent::TurnCompleted {
                turn_id: Some(turn_id.to_string()),
            },
        );
    }

    /// Make the next `send_message` fail with a transport error
    pub fn fail_next_send(&self, message: impl Into<String>) {
        self.lock().fail_next_send = Some(message.into());
    }

    /// Drop every open stream of a session
    pub fn close_streams(&self, session_id: &str) {
        self.lock()
            .session(session_id, &self.provider)
            .subscribers
            .clear();
    }

    pub fn sent_messages(&self, session_id: &str) -> Vec<String> {
        self.lock()
            .sessions
            .get(session_id)
            .map(|s| s.sent.clone())
            .unwrap_or_default()
    }

    /// Sessions polled for history, in call order
    pub fn history_polls(&self) -> Vec<SessionId> {
        self.lock().history_polls.clone()
    }

    pub fn decisions(&self) -> Vec<(String, ApprovalDecision)> {
        self.lock().decisions.clone()
    }
}

#[async_trait]
impl SessionApi for InMemorySessionApi {
    async fn send_message(&self, session_id: &str, text: &str) -> Result<SendReceipt, ApiError> {
        let mut inner = self.lock();
        if let Some(message) = inner.fail_next_send.take() {
            return Err(ApiError::Transport(message));
        }
        inner.next_message += 1;
        let n = inner.next_message;
        let session = inner.session(session_id, &self.provider);
        session.sent.push(text.to_string());
        session.history.push(HistoryItem {
            id: format!("msg-{}", n),
            role: ChatRole::User,
            text: text.to_string(),
            created_at: None,
            turn_id: None,
            provider_message_id: Some(format!("pm-{}", n)),
        });
        Ok(SendReceipt {
            turn_id: None,
            provider_message_id: Some(format!("pm-{}", n)),
        })
    }

    async fn open_push_stream(&self, session_id: &str) -> Result<EventStream, ApiError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock()
            .session(session_id, &self.provider)
            .subscribers
            .push(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn poll_history(
        &self,
        session_id: &str,
        since: Option<&str>,
    ) -> Result<HistoryPage, ApiError> {
        let mut inner = self.lock();
        inner.history_polls.push(session_id.to_string());
        let history = &inner.session(session_id, &self.provider).history;
        let start = since
            .and_then(|cursor| cursor.parse::<usize>().ok())
            .unwrap_or(0)
            .min(history.len());
        Ok(HistoryPage {
            items: history[start..].to_vec(),
            cursor: Some(history.len().to_string()),
        })
    }

    async fn poll_meta(
        &self,
        session_ids: &[SessionId],
    ) -> Result<HashMap<SessionId, SessionMeta>, ApiError> {
        let inner = self.lock();
        Ok(session_ids
            .iter()
            .filter_map(|id| inner.sessions.get(id).map(|s| (id.clone(), s.meta.clone())))
            .collect())
    }

    async fn respond_approval(
        &self,
        session_id: &str,
        approval_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), ApiError> {
        {
            let mut inner = self.lock();
            if !inner.sessions.contains_key(session_id) {
                return Err(ApiError::NotFound(session_id.to_string()));
            }
            inner.decisions.push((approval_id.to_string(), decision));
        }
        self.push_event(
            session_id,
            SessionEvent::ApprovalResolved {
                approval_id: approval_id.to_string(),
            },
        );
        Ok(())
    }
}
