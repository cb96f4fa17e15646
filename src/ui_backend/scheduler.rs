//! Effect runner
//!
//! Turns reducer effects into tokio tasks. Each task owns immutable copies
//! of what it needs and reports back through the event channel exactly
//! once; push-stream tasks report once per upstream event and once on
//! close. Timers live here and nowhere else.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::core::SessionId;

use super::effects::Effect;
use super::events::AppEvent;
use super::traits::{AppStateStore, SessionApi};

#[derive(Clone)]
pub struct EffectRunner {
    api: Arc<dyn SessionApi>,
    store: Arc<dyn AppStateStore>,
    events: mpsc::UnboundedSender<AppEvent>,
    streams: Arc<Mutex<HashMap<SessionId, AbortHandle>>>,
}

impl EffectRunner {
    pub fn new(
        api: Arc<dyn SessionApi>,
        store: Arc<dyn AppStateStore>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            api,
            store,
            events,
            streams: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn streams(&self) -> MutexGuard<'_, HashMap<SessionId, AbortHandle>> {
        self.streams.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("stream registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Spawn the task for `effect`; returns false for `Effect::Quit`
    pub fn run(&self, effect: Effect) -> bool {
        tracing::trace!(effect = effect.name(), "running effect");
        let api = Arc::clone(&self.api);
        let tx = self.events.clone();

        match effect {
            Effect::Quit => return false,

            Effect::SendMessage {
                token,
                session_id,
                text,
            } => {
                tokio::spawn(async move {
                    let result = api.send_message(&session_id, &text).await;
                    let _ = tx.send(AppEvent::SendCompleted { token, result });
                });
            }

            Effect::OpenStream { session_id } => {
                let key = session_id.clone();
                let task = tokio::spawn(async move {
                    let mut stream = match api.open_push_stream(&session_id).await {
                        Ok(stream) => stream,
                        Err(err) => {
                            let _ = tx.send(AppEvent::StreamClosed {
                                session_id,
                                error: Some(err.to_string()),
                            });
                            return;
                        }
                    };
                    while let Some(event) = stream.next().await {
                        let forwarded = AppEvent::Stream {
                            session_id: session_id.clone(),
                            event,
                        };
                        if tx.send(forwarded).is_err() {
                            // reducer is gone
                            return;
                        }
                    }
                    let _ = tx.send(AppEvent::StreamClosed {
                        session_id,
                        error: None,
                    });
                });
                if let Some(previous) = self.streams().insert(key, task.abort_handle()) {
                    previous.abort();
                }
            }

            Effect::CloseStream { session_id } => {
                if let Some(handle) = self.streams().remove(&session_id) {
                    tracing::debug!(session_id = %session_id, "closing push stream");
                    handle.abort();
                }
            }

            Effect::PollHistory {
                session_id,
                since,
                cause,
            } => {
                tokio::spawn(async move {
                    let result = api.poll_history(&session_id, since.as_deref()).await;
                    let _ = tx.send(AppEvent::HistoryLoaded {
                        session_id,
                        cause,
                        result,
                    });
                });
            }

            Effect::PollMeta { session_ids } => {
                tokio::spawn(async move {
                    let result = api.poll_meta(&session_ids).await;
                    let _ = tx.send(AppEvent::MetaPolled { result });
                });
            }

            Effect::ScheduleLoad { ticket, delay } => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(AppEvent::LoadTimerFired(ticket));
                });
            }

            Effect::SaveState { seq, state } => {
                let store = Arc::clone(&self.store);
                tokio::spawn(async move {
                    let result = store.save(&state).await;
                    let _ = tx.send(AppEvent::SaveCompleted { seq, result });
                });
            }

            Effect::RespondApproval {
                session_id,
                approval_id,
                decision,
            } => {
                tokio::spawn(async move {
                    let result = api
                        .respond_approval(&session_id, &approval_id, decision)
                        .await;
                    let _ = tx.send(AppEvent::ApprovalResponded {
                        session_id,
                        approval_id,
                        decision,
                        result,
                    });
                });
            }
        }
        true
    }
}
