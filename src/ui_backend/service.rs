//! Reconcile Service - event loop
//!
//! Owns the reducer and is its only caller. Commands from the frontend,
//! task results and clock ticks are multiplexed into one serial stream of
//! inputs; after each reduction the effects are handed to the runner and a
//! fresh snapshot is published on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::config::Config;

use super::commands::Command;
use super::effects::Effect;
use super::events::AppEvent;
use super::reducer::{Input, ReduceContext, Reconciler};
use super::scheduler::EffectRunner;
use super::state::Snapshot;
use super::traits::{AppStateStore, SessionApi};

/// Frontend side of a running service
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
}

impl ServiceHandle {
    /// Queue a command; false once the service has stopped
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`
    ///
    /// Returns `None` if the service stops first.
    pub async fn wait_for<F>(&mut self, predicate: F) -> Option<Arc<Snapshot>>
    where
        F: Fn(&Snapshot) -> bool,
    {
        loop {
            let current = Arc::clone(&self.snapshots.borrow_and_update());
            if predicate(&current) {
                return Some(current);
            }
            if self.snapshots.changed().await.is_err() {
                return None;
            }
        }
    }
}

/// The single-writer event loop around `Reconciler`
pub struct ReconcileService {
    reconciler: Reconciler,
    runner: EffectRunner,
    store: Arc<dyn AppStateStore>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<AppEvent>,
    snapshots: watch::Sender<Arc<Snapshot>>,
    tick_interval: Duration,
}

impl ReconcileService {
    pub fn new(
        config: &Config,
        api: Arc<dyn SessionApi>,
        store: Arc<dyn AppStateStore>,
    ) -> (Self, ServiceHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let reconciler = Reconciler::new(config);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(reconciler.snapshot()));

        let service = Self {
            reconciler,
            runner: EffectRunner::new(api, Arc::clone(&store), event_tx),
            store,
            commands: command_rx,
            events: event_rx,
            snapshots: snapshot_tx,
            tick_interval: config.polling.tick_interval(),
        };
        let handle = ServiceHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (service, handle)
    }

    fn context() -> ReduceContext {
        ReduceContext::new(tokio::time::Instant::now().into_std(), Utc::now())
    }

    fn publish(&self) {
        let _ = self.snapshots.send(Arc::new(self.reconciler.snapshot()));
    }

    /// Run effects; false once a quit was requested
    fn dispatch(&self, effects: Vec<Effect>) -> bool {
        let mut keep_running = true;
        for effect in effects {
            keep_running &= self.runner.run(effect);
        }
        keep_running
    }

    async fn restore(&mut self) {
        match self.store.load().await {
            Ok(Some(state)) => {
                tracing::debug!(selection = ?state.selection, "restoring app state");
                let effects = self.reconciler.restore(state, &Self::context());
                self.dispatch(effects);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "could not load saved app state"),
        }
    }

    /// Run until `Command::Quit` or until every handle is dropped
    pub async fn run(mut self) -> Result<()> {
        self.restore().await;
        self.publish();

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let input = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => Input::Command(command),
                    None => break,
                },
                Some(event) = self.events.recv() => Input::Event(event),
                _ = ticker.tick() => Input::Event(AppEvent::Tick),
            };

            let is_tick = matches!(input, Input::Event(AppEvent::Tick));
            let effects = self.reconciler.reduce(input, &Self::context());
            let idle_tick = is_tick && effects.is_empty();
            let keep_running = self.dispatch(effects);
            if !idle_tick {
                self.publish();
            }
            if !keep_running {
                break;
            }
        }

        tracing::debug!("reconcile service stopped");
        Ok(())
    }
}
