//! End-to-end reducer scenarios driven through the public API

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use convoy_cli::core::{
    ChangeSource, ChatRole, ChatStatus, HistoryItem, HistoryPage, SelectionKey, SessionMeta,
};
use convoy_cli::ui_backend::{
    AppEvent, Command, Effect, LoadCause, ReduceContext, Reconciler, SendReceipt, SessionEvent,
};
use convoy_cli::Config;

fn wall() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()
}

fn start() -> ReduceContext {
    ReduceContext::new(Instant::now(), wall())
}

fn loaded(session: &str) -> AppEvent {
    AppEvent::HistoryLoaded {
        session_id: session.into(),
        cause: LoadCause::Select,
        result: Ok(HistoryPage::default()),
    }
}

fn delta(text: &str, at: DateTime<Utc>) -> AppEvent {
    AppEvent::Stream {
        session_id: "s1".into(),
        event: SessionEvent::AgentDelta {
            text: text.into(),
            created_at: Some(at),
            turn_id: None,
            provider_message_id: None,
            force_split: false,
        },
    }
}

fn history_refreshes(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| {
            matches!(
                e,
                Effect::PollHistory {
                    cause: LoadCause::StaleRefresh,
                    ..
                }
            )
        })
        .count()
}

#[test]
fn send_stream_merge_and_confirm() {
    let mut r = Reconciler::new(&Config::default());
    let ctx = start();
    r.reduce(Command::select_session("s1").into(), &ctx);
    r.reduce(loaded("s1").into(), &ctx);

    let effects = r.reduce(Command::SendMessage("hello".into()).into(), &ctx);
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::SendMessage { token: 1, session_id, text } if session_id == "s1" && text == "hello"
    )));
    let snapshot = r.snapshot();
    assert_eq!(snapshot.blocks.len(), 1);
    assert_eq!(snapshot.blocks[0].role, ChatRole::User);
    assert_eq!(snapshot.blocks[0].status, ChatStatus::Sending);

    r.reduce(delta("Hi", wall()).into(), &ctx);
    assert_eq!(r.snapshot().blocks.len(), 2);

    let later = ctx.advanced(Duration::from_millis(300));
    r.reduce(
        delta(" there.", wall() + chrono::Duration::milliseconds(300)).into(),
        &later,
    );
    let snapshot = r.snapshot();
    assert_eq!(snapshot.blocks.len(), 2);
    assert_eq!(snapshot.blocks[1].role, ChatRole::Agent);
    assert_eq!(snapshot.blocks[1].text, "Hi there.");

    r.reduce(
        AppEvent::SendCompleted {
            token: 1,
            result: Ok(SendReceipt::default()),
        }
        .into(),
        &later,
    );
    let snapshot = r.snapshot();
    assert_eq!(snapshot.blocks[0].status, ChatStatus::Sent);
    assert!(r.pending_sends().is_empty());
}

#[test]
fn stale_request_refreshes_exactly_once() {
    let config = Config::default();
    let stale = config.activity.stale_refresh_delay();
    let mut r = Reconciler::new(&config);
    let t0 = start();
    r.reduce(Command::select_session("s1").into(), &t0);
    r.reduce(loaded("s1").into(), &t0);
    r.reduce(Command::SendMessage("long job".into()).into(), &t0);

    let late = t0.advanced(stale * 2);
    let effects = r.reduce(AppEvent::Tick.into(), &late);
    assert_eq!(history_refreshes(&effects), 1);
    assert_eq!(r.activity().state().unwrap().refresh_count, 1);

    let next_tick = late.advanced(config.polling.tick_interval());
    let effects = r.reduce(AppEvent::Tick.into(), &next_tick);
    assert_eq!(history_refreshes(&effects), 0);
    assert_eq!(r.activity().state().unwrap().refresh_count, 1);
}

#[test]
fn ready_order_follows_start_order() {
    let mut r = Reconciler::new(&Config::default());
    let t1 = start();
    r.reduce(Command::select_session("s2").into(), &t1);
    r.reduce(loaded("s2").into(), &t1);
    r.reduce(Command::SendMessage("first".into()).into(), &t1);

    let t2 = t1.advanced(Duration::from_secs(5));
    r.reduce(Command::select_session("s1").into(), &t2);
    r.reduce(loaded("s1").into(), &t2);
    r.reduce(Command::SendMessage("second".into()).into(), &t2);

    let t3 = t2.advanced(Duration::from_secs(5));
    r.reduce(
        Command::select(SelectionKey::Workspace("w1".into())).into(),
        &t3,
    );
    let meta: HashMap<_, _> = ["s1", "s2"]
        .into_iter()
        .map(|id| {
            (
                id.to_string(),
                SessionMeta {
                    provider: None,
                    latest_turn_id: Some(format!("{}-done", id)),
                },
            )
        })
        .collect();
    r.reduce(AppEvent::MetaPolled { result: Ok(meta) }.into(), &t3);

    assert_eq!(r.snapshot().ready, vec!["s2".to_string(), "s1".to_string()]);
}

#[test]
fn background_resync_does_not_grow_history() {
    let mut r = Reconciler::new(&Config::default());
    let ctx = start();
    r.reduce(
        Command::select(SelectionKey::Workspace("w1".into())).into(),
        &ctx,
    );
    r.reduce(Command::select_session("s1").into(), &ctx);
    assert_eq!(r.history().depth(), 2);

    r.reduce(Command::HistoryBack.into(), &ctx);
    assert_eq!(r.history().depth(), 1);

    r.reduce(
        Command::Select {
            key: SelectionKey::Worktree("wt1".into()),
            source: ChangeSource::System,
        }
        .into(),
        &ctx,
    );
    assert_eq!(r.history().depth(), 1);
    assert_eq!(
        r.history().current(),
        Some(&SelectionKey::Worktree("wt1".into()))
    );

    r.reduce(Command::select_session("s2").into(), &ctx);
    assert_eq!(r.history().depth(), 2);
    assert!(!r.snapshot().can_go_forward);
}

#[test]
fn polled_history_adopts_local_echo() {
    let mut r = Reconciler::new(&Config::default());
    let ctx = start();
    r.reduce(Command::select_session("s1").into(), &ctx);
    r.reduce(loaded("s1").into(), &ctx);
    r.reduce(Command::SendMessage("ship it".into()).into(), &ctx);

    r.reduce(
        AppEvent::HistoryLoaded {
            session_id: "s1".into(),
            cause: LoadCause::StaleRefresh,
            result: Ok(HistoryPage {
                items: vec![HistoryItem {
                    id: "m-1".into(),
                    role: ChatRole::User,
                    text: "ship it".into(),
                    created_at: None,
                    turn_id: None,
                    provider_message_id: Some("pm-1".into()),
                }],
                cursor: Some("1".into()),
            }),
        }
        .into(),
        &ctx,
    );

    let snapshot = r.snapshot();
    assert_eq!(snapshot.blocks.len(), 1);
    assert_eq!(snapshot.blocks[0].provider_message_id.as_deref(), Some("pm-1"));
}
