//! Tests for the tokio scheduler driving real match tasks.

mod common;

use common::{move_msg, presence};
use std::sync::Arc;
use std::time::Duration;
use tictactoe_arena::{
    EngineConfig, Envelope, FixedClock, JoinRejection, Mark, MatchParams, OpCode, Outbound,
    OutboundEvent, OutcomeReport, RecordingReporter, Scheduler, SchedulerError, ServerMessage,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> EngineConfig {
    EngineConfig::default().with_tick_rate(50)
}

fn scheduler(config: EngineConfig) -> (Scheduler, UnboundedReceiver<Outbound>, Arc<RecordingReporter>) {
    let reporter = Arc::new(RecordingReporter::new());
    let (scheduler, rx) = Scheduler::new(config, reporter.clone(), Arc::new(FixedClock::new(1_000)));
    (scheduler, rx, reporter)
}

/// Next protocol message, skipping label updates.
async fn next_envelope(rx: &mut UnboundedReceiver<Outbound>) -> Envelope {
    loop {
        let outbound = timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for outbound")
            .expect("outbound channel closed");
        if let OutboundEvent::Message(envelope) = outbound.into_parts().1 {
            return envelope;
        }
    }
}

async fn wait_until_gone(scheduler: &Scheduler, match_id: &str) {
    timeout(WAIT, async {
        while scheduler.label(match_id).await.is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("match was not removed");
}

#[tokio::test]
async fn test_create_match_lists_open_label() {
    let (scheduler, _rx, _) = scheduler(fast_config());
    let match_id = scheduler
        .create_match(MatchParams::new().with_timed(true))
        .await;

    assert_eq!(
        scheduler.label(&match_id).await.as_deref(),
        Some(r#"{"open":true,"timed":true}"#)
    );
    let listings = scheduler.list_matches().await;
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].match_id(), &match_id);
}

#[tokio::test]
async fn test_full_match_through_scheduler() {
    let (scheduler, mut rx, reporter) = scheduler(fast_config());
    let match_id = scheduler.create_match(MatchParams::new()).await;

    scheduler.join_attempt(&match_id, presence("alice")).await.unwrap();
    scheduler.join_attempt(&match_id, presence("bob")).await.unwrap();
    scheduler
        .join(&match_id, vec![presence("alice"), presence("bob")])
        .await
        .unwrap();

    let start = next_envelope(&mut rx).await;
    assert_eq!(start.op_code(), &OpCode::Start);
    let ServerMessage::Start(start) = start.message().unwrap() else {
        panic!("expected START");
    };
    assert_eq!(start.marks.get("alice"), Some(&Mark::X));

    for (user, position) in [("alice", 0), ("bob", 4), ("alice", 1), ("bob", 5), ("alice", 2)] {
        scheduler
            .send_message(&match_id, move_msg(user, position))
            .await
            .unwrap();
    }

    let mut updates = 0;
    let done = loop {
        let envelope = next_envelope(&mut rx).await;
        match envelope.message().unwrap() {
            ServerMessage::Update(_) => updates += 1,
            ServerMessage::Done(done) => break done,
            other => panic!("unexpected message {:?}", other),
        }
    };
    assert_eq!(updates, 4);
    assert_eq!(done.winner, Some(Mark::X));

    wait_until_gone(&scheduler, &match_id).await;
    scheduler.flush_reports().await;
    assert_eq!(
        reporter.reports(),
        vec![OutcomeReport::win(
            "alice".into(),
            vec!["alice".into(), "bob".into()],
            match_id.clone()
        )]
    );
    assert!(matches!(
        scheduler.join(&match_id, vec![presence("carol")]).await,
        Err(SchedulerError::MatchNotFound(_))
    ));
}

#[tokio::test]
async fn test_label_closes_when_full() {
    let (scheduler, mut rx, _) = scheduler(fast_config());
    let match_id = scheduler.create_match(MatchParams::new()).await;

    for user in ["alice", "bob"] {
        scheduler.join_attempt(&match_id, presence(user)).await.unwrap();
        scheduler.join(&match_id, vec![presence(user)]).await.unwrap();
    }

    let label = loop {
        let outbound = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        if let OutboundEvent::Label(label) = outbound.into_parts().1 {
            break label;
        }
    };
    assert_eq!(label, r#"{"open":false,"timed":false}"#);
    assert_eq!(scheduler.label(&match_id).await.as_deref(), Some(label.as_str()));
}

#[tokio::test]
async fn test_join_rejections_surface() {
    let (scheduler, _rx, _) = scheduler(fast_config());
    let match_id = scheduler.create_match(MatchParams::new()).await;

    scheduler.join_attempt(&match_id, presence("alice")).await.unwrap();
    scheduler.join_attempt(&match_id, presence("bob")).await.unwrap();
    assert_eq!(
        scheduler.join_attempt(&match_id, presence("carol")).await,
        Err(SchedulerError::Rejected(JoinRejection::MatchFull))
    );
    assert_eq!(
        scheduler.join_attempt("no-such-match", presence("carol")).await,
        Err(SchedulerError::MatchNotFound("no-such-match".into()))
    );
}

#[tokio::test]
async fn test_signal_round_trip() {
    let (scheduler, _rx, _) = scheduler(fast_config());
    let match_id = scheduler.create_match(MatchParams::new()).await;

    let reply = scheduler
        .signal(&match_id, r#"{"type":"ping"}"#)
        .await
        .unwrap()
        .expect("ping reply");
    assert!(reply.contains(r#""phase":"waiting_for_players""#));

    assert_eq!(scheduler.signal(&match_id, "garbage").await, Ok(None));
}

#[tokio::test]
async fn test_terminate_removes_match() {
    let (scheduler, _rx, reporter) = scheduler(fast_config());
    let match_id = scheduler.create_match(MatchParams::new()).await;

    scheduler.terminate(&match_id, 0).await.unwrap();
    wait_until_gone(&scheduler, &match_id).await;
    assert!(scheduler.list_matches().await.is_empty());
    assert!(reporter.reports().is_empty());
}

#[tokio::test]
async fn test_idle_match_closes_itself() {
    let config = EngineConfig::default()
        .with_tick_rate(100)
        .with_max_empty_sec(1);
    let (scheduler, _rx, _) = scheduler(config);
    let match_id = scheduler.create_match(MatchParams::new()).await;

    wait_until_gone(&scheduler, &match_id).await;
}

#[tokio::test]
async fn test_cancelled_join_lets_idle_match_close() {
    let config = EngineConfig::default()
        .with_tick_rate(100)
        .with_max_empty_sec(1);
    let (scheduler, _rx, _) = scheduler(config);
    let match_id = scheduler.create_match(MatchParams::new()).await;

    scheduler.join_attempt(&match_id, presence("alice")).await.unwrap();
    scheduler.cancel_join(&match_id, presence("alice")).await.unwrap();

    wait_until_gone(&scheduler, &match_id).await;
}

#[tokio::test]
async fn test_report_does_not_block_match_loop() {
    let (scheduler, mut rx, reporter) = scheduler(fast_config());
    let match_id = scheduler.create_match(MatchParams::new()).await;

    scheduler.join_attempt(&match_id, presence("alice")).await.unwrap();
    scheduler.join_attempt(&match_id, presence("bob")).await.unwrap();
    scheduler
        .join(&match_id, vec![presence("alice"), presence("bob")])
        .await
        .unwrap();
    next_envelope(&mut rx).await;

    scheduler.leave(&match_id, vec![presence("bob")]).await.unwrap();
    let done = next_envelope(&mut rx).await;
    assert_eq!(done.op_code(), &OpCode::Done);
    assert_eq!(next_envelope(&mut rx).await.op_code(), &OpCode::OpponentLeft);

    // The match keeps answering while the outcome is written.
    let reply = scheduler
        .signal(&match_id, r#"{"type":"ping"}"#)
        .await
        .unwrap()
        .expect("ping reply");
    assert!(reply.contains(r#""phase":"round_over""#));

    scheduler.flush_reports().await;
    assert_eq!(
        reporter.reports(),
        vec![OutcomeReport::win(
            "alice".into(),
            vec!["alice".into(), "bob".into()],
            match_id.clone()
        )]
    );
}
